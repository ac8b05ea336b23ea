use crate::device::GpuDevice;
use crate::error::{check_len, Result, SlaeError};
use crate::gpu_matrix::GpuDiag9Matrix;
use crate::host::ROWS_PER_TASK;
use crate::traits::{Halves, Matrix, Real};
use rayon::prelude::*;

/// Number of bands on each side of the diagonal.
pub const SIDE_BANDS: usize = 4;

/// Banded matrix with the diagonal and four bands on each side.
///
/// Band 0 sits next to the diagonal (offset 1), bands 1..=3 start after `gap`
/// skipped positions (offsets `k + gap`). Left band entries are indexed by
/// column, right band entries by row:
/// `A[i][i - off] = ld[k][i - off]`, `A[i][i + off] = rd[k][i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Diag9Matrix<T: Real> {
    pub(crate) diagonal: Vec<T>,
    pub(crate) ld: [Vec<T>; SIDE_BANDS],
    pub(crate) rd: [Vec<T>; SIDE_BANDS],
    pub(crate) gap: usize,
}

impl<T: Real> Diag9Matrix<T> {
    /// Creates a matrix from its bands.
    ///
    /// # Errors
    /// `InvalidDimensions` if a band is longer than the diagonal or too short to
    /// address every in-range neighbour.
    pub fn new(
        diagonal: Vec<T>,
        ld: [Vec<T>; SIDE_BANDS],
        rd: [Vec<T>; SIDE_BANDS],
        gap: usize,
    ) -> Result<Self> {
        let matrix = Self {
            diagonal,
            ld,
            rd,
            gap,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// All-zero matrix with full-length bands.
    pub fn zeros(size: usize, gap: usize) -> Self {
        let band = || vec![T::zero(); size];
        Self {
            diagonal: band(),
            ld: std::array::from_fn(|_| band()),
            rd: std::array::from_fn(|_| band()),
            gap,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.diagonal.len();
        for k in 0..SIDE_BANDS {
            let required = n.saturating_sub(self.offset(k));
            for (side, band) in [("ld", &self.ld[k]), ("rd", &self.rd[k])] {
                if band.len() > n || band.len() < required {
                    return Err(SlaeError::InvalidDimensions(format!(
                        "{}{} length ({}) must be between {} and {}",
                        side,
                        k,
                        band.len(),
                        required,
                        n
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn gap(&self) -> usize {
        self.gap
    }

    /// Distance of band `k` from the diagonal.
    #[inline]
    pub fn offset(&self, k: usize) -> usize {
        if k == 0 {
            1
        } else {
            k + self.gap
        }
    }

    pub fn left(&self, k: usize) -> &[T] {
        &self.ld[k]
    }

    pub fn right(&self, k: usize) -> &[T] {
        &self.rd[k]
    }

    pub fn left_mut(&mut self, k: usize) -> &mut [T] {
        &mut self.ld[k]
    }

    pub fn right_mut(&mut self, k: usize) -> &mut [T] {
        &mut self.rd[k]
    }

    /// Present left neighbours of row `i`, furthest first: (band, column).
    #[inline]
    fn left_neighbours(&self, i: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..SIDE_BANDS)
            .rev()
            .filter_map(move |k| i.checked_sub(self.offset(k)).map(|t| (k, t)))
    }

    /// Present right neighbours of row `i`, nearest first: (band, column).
    #[inline]
    fn right_neighbours(&self, i: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.diagonal.len();
        (0..SIDE_BANDS)
            .map(move |k| (k, i + self.offset(k)))
            .filter(move |&(_, t)| t < n)
    }

    #[inline]
    fn lower_sum(&self, i: usize, vec: &[T]) -> T {
        let mut sum = T::zero();
        for (k, t) in self.left_neighbours(i) {
            sum += self.ld[k][t] * vec[t];
        }
        sum
    }

    #[inline]
    fn upper_sum(&self, i: usize, vec: &[T]) -> T {
        let mut sum = T::zero();
        for (k, t) in self.right_neighbours(i) {
            sum += self.rd[k][i] * vec[t];
        }
        sum
    }

    fn check_operands(&self, operation: &'static str, vec: usize, res: usize) -> Result<()> {
        check_len(operation, self.size(), vec)?;
        check_len(operation, self.size(), res)
    }
}

impl<T: Real> Matrix for Diag9Matrix<T> {
    type Value = T;
    type Mirror = GpuDiag9Matrix;

    fn size(&self) -> usize {
        self.diagonal.len()
    }

    fn diagonal(&self) -> &[T] {
        &self.diagonal
    }

    fn diagonal_mut(&mut self) -> &mut [T] {
        &mut self.diagonal
    }

    fn multiply(&self, vec: &[T], res: &mut [T]) -> Result<()> {
        self.check_operands("diag9 multiply", vec.len(), res.len())?;
        res.par_iter_mut()
            .enumerate()
            .with_min_len(ROWS_PER_TASK)
            .for_each(|(i, out)| {
                let mut sum = self.lower_sum(i, vec);
                sum += self.diagonal[i] * vec[i];
                for (k, t) in self.right_neighbours(i) {
                    sum += self.rd[k][i] * vec[t];
                }
                *out = sum;
            });
        Ok(())
    }

    fn non_zero_values(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.size()).flat_map(move |i| {
            let left = self.left_neighbours(i).map(move |(k, t)| self.ld[k][t]);
            let right = self.right_neighbours(i).map(move |(k, _)| self.rd[k][i]);
            left.filter(|v| !v.is_zero())
                .chain(std::iter::once(self.diagonal[i]))
                .chain(right.filter(|v| !v.is_zero()))
        })
    }

    fn to_device(&self, device: &GpuDevice) -> Result<GpuDiag9Matrix> {
        device.create_diag9_matrix(self)
    }
}

impl<T: Real> Halves for Diag9Matrix<T> {
    fn l_mul(&self, vec: &[T], res: &mut [T]) -> Result<()> {
        self.check_operands("diag9 l_mul", vec.len(), res.len())?;
        res.par_iter_mut()
            .enumerate()
            .with_min_len(ROWS_PER_TASK)
            .for_each(|(i, out)| *out = self.lower_sum(i, vec) + self.diagonal[i] * vec[i]);
        Ok(())
    }

    fn inv_l_mul(&self, vec: &mut [T]) -> Result<()> {
        check_len("diag9 inv_l_mul", self.size(), vec.len())?;
        for i in 0..self.size() {
            let mut s = vec[i];
            for (k, t) in self.left_neighbours(i) {
                s -= self.ld[k][t] * vec[t];
            }
            vec[i] = s / self.diagonal[i];
        }
        Ok(())
    }

    fn u_mul(&self, vec: &[T], res: &mut [T]) -> Result<()> {
        self.check_operands("diag9 u_mul", vec.len(), res.len())?;
        res.par_iter_mut()
            .enumerate()
            .with_min_len(ROWS_PER_TASK)
            .for_each(|(i, out)| *out = self.diagonal[i] * vec[i] + self.upper_sum(i, vec));
        Ok(())
    }

    fn inv_u_mul(&self, vec: &mut [T]) -> Result<()> {
        check_len("diag9 inv_u_mul", self.size(), vec.len())?;
        for i in (0..self.size()).rev() {
            let mut s = vec[i];
            for (k, t) in self.right_neighbours(i) {
                s -= self.rd[k][i] * vec[t];
            }
            vec[i] = s / self.diagonal[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// 5x5, gap 1, unit diagonal, a single symmetric pair at (0, 1).
    fn some_slae() -> Diag9Matrix<f64> {
        let mut matrix = Diag9Matrix::zeros(5, 1);
        matrix.diagonal_mut().fill(1.0);
        matrix.left_mut(0)[0] = 0.5;
        matrix.right_mut(0)[0] = 0.5;
        matrix
    }

    /// Non-symmetric 7x7 with every band populated.
    fn dense_bands() -> Diag9Matrix<f64> {
        let n = 7;
        let gap = 1;
        let mut matrix = Diag9Matrix::zeros(n, gap);
        for (i, d) in matrix.diagonal_mut().iter_mut().enumerate() {
            *d = 10.0 + i as f64;
        }
        for k in 0..SIDE_BANDS {
            for t in 0..n {
                matrix.left_mut(k)[t] = 0.1 * (k + 1) as f64 + 0.01 * t as f64;
                matrix.right_mut(k)[t] = -0.2 * (k + 1) as f64 + 0.03 * t as f64;
            }
        }
        matrix
    }

    fn dense_of(matrix: &Diag9Matrix<f64>) -> Vec<Vec<f64>> {
        let n = matrix.size();
        let mut dense = vec![vec![0.0; n]; n];
        for i in 0..n {
            dense[i][i] = matrix.diagonal()[i];
            for k in 0..SIDE_BANDS {
                let off = matrix.offset(k);
                if i >= off {
                    dense[i][i - off] += matrix.left(k)[i - off];
                }
                if i + off < n {
                    dense[i][i + off] += matrix.right(k)[i];
                }
            }
        }
        dense
    }

    #[test]
    fn test_validate_band_lengths() {
        let short = Diag9Matrix::new(
            vec![1.0; 5],
            [vec![0.0; 3], vec![0.0; 3], vec![0.0; 2], vec![0.0; 1]],
            [vec![0.0; 4], vec![0.0; 3], vec![0.0; 2], vec![0.0; 1]],
            1,
        )
        .unwrap_err();
        match short {
            SlaeError::InvalidDimensions(msg) => assert!(msg.contains("ld0")),
            other => panic!("Unexpected error type: {:?}", other),
        }

        // Minimal band lengths are accepted.
        let minimal = Diag9Matrix::new(
            vec![1.0; 5],
            [vec![0.0; 4], vec![0.0; 3], vec![0.0; 2], vec![0.0; 1]],
            [vec![0.0; 4], vec![0.0; 3], vec![0.0; 2], vec![0.0; 1]],
            1,
        )
        .unwrap();
        let mut res = vec![0.0; 5];
        minimal.multiply(&[1.0; 5], &mut res).unwrap();
        assert_eq!(res, vec![1.0; 5]);

        let long = Diag9Matrix::new(
            vec![1.0; 2],
            [vec![0.0; 3], vec![], vec![], vec![]],
            [vec![], vec![], vec![], vec![]],
            4,
        )
        .unwrap_err();
        assert!(matches!(long, SlaeError::InvalidDimensions(_)));
    }

    #[test]
    fn test_multiply_some_slae() {
        let matrix = some_slae();
        let mut res = vec![0.0; 5];
        matrix.multiply(&[1.0; 5], &mut res).unwrap();
        assert_eq!(res, vec![1.5, 1.5, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_multiply_is_deterministic() {
        let mut rng = fastrand::Rng::with_seed(5);
        let n = 4 * ROWS_PER_TASK + 17;
        let mut matrix = Diag9Matrix::zeros(n, 40);
        for value in matrix.diagonal_mut() {
            *value = 8.0 + rng.f64();
        }
        for k in 0..SIDE_BANDS {
            matrix.left_mut(k).iter_mut().for_each(|v| *v = rng.f64() - 0.5);
            matrix.right_mut(k).iter_mut().for_each(|v| *v = rng.f64() - 0.5);
        }
        let x: Vec<f64> = (0..n).map(|_| rng.f64() - 0.5).collect();
        let mut first = vec![0.0; n];
        let mut second = vec![0.0; n];
        matrix.multiply(&x, &mut first).unwrap();
        matrix.multiply(&x, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multiply_matches_dense() {
        let matrix = dense_bands();
        let dense = dense_of(&matrix);
        let x: Vec<f64> = (0..7).map(|i| 1.0 - 0.3 * i as f64).collect();
        let mut res = vec![0.0; 7];
        matrix.multiply(&x, &mut res).unwrap();
        for i in 0..7 {
            let expected: f64 = dense[i].iter().zip(&x).map(|(a, b)| a * b).sum();
            assert_abs_diff_eq!(res[i], expected, epsilon = 1e-12);
        }

        let mut short = vec![0.0; 6];
        assert!(matches!(
            matrix.multiply(&x, &mut short),
            Err(SlaeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_halves_match_dense_triangles() {
        let matrix = dense_bands();
        let dense = dense_of(&matrix);
        let x: Vec<f64> = (0..7).map(|i| 0.5 + 0.25 * i as f64).collect();
        let mut l = vec![0.0; 7];
        let mut u = vec![0.0; 7];
        matrix.l_mul(&x, &mut l).unwrap();
        matrix.u_mul(&x, &mut u).unwrap();
        for i in 0..7 {
            let lower: f64 = (0..=i).map(|j| dense[i][j] * x[j]).sum();
            let upper: f64 = (i..7).map(|j| dense[i][j] * x[j]).sum();
            assert_abs_diff_eq!(l[i], lower, epsilon = 1e-12);
            assert_abs_diff_eq!(u[i], upper, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_halves_round_trip() {
        let matrix = dense_bands();
        let mut rng = fastrand::Rng::with_seed(5);
        for _ in 0..8 {
            let v: Vec<f64> = (0..7).map(|_| rng.f64() * 4.0 - 2.0).collect();
            let mut back = vec![0.0; 7];

            let mut w = v.clone();
            matrix.inv_l_mul(&mut w).unwrap();
            matrix.l_mul(&w, &mut back).unwrap();
            for (a, b) in back.iter().zip(&v) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }

            let mut w = v.clone();
            matrix.inv_u_mul(&mut w).unwrap();
            matrix.u_mul(&w, &mut back).unwrap();
            for (a, b) in back.iter().zip(&v) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_halves_round_trip_f32() {
        let mut matrix = Diag9Matrix::<f32>::zeros(6, 0);
        matrix.diagonal_mut().fill(4.0);
        for k in 0..SIDE_BANDS {
            matrix.left_mut(k).fill(0.25);
            matrix.right_mut(k).fill(-0.5);
        }
        let v = vec![0.1f32, -0.2, 0.05, 0.3, -0.15, 0.25];
        let mut back = vec![0.0f32; 6];
        let mut w = v.clone();
        matrix.inv_l_mul(&mut w).unwrap();
        matrix.l_mul(&w, &mut back).unwrap();
        for (a, b) in back.iter().zip(&v) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
        let mut w = v.clone();
        matrix.inv_u_mul(&mut w).unwrap();
        matrix.u_mul(&w, &mut back).unwrap();
        for (a, b) in back.iter().zip(&v) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_non_zero_values_order() {
        let matrix = some_slae();
        let values: Vec<f64> = matrix.non_zero_values().collect();
        assert_eq!(values, vec![1.0, 0.5, 0.5, 1.0, 1.0, 1.0, 1.0]);
    }
}
