//! Host execution backend: rayon data-parallel kernels over plain slices.

use crate::device::Device;
use crate::error::{check_len, Result};
use crate::traits::{HalfOperator, Halves, Matrix, Operator, Real};
use rayon::prelude::*;
use std::marker::PhantomData;

/// Minimum number of matrix rows handed to one rayon task.
pub(crate) const ROWS_PER_TASK: usize = 256;
/// Minimum number of vector elements handed to one rayon task.
const ELEMENTS_PER_TASK: usize = 4096;
/// Fixed reduction chunk of [`CpuDevice::dot`]. Keeps the summation order
/// independent of the thread count.
const DOT_CHUNK: usize = 4096;

/// Represents a CPU execution device computing in `T`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuDevice<T: Real = f64> {
    _scalar: PhantomData<T>,
}

impl<T: Real> CpuDevice<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Real> Device for CpuDevice<T> {
    type Vector = Vec<T>;

    fn create_vector(&self, _label: &str, data: &[f64]) -> Result<Vec<T>> {
        Ok(data.iter().map(|&v| T::from_f64(v)).collect())
    }

    fn create_empty_vector(&self, _label: &str, size: usize) -> Result<Vec<T>> {
        Ok(vec![T::zero(); size])
    }

    fn read_vector(&self, v: &Vec<T>) -> Result<Vec<f64>> {
        Ok(v.iter().map(|x| x.as_f64()).collect())
    }

    fn write_vector(&self, v: &mut Vec<T>, data: &[f64]) -> Result<()> {
        check_len("write_vector", v.len(), data.len())?;
        for (dst, &src) in v.iter_mut().zip(data) {
            *dst = T::from_f64(src);
        }
        Ok(())
    }

    fn copy(&self, src: &Vec<T>, dst: &mut Vec<T>) -> Result<()> {
        check_len("copy", dst.len(), src.len())?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn zero(&self, x: &mut Vec<T>) -> Result<()> {
        x.fill(T::zero());
        Ok(())
    }

    fn axpy(&self, alpha: f64, x: &Vec<T>, y: &mut Vec<T>) -> Result<()> {
        check_len("axpy", y.len(), x.len())?;
        let alpha = T::from_f64(alpha);
        y.par_iter_mut()
            .zip(x.par_iter())
            .with_min_len(ELEMENTS_PER_TASK)
            .for_each(|(y, &x)| *y += alpha * x);
        Ok(())
    }

    fn scale(&self, alpha: f64, x: &mut Vec<T>) -> Result<()> {
        let alpha = T::from_f64(alpha);
        x.par_iter_mut()
            .with_min_len(ELEMENTS_PER_TASK)
            .for_each(|x| *x = alpha * *x);
        Ok(())
    }

    fn vmul(&self, x: &mut Vec<T>, y: &Vec<T>) -> Result<()> {
        check_len("vmul", x.len(), y.len())?;
        x.par_iter_mut()
            .zip(y.par_iter())
            .with_min_len(ELEMENTS_PER_TASK)
            .for_each(|(x, &y)| *x = *x * y);
        Ok(())
    }

    fn rsqrt(&self, x: &mut Vec<T>) -> Result<()> {
        x.par_iter_mut()
            .with_min_len(ELEMENTS_PER_TASK)
            .for_each(|x| *x = T::one() / x.sqrt());
        Ok(())
    }

    fn recip(&self, x: &mut Vec<T>) -> Result<()> {
        x.par_iter_mut()
            .with_min_len(ELEMENTS_PER_TASK)
            .for_each(|x| *x = T::one() / *x);
        Ok(())
    }

    fn dot(&self, x: &Vec<T>, y: &Vec<T>) -> Result<f64> {
        check_len("dot", x.len(), y.len())?;
        let partials: Vec<f64> = x
            .par_chunks(DOT_CHUNK)
            .zip(y.par_chunks(DOT_CHUNK))
            .map(|(a, b)| a.iter().zip(b).map(|(p, q)| p.as_f64() * q.as_f64()).sum())
            .collect();
        Ok(partials.iter().sum())
    }
}

impl<M: Matrix> Operator<CpuDevice<M::Value>> for M {
    fn dim(&self) -> usize {
        self.size()
    }

    fn apply(
        &self,
        _device: &CpuDevice<M::Value>,
        x: &Vec<M::Value>,
        y: &mut Vec<M::Value>,
    ) -> Result<()> {
        self.multiply(x, y)
    }

    fn load_diagonal(&self, _device: &CpuDevice<M::Value>, out: &mut Vec<M::Value>) -> Result<()> {
        check_len("load_diagonal", self.size(), out.len())?;
        out.copy_from_slice(self.diagonal());
        Ok(())
    }
}

impl<M: Halves> HalfOperator<CpuDevice<M::Value>> for M {
    fn apply_l(
        &self,
        _device: &CpuDevice<M::Value>,
        x: &Vec<M::Value>,
        y: &mut Vec<M::Value>,
    ) -> Result<()> {
        self.l_mul(x, y)
    }

    fn solve_l(&self, _device: &CpuDevice<M::Value>, y: &mut Vec<M::Value>) -> Result<()> {
        self.inv_l_mul(y)
    }

    fn apply_u(
        &self,
        _device: &CpuDevice<M::Value>,
        x: &Vec<M::Value>,
        y: &mut Vec<M::Value>,
    ) -> Result<()> {
        self.u_mul(x, y)
    }

    fn solve_u(&self, _device: &CpuDevice<M::Value>, y: &mut Vec<M::Value>) -> Result<()> {
        self.inv_u_mul(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlaeError;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_vector_ops() -> Result<()> {
        let device = CpuDevice::<f64>::new();
        let x = device.create_vector("x", &[1.0, 2.0, 3.0, 4.0])?;
        let mut y = device.create_vector("y", &[4.0, 9.0, 16.0, 25.0])?;

        assert_abs_diff_eq!(device.dot(&x, &y)?, 4.0 + 18.0 + 48.0 + 100.0);

        device.axpy(2.0, &x, &mut y)?;
        assert_eq!(y, vec![6.0, 13.0, 22.0, 33.0]);

        device.scale(0.5, &mut y)?;
        assert_eq!(y, vec![3.0, 6.5, 11.0, 16.5]);

        let mut z = device.create_vector("z", &[4.0, 16.0, 0.25, 1.0])?;
        device.rsqrt(&mut z)?;
        assert_eq!(z, vec![0.5, 0.25, 2.0, 1.0]);

        device.vmul(&mut z, &x)?;
        assert_eq!(z, vec![0.5, 0.5, 6.0, 4.0]);

        let mut d = device.create_vector("d", &[-4.0, 0.5, -0.25, 2.0])?;
        device.recip(&mut d)?;
        assert_eq!(d, vec![-0.25, 2.0, -4.0, 0.5]);

        device.copy(&x, &mut z)?;
        assert_eq!(z, x);
        device.zero(&mut z)?;
        assert_eq!(device.read_vector(&z)?, vec![0.0; 4]);
        Ok(())
    }

    #[test]
    fn test_size_mismatch_fails_fast() {
        let device = CpuDevice::<f32>::new();
        let x = vec![1.0f32; 3];
        let mut y = vec![2.0f32; 4];
        let err = device.axpy(1.0, &x, &mut y).unwrap_err();
        assert!(matches!(err, SlaeError::SizeMismatch { operation: "axpy", .. }));
        assert_eq!(y, vec![2.0; 4]);
        assert!(device.dot(&x, &y).is_err());
        assert!(device.copy(&x, &mut y).is_err());
        assert!(device.write_vector(&mut y, &[1.0]).is_err());
    }

    #[test]
    fn test_dot_is_deterministic() -> Result<()> {
        let device = CpuDevice::<f32>::new();
        let mut rng = fastrand::Rng::with_seed(21);
        let data: Vec<f64> = (0..50_000).map(|_| rng.f64() - 0.5).collect();
        let x = device.create_vector("x", &data)?;
        let first = device.dot(&x, &x)?;
        for _ in 0..4 {
            assert_eq!(device.dot(&x, &x)?, first);
        }
        Ok(())
    }
}
