use crate::device::GpuDevice;
use crate::error::{check_len, Result, SlaeError};
use crate::gpu_matrix::GpuMsrMatrix;
use crate::host::ROWS_PER_TASK;
use crate::traits::{Halves, Matrix, Real};
use rayon::prelude::*;
use std::ops::Range;

/// Modified sparse row storage: the diagonal is kept apart, off-diagonal entries
/// of row `i` live in `values[row_offsets[i]..row_offsets[i + 1]]` with strictly
/// ascending `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct MsrMatrix<T: Real> {
    pub(crate) diagonal: Vec<T>,
    pub(crate) values: Vec<T>,
    pub(crate) columns: Vec<usize>,
    pub(crate) row_offsets: Vec<usize>,
}

impl<T: Real> MsrMatrix<T> {
    /// Creates a matrix from raw MSR arrays, validating the structure.
    ///
    /// # Errors
    /// `InvalidDimensions` when array lengths disagree, `InvalidStructure` when
    /// offsets decrease, columns are out of range, unsorted, duplicated or
    /// point at the diagonal.
    pub fn new(
        diagonal: Vec<T>,
        values: Vec<T>,
        columns: Vec<usize>,
        row_offsets: Vec<usize>,
    ) -> Result<Self> {
        let matrix = Self {
            diagonal,
            values,
            columns,
            row_offsets,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Creates a matrix from (row, col, value) triplets. Duplicates are summed,
    /// entries with `row == col` go to the diagonal.
    pub fn from_triplets(size: usize, triplets: &[(usize, usize, T)]) -> Result<Self> {
        let mut diagonal = vec![T::zero(); size];
        let mut rows: Vec<Vec<(usize, T)>> = vec![Vec::new(); size];
        for &(row, col, value) in triplets {
            if row >= size || col >= size {
                return Err(SlaeError::InvalidDimensions(format!(
                    "Triplet ({}, {}) out of bounds for size {}",
                    row, col, size
                )));
            }
            if row == col {
                diagonal[row] += value;
            } else {
                rows[row].push((col, value));
            }
        }

        let mut values = Vec::new();
        let mut columns = Vec::new();
        let mut row_offsets = Vec::with_capacity(size + 1);
        row_offsets.push(0);
        for mut entries in rows {
            entries.sort_by_key(|&(col, _)| col);
            let mut previous = None;
            for (col, value) in entries {
                if previous == Some(col) {
                    if let Some(last) = values.last_mut() {
                        *last += value;
                    }
                } else {
                    columns.push(col);
                    values.push(value);
                    previous = Some(col);
                }
            }
            row_offsets.push(values.len());
        }
        Self::new(diagonal, values, columns, row_offsets)
    }

    /// Creates a zero matrix with the given portrait: `portrait[i]` lists the
    /// off-diagonal columns of row `i` in any order. Values are then accumulated
    /// with [`MsrMatrix::add`].
    pub fn from_portrait(portrait: Vec<Vec<usize>>) -> Result<Self> {
        let size = portrait.len();
        let mut columns = Vec::new();
        let mut row_offsets = Vec::with_capacity(size + 1);
        row_offsets.push(0);
        for (i, mut row) in portrait.into_iter().enumerate() {
            row.sort_unstable();
            row.dedup();
            columns.extend(row.into_iter().filter(|&c| c != i));
            row_offsets.push(columns.len());
        }
        Self::new(
            vec![T::zero(); size],
            vec![T::zero(); columns.len()],
            columns,
            row_offsets,
        )
    }

    /// Checks every structural invariant of the MSR layout.
    pub fn validate(&self) -> Result<()> {
        let n = self.diagonal.len();
        if self.row_offsets.len() != n + 1 {
            return Err(SlaeError::InvalidDimensions(format!(
                "row_offsets length ({}) must be size + 1 ({})",
                self.row_offsets.len(),
                n + 1
            )));
        }
        if self.values.len() != self.columns.len() {
            return Err(SlaeError::InvalidDimensions(format!(
                "values length ({}) must match columns length ({})",
                self.values.len(),
                self.columns.len()
            )));
        }
        if self.row_offsets[0] != 0 {
            return Err(SlaeError::InvalidStructure(format!(
                "row_offsets[0] must be 0, found {}",
                self.row_offsets[0]
            )));
        }
        if self.row_offsets[n] != self.values.len() {
            return Err(SlaeError::InvalidStructure(format!(
                "row_offsets[{}] ({}) must equal nnz ({})",
                n,
                self.row_offsets[n],
                self.values.len()
            )));
        }
        if let Some(i) = self.row_offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(SlaeError::InvalidStructure(format!(
                "row_offsets decrease at row {} ({} > {})",
                i,
                self.row_offsets[i],
                self.row_offsets[i + 1]
            )));
        }
        for i in 0..n {
            let row = &self.columns[self.row_range(i)];
            if let Some(&col) = row.iter().find(|&&c| c >= n) {
                return Err(SlaeError::InvalidStructure(format!(
                    "column {} in row {} is out of bounds for size {}",
                    col, i, n
                )));
            }
            if row.contains(&i) {
                return Err(SlaeError::InvalidStructure(format!(
                    "row {} stores its diagonal entry off the diagonal array",
                    i
                )));
            }
            if row.windows(2).any(|w| w[0] >= w[1]) {
                return Err(SlaeError::InvalidStructure(format!(
                    "columns of row {} are not strictly ascending",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Number of stored off-diagonal entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    #[inline]
    fn row_range(&self, i: usize) -> Range<usize> {
        self.row_offsets[i]..self.row_offsets[i + 1]
    }

    /// Index into `values` where the upper segment of row `i` starts.
    #[inline]
    fn upper_start(&self, i: usize) -> usize {
        let range = self.row_range(i);
        range.start + self.columns[range].partition_point(|&c| c <= i)
    }

    fn find(&self, i: usize, j: usize) -> Option<usize> {
        let range = self.row_range(i);
        let start = range.start;
        self.columns[range].binary_search(&j).ok().map(|k| start + k)
    }

    /// Returns the entry at (i, j), or `None` when it is outside the portrait.
    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        if i >= self.size() || j >= self.size() {
            return None;
        }
        if i == j {
            return Some(self.diagonal[i]);
        }
        self.find(i, j).map(|k| self.values[k])
    }

    /// Adds `value` to the entry at (i, j).
    ///
    /// # Errors
    /// `InvalidStructure` if (i, j) is not part of the portrait.
    pub fn add(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        if i >= self.size() || j >= self.size() {
            return Err(SlaeError::InvalidDimensions(format!(
                "Entry ({}, {}) out of bounds for size {}",
                i,
                j,
                self.size()
            )));
        }
        if i == j {
            self.diagonal[i] += value;
            return Ok(());
        }
        let k = self.find(i, j).ok_or_else(|| {
            SlaeError::InvalidStructure(format!("Entry ({}, {}) is not in the portrait", i, j))
        })?;
        self.values[k] += value;
        Ok(())
    }

    fn check_operands(&self, operation: &'static str, vec: usize, res: usize) -> Result<()> {
        check_len(operation, self.size(), vec)?;
        check_len(operation, self.size(), res)
    }
}

impl<T: Real> Matrix for MsrMatrix<T> {
    type Value = T;
    type Mirror = GpuMsrMatrix;

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
        self.check_operands("msr multiply", vec.len(), res.len())?;
        res.par_iter_mut()
            .enumerate()
            .with_min_len(ROWS_PER_TASK)
            .for_each(|(i, out)| {
                let mut sum = self.diagonal[i] * vec[i];
                for k in self.row_range(i) {
                    sum += self.values[k] * vec[self.columns[k]];
                }
                *out = sum;
            });
        Ok(())
    }

    fn non_zero_values(&self) -> impl Iterator<Item = T> + '_ {
        let non_zero = |v: &&T| !v.is_zero();
        (0..self.size()).flat_map(move |i| {
            let range = self.row_range(i);
            let split = self.upper_start(i);
            self.values[range.start..split]
                .iter()
                .filter(non_zero)
                .copied()
                .chain(std::iter::once(self.diagonal[i]))
                .chain(self.values[split..range.end].iter().filter(non_zero).copied())
        })
    }

    fn to_device(&self, device: &GpuDevice) -> Result<GpuMsrMatrix> {
        device.create_msr_matrix(self)
    }
}

impl<T: Real> Halves for MsrMatrix<T> {
    fn l_mul(&self, vec: &[T], res: &mut [T]) -> Result<()> {
        self.check_operands("msr l_mul", vec.len(), res.len())?;
        res.par_iter_mut()
            .enumerate()
            .with_min_len(ROWS_PER_TASK)
            .for_each(|(i, out)| {
                let mut sum = self.diagonal[i] * vec[i];
                for k in self.row_offsets[i]..self.upper_start(i) {
                    sum += self.values[k] * vec[self.columns[k]];
                }
                *out = sum;
            });
        Ok(())
    }

    fn inv_l_mul(&self, vec: &mut [T]) -> Result<()> {
        check_len("msr inv_l_mul", self.size(), vec.len())?;
        for i in 0..self.size() {
            let mut s = vec[i];
            for k in self.row_offsets[i]..self.upper_start(i) {
                s -= self.values[k] * vec[self.columns[k]];
            }
            vec[i] = s / self.diagonal[i];
        }
        Ok(())
    }

    fn u_mul(&self, vec: &[T], res: &mut [T]) -> Result<()> {
        self.check_operands("msr u_mul", vec.len(), res.len())?;
        res.par_iter_mut()
            .enumerate()
            .with_min_len(ROWS_PER_TASK)
            .for_each(|(i, out)| {
                let mut sum = self.diagonal[i] * vec[i];
                for k in self.upper_start(i)..self.row_offsets[i + 1] {
                    sum += self.values[k] * vec[self.columns[k]];
                }
                *out = sum;
            });
        Ok(())
    }

    fn inv_u_mul(&self, vec: &mut [T]) -> Result<()> {
        check_len("msr inv_u_mul", self.size(), vec.len())?;
        for i in (0..self.size()).rev() {
            let mut s = vec[i];
            for k in self.upper_start(i)..self.row_offsets[i + 1] {
                s -= self.values[k] * vec[self.columns[k]];
            }
            vec[i] = s / self.diagonal[i];
        }
        Ok(())
    }
}
