use crate::errors::{
    PreconditionError,
    Result,
};

/// Dense intensity block, indexed by (lc scan, ims scan).
///
/// `values` is a flattened array of values
/// `ncols` is the number of values in each row (IMS scans)
/// `nrows` is the number of rows (LC scans)
///
/// Note on memory layout:
///
/// Values that belong to the same row (same LC scan) are adjacent
/// in memory, so row sweeps are contiguous and column sweeps are strided.
#[derive(Debug, Clone, PartialEq)]
pub struct Array2D<T: Clone + Copy> {
    values: Vec<T>,
    ncols: usize,
    nrows: usize,
}

impl<T: Clone + Copy> Array2D<T> {
    /// Builds the array from a slice of rows.
    ///
    /// Example:
    /// ```
    /// use mdpeaks::Array2D;
    /// let array = Array2D::new(vec![vec![1., 2., 3.], vec![4., 5., 6.]]).unwrap();
    /// assert_eq!(array.nrows(), 2);
    /// assert_eq!(array.ncols(), 3);
    /// assert_eq!(array.get(1, 0), Some(4.));
    /// ```
    pub fn new<S: AsRef<[T]>, C: AsRef<[S]>>(values: C) -> Result<Array2D<T>> {
        let rows = values.as_ref();
        let nrows = rows.len();
        if nrows == 0 {
            return Err(PreconditionError::ExpectedNonEmptyData.into());
        }
        let ncols = rows[0].as_ref().len();
        if ncols == 0 {
            return Err(PreconditionError::ExpectedNonEmptyData.into());
        }

        let mut flat = Vec::with_capacity(nrows * ncols);
        for (ri, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != ncols {
                return Err(PreconditionError::RaggedRows {
                    row: ri,
                    expected: ncols,
                    real: row.len(),
                }
                .into());
            }
            flat.extend_from_slice(row);
        }

        Ok(Array2D {
            values: flat,
            ncols,
            nrows,
        })
    }

    pub fn from_flat_vector(values: Vec<T>, nrows: usize, ncols: usize) -> Result<Array2D<T>> {
        if nrows == 0 || ncols == 0 {
            return Err(PreconditionError::ExpectedNonEmptyData.into());
        }
        if values.len() != nrows * ncols {
            return Err(PreconditionError::ExpectedVectorLength {
                real: values.len(),
                expected: nrows * ncols,
            }
            .into());
        }
        Ok(Array2D {
            values,
            ncols,
            nrows,
        })
    }

    /// Array of the given shape filled with `value`.
    pub fn filled(nrows: usize, ncols: usize, value: T) -> Result<Array2D<T>> {
        Self::from_flat_vector(vec![value; nrows * ncols], nrows, ncols)
    }

    pub fn get(&self, row_idx: usize, col_idx: usize) -> Option<T> {
        if row_idx >= self.nrows || col_idx >= self.ncols {
            return None;
        }
        Some(self.values[row_idx * self.ncols + col_idx])
    }

    pub fn insert(&mut self, row_idx: usize, col_idx: usize, value: T) {
        let idx = row_idx * self.ncols + col_idx;
        self.values[idx] = value;
    }

    pub fn get_row(&self, index: usize) -> Option<&[T]> {
        if index >= self.nrows {
            return None;
        }
        let start = index * self.ncols;
        Some(&self.values[start..start + self.ncols])
    }

    /// Copies out a column (strided in memory).
    pub fn get_col(&self, index: usize) -> Option<Vec<T>> {
        if index >= self.ncols {
            return None;
        }
        Some(
            self.values
                .iter()
                .skip(index)
                .step_by(self.ncols)
                .copied()
                .collect(),
        )
    }

    /// Writes `values` into column `index`.
    ///
    /// # Panics
    /// Panics if the column does not exist or `values` is not `nrows` long.
    pub fn set_col(&mut self, index: usize, values: &[T]) {
        assert!(index < self.ncols, "Column {} out of bounds", index);
        assert_eq!(values.len(), self.nrows, "Column length mismatch");
        for (ri, v) in values.iter().enumerate() {
            self.values[ri * self.ncols + index] = *v;
        }
    }

    pub fn iter_mut_rows(&mut self) -> impl Iterator<Item = &mut [T]> {
        self.values.chunks_mut(self.ncols)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn transpose(&self) -> Array2D<T> {
        let mut result = Vec::with_capacity(self.values.len());
        for j in 0..self.ncols {
            for i in 0..self.nrows {
                result.push(self.values[i * self.ncols + j]);
            }
        }

        Array2D {
            values: result,
            ncols: self.nrows,
            nrows: self.ncols,
        }
    }
}
