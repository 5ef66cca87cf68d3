//! Row-compressed sparse matrix (spec §4.3).
//!
//! Grounded on `original_source/include/shiokaze/math/RCMatrix_interface.h`: per-row
//! column/value pairs, `add_to_element`/`clear_element`, two multiply forms (dense-vector
//! and sparse-matrix-vector), and a `FixedSparseMatrix` flavor that freezes the row
//! pointer/column/value arrays for repeated fast mat-vec (`RCMatrix.cpp`'s row-compressed
//! "fix" step).

/// A symmetric-or-general sparse matrix stored as one `(column, value)` list per row.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseMatrix {
    pub fn new(n: usize) -> Self {
        SparseMatrix { rows: vec![Vec::new(); n] }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn add_to_element(&mut self, row: usize, col: usize, value: f64) {
        if let Some(entry) = self.rows[row].iter_mut().find(|(c, _)| *c == col) {
            entry.1 += value;
        } else {
            self.rows[row].push((col, value));
        }
    }

    pub fn clear_element(&mut self, row: usize, col: usize) {
        self.rows[row].retain(|(c, _)| *c != col);
    }

    pub fn clear_row(&mut self, row: usize) {
        self.rows[row].clear();
    }

    pub fn non_zeros(&self, row: usize) -> &[(usize, f64)] {
        &self.rows[row]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.rows[row].iter().find(|(c, _)| *c == col).map(|(_, v)| *v).unwrap_or(0.0)
    }

    /// Dense-vector multiply: `out = self * x`.
    pub fn multiply(&self, x: &[f64], out: &mut [f64]) {
        for (row, entries) in self.rows.iter().enumerate() {
            let mut acc = 0.0;
            for &(col, value) in entries {
                acc += value * x[col];
            }
            out[row] = acc;
        }
    }

    /// Sparse-matrix multiply form: `self * other`, row by row.
    pub fn multiply_matrix(&self, other: &SparseMatrix) -> SparseMatrix {
        let mut result = SparseMatrix::new(self.rows.len());
        for (row, entries) in self.rows.iter().enumerate() {
            for &(col, value) in entries {
                if value == 0.0 {
                    continue;
                }
                for &(ocol, ovalue) in other.non_zeros(col) {
                    result.add_to_element(row, ocol, value * ovalue);
                }
            }
        }
        result
    }

    pub fn transpose(&self) -> SparseMatrix {
        let mut result = SparseMatrix::new(self.rows.len());
        for (row, entries) in self.rows.iter().enumerate() {
            for &(col, value) in entries {
                result.add_to_element(col, row, value);
            }
        }
        result
    }

    pub fn to_fixed(&self) -> FixedSparseMatrix {
        let mut row_ptr = Vec::with_capacity(self.rows.len() + 1);
        let mut cols = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0usize);
        for entries in &self.rows {
            for &(c, v) in entries {
                cols.push(c);
                values.push(v);
            }
            row_ptr.push(cols.len());
        }
        FixedSparseMatrix { row_ptr, cols, values }
    }
}

/// Frozen row-pointer/column/value arrays for fast repeated mat-vec, once a matrix's sparsity
/// pattern stabilizes (e.g. across PCG iterations on one assembled system).
#[derive(Debug, Clone)]
pub struct FixedSparseMatrix {
    row_ptr: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl FixedSparseMatrix {
    pub fn len(&self) -> usize {
        self.row_ptr.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn multiply(&self, x: &[f64], out: &mut [f64]) {
        for row in 0..self.len() {
            let start = self.row_ptr[row];
            let end = self.row_ptr[row + 1];
            let mut acc = 0.0;
            for k in start..end {
                acc += self.values[k] * x[self.cols[k]];
            }
            out[row] = acc;
        }
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        (start..end).map(move |k| (self.cols[k], self.values[k]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_to_element_accumulates() {
        let mut m = SparseMatrix::new(2);
        m.add_to_element(0, 1, 1.0);
        m.add_to_element(0, 1, 2.0);
        assert_eq!(m.get(0, 1), 3.0);
    }

    #[test]
    fn multiply_matches_dense_reference() {
        let mut m = SparseMatrix::new(2);
        m.add_to_element(0, 0, 2.0);
        m.add_to_element(0, 1, 1.0);
        m.add_to_element(1, 1, 3.0);
        let mut out = [0.0; 2];
        m.multiply(&[1.0, 1.0], &mut out);
        assert_eq!(out, [3.0, 3.0]);
    }

    #[test]
    fn fixed_multiply_matches_sparse() {
        let mut m = SparseMatrix::new(3);
        m.add_to_element(0, 0, 1.0);
        m.add_to_element(1, 2, 4.0);
        m.add_to_element(2, 1, 5.0);
        let fixed = m.to_fixed();
        let x = [1.0, 2.0, 3.0];
        let mut a = [0.0; 3];
        let mut b = [0.0; 3];
        m.multiply(&x, &mut a);
        fixed.multiply(&x, &mut b);
        assert_eq!(a, b);
    }
}
