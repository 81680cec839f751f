//! Compressed-sparse-column matrices assembled from coordinate triples.
//!
//! Entries are accumulated as `(row, col, value)` in a [`TripletBuilder`] and
//! materialised once; duplicates are summed and row indices are sorted within
//! each column, which is the canonical form interior-point backends expect.

use ndarray::Array2;

/// Sparse matrix in compressed-sparse-column layout.
#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix {
    pub nrows: usize,
    pub ncols: usize,
    /// Column start offsets into `rowval`/`nzval`, length `ncols + 1`.
    pub colptr: Vec<usize>,
    pub rowval: Vec<usize>,
    pub nzval: Vec<f64>,
}

impl CscMatrix {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            colptr: vec![0; ncols + 1],
            rowval: Vec::new(),
            nzval: Vec::new(),
        }
    }

    pub fn nnz(&self) -> usize {
        self.nzval.len()
    }

    /// Stored entries of column `j` as `(row, value)`.
    pub fn column(&self, j: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.colptr[j]..self.colptr[j + 1];
        self.rowval[range.clone()]
            .iter()
            .copied()
            .zip(self.nzval[range].iter().copied())
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.colptr[col]..self.colptr[col + 1];
        match self.rowval[range.clone()].binary_search(&row) {
            Ok(k) => self.nzval[range.start + k],
            Err(_) => 0.0,
        }
    }

    /// `self * x`
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.ncols);
        let mut out = vec![0.0; self.nrows];
        for (j, &xj) in x.iter().enumerate() {
            if xj == 0.0 {
                continue;
            }
            for (i, v) in self.column(j) {
                out[i] += v * xj;
            }
        }
        out
    }

    /// `selfᵀ * y`
    pub fn tr_mul_vec(&self, y: &[f64]) -> Vec<f64> {
        debug_assert_eq!(y.len(), self.nrows);
        (0..self.ncols)
            .map(|j| self.column(j).map(|(i, v)| v * y[i]).sum())
            .collect()
    }

    pub fn is_upper_triangular(&self) -> bool {
        (0..self.ncols).all(|j| self.column(j).all(|(i, _)| i <= j))
    }

    /// Upper triangle of the Gram matrix `selfᵀ * self`.
    ///
    /// Every row contributes the outer product of its own non-zeros, so the
    /// cost is proportional to the sum of squared row densities.
    pub fn gram_upper(&self) -> CscMatrix {
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.nrows];
        for j in 0..self.ncols {
            for (i, v) in self.column(j) {
                rows[i].push((j, v));
            }
        }

        let mut builder = TripletBuilder::new(self.ncols, self.ncols);
        for row in &rows {
            for (a, &(ca, va)) in row.iter().enumerate() {
                for &(cb, vb) in &row[a..] {
                    builder.push(ca, cb, va * vb);
                }
            }
        }
        builder.build()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.nrows, self.ncols));
        for j in 0..self.ncols {
            for (i, v) in self.column(j) {
                dense[[i, j]] += v;
            }
        }
        dense
    }
}

/// Coordinate-list accumulator for [`CscMatrix`].
#[derive(Debug, Clone)]
pub struct TripletBuilder {
    nrows: usize,
    ncols: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl TripletBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self::with_capacity(nrows, ncols, 0)
    }

    pub fn with_capacity(nrows: usize, ncols: usize, capacity: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.nrows && col < self.ncols, "({row}, {col}) out of bounds");
        self.entries.push((row, col, value));
    }

    /// Copy `block * scale` with its top-left corner at `(row_offset, col_offset)`.
    pub fn push_block(&mut self, row_offset: usize, col_offset: usize, block: &CscMatrix, scale: f64) {
        for j in 0..block.ncols {
            for (i, v) in block.column(j) {
                self.push(row_offset + i, col_offset + j, scale * v);
            }
        }
    }

    /// Identity block of size `size * scale` at `(row_offset, col_offset)`.
    pub fn push_identity(&mut self, row_offset: usize, col_offset: usize, size: usize, scale: f64) {
        for k in 0..size {
            self.push(row_offset + k, col_offset + k, scale);
        }
    }

    pub fn build(mut self) -> CscMatrix {
        self.entries.sort_unstable_by_key(|&(i, j, _)| (j, i));

        let mut colptr = vec![0; self.ncols + 1];
        let mut rowval = Vec::with_capacity(self.entries.len());
        let mut nzval: Vec<f64> = Vec::with_capacity(self.entries.len());
        let mut last: Option<(usize, usize)> = None;

        for (i, j, v) in self.entries {
            if last == Some((i, j)) {
                if let Some(acc) = nzval.last_mut() {
                    *acc += v;
                }
                continue;
            }
            rowval.push(i);
            nzval.push(v);
            colptr[j + 1] += 1;
            last = Some((i, j));
        }
        for j in 0..self.ncols {
            colptr[j + 1] += colptr[j];
        }

        CscMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            colptr,
            rowval,
            nzval,
        }
    }
}
