// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A dense row-major matrix of `f64`.

pub mod graph;

use crate::error::{Error, Result};

/// The `(rows, cols)` dimensions of a [`Matrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    /// number of rows
    pub rows: usize,
    /// number of columns
    pub cols: usize,
}

impl Shape {
    /// Builds a shape.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }
}

/// A dense, row-major `rows x cols` matrix of `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    shape: Shape,
    data: Vec<f64>,
}

impl Matrix {
    /// Builds a matrix of zeros with the given shape.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            shape: Shape::new(rows, cols),
            data: vec![0.0; rows * cols],
        }
    }

    /// Builds a matrix from row-major data. `data.len()` must equal
    /// `rows * cols`.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    #[must_use]
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), rows * cols, "matrix data length must match shape");
        Self {
            shape: Shape::new(rows, cols),
            data,
        }
    }

    /// The `(rows, cols)` shape of this matrix.
    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    fn index(&self, row: usize, col: usize) -> usize {
        row * self.shape.cols + col
    }

    /// Returns the value at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[self.index(row, col)]
    }

    /// Sets the value at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let idx = self.index(row, col);
        self.data[idx] = value;
    }

    fn check_same_shape(&self, other: &Self) -> Result<()> {
        if self.shape == other.shape {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                lhs: self.shape,
                rhs: other.shape,
            })
        }
    }

    /// Elementwise addition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the shapes differ.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other)?;
        let data = self.data.iter().zip(&other.data).map(|(a, b)| a + b).collect();
        Ok(Self {
            shape: self.shape,
            data,
        })
    }

    /// Matrix multiplication: `self` is `(n, m)`, `other` is `(m, p)`,
    /// result is `(n, p)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if `self.shape.cols !=
    /// other.shape.rows`.
    pub fn multiply(&self, other: &Self) -> Result<Self> {
        if self.shape.cols != other.shape.rows {
            return Err(Error::ShapeMismatch {
                lhs: self.shape,
                rhs: other.shape,
            });
        }
        let (n, m, p) = (self.shape.rows, self.shape.cols, other.shape.cols);
        let mut result = Self::zeros(n, p);
        for i in 0..n {
            for k in 0..m {
                let a = self.get(i, k);
                if a == 0.0 {
                    continue;
                }
                for j in 0..p {
                    let prev = result.get(i, j);
                    result.set(i, j, prev + a * other.get(k, j));
                }
            }
        }
        Ok(result)
    }

    /// Matrix times column vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if `self.shape.cols != vector.len()`.
    pub fn multiply_vector(&self, vector: &[f64]) -> Result<Vec<f64>> {
        if self.shape.cols != vector.len() {
            return Err(Error::ShapeMismatch {
                lhs: self.shape,
                rhs: Shape::new(vector.len(), 1),
            });
        }
        let mut out = vec![0.0; self.shape.rows];
        for (i, slot) in out.iter_mut().enumerate() {
            let mut acc = 0.0;
            for j in 0..self.shape.cols {
                acc += self.get(i, j) * vector[j];
            }
            *slot = acc;
        }
        Ok(out)
    }

    /// Scales every cell by `scale` and adds `addend`.
    #[must_use]
    pub fn scale_and_add(&self, scale: f64, addend: f64) -> Self {
        Self {
            shape: self.shape,
            data: self.data.iter().map(|v| v * scale + addend).collect(),
        }
    }

    /// Returns `true` if every cell of `self` and `other` is within `eps`
    /// of each other and the shapes match.
    #[must_use]
    pub fn equal(&self, other: &Self, eps: f64) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a - b).abs() <= eps)
    }

    /// Builds the standard Jukes-Cantor substitution matrix for evolutionary
    /// distance `d` over an alphabet of size `n`: diagonal entries are
    /// `1/n + (n-1)/n * exp(-n*d/(n-1))`, off-diagonal entries are
    /// `1/n - 1/n * exp(-n*d/(n-1))`.
    #[must_use]
    pub fn jukes_cantor(d: f64, n: usize) -> Self {
        let nf = n as f64;
        let mut m = Self::zeros(n, n);
        if n == 0 {
            return m;
        }
        let decay = (-nf * d / (nf - 1.0)).exp();
        let diag = 1.0 / nf + (nf - 1.0) / nf * decay;
        let off = 1.0 / nf - decay / nf;
        for i in 0..n {
            for j in 0..n {
                m.set(i, j, if i == j { diag } else { off });
            }
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jukes_cantor_zero_distance_is_identity() {
        let m = Matrix::jukes_cantor(0.0, 4);
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((m.get(i, j) - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn multiply_by_identity_is_identity() {
        let a = Matrix::from_row_major(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let ident = Matrix::jukes_cantor(0.0, 2);
        let product = a.multiply(&ident).unwrap();
        assert!(product.equal(&a, 1e-9));
    }

    #[test]
    fn add_zero_is_identity() {
        let a = Matrix::from_row_major(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let zero = Matrix::zeros(2, 2);
        let sum = a.add(&zero).unwrap();
        assert!(sum.equal(&a, 1e-9));
    }

    #[test]
    fn shape_mismatch_errors() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(4, 3);
        assert!(matches!(a.add(&b), Err(Error::ShapeMismatch { .. })));
        assert!(matches!(a.multiply(&b), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn multiply_vector_checks_length() {
        let a = Matrix::from_row_major(2, 3, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let v = vec![5.0, 7.0, 9.0];
        assert_eq!(a.multiply_vector(&v).unwrap(), vec![5.0, 7.0]);
        assert!(a.multiply_vector(&[1.0, 2.0]).is_err());
    }
}
