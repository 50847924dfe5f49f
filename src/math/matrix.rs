use rand::Rng;
use serde::{Serialize, Deserialize};
use std::ops::{Add, Mul};

use crate::math::sample_standard_normal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Vec<f64>>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![vec![0.0; cols]; rows],
        }
    }

    /// He initialization: samples from N(0, sqrt(2 / rows)).
    ///
    /// Shape: (rows, cols). Dense weights are stored input-major, so `rows`
    /// is the fan-in here.
    pub fn he<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Matrix {
        let std_dev = (2.0 / rows.max(1) as f64).sqrt();
        Matrix::normal(rows, cols, std_dev, rng)
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / rows)).
    pub fn xavier<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Matrix {
        let std_dev = (1.0 / rows.max(1) as f64).sqrt();
        Matrix::normal(rows, cols, std_dev, rng)
    }

    fn normal<R: Rng + ?Sized>(rows: usize, cols: usize, std_dev: f64, rng: &mut R) -> Matrix {
        let mut res = Matrix::zeros(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                res.data[i][j] = sample_standard_normal(rng) * std_dev;
            }
        }
        res
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix::zeros(self.cols, self.rows);

        for i in 0..res.rows {
            for j in 0..res.cols {
                res.data[i][j] = self.data[j][i];
            }
        }

        res
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data
                .iter()
                .map(|row| row.iter().map(|&x| functor(x)).collect())
                .collect(),
        }
    }

    pub fn from_data(data: Vec<Vec<f64>>) -> Matrix {
        Matrix {
            rows: data.len(),
            cols: data.first().map_or(0, |row| row.len()),
            data,
        }
    }

    /// Wraps a slice as a 1 x n row vector.
    pub fn row(values: &[f64]) -> Matrix {
        Matrix::from_data(vec![values.to_vec()])
    }

    /// Element-wise (Hadamard) product of two same-shape matrices.
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.rows, other.rows);
        assert_eq!(self.cols, other.cols);
        let data = self.data.iter().zip(other.data.iter())
            .map(|(row_a, row_b)| {
                row_a.iter().zip(row_b.iter()).map(|(x, y)| x * y).collect()
            })
            .collect();
        Matrix::from_data(data)
    }
}

impl Add for Matrix {
    type Output = Matrix;

    fn add(self, rhs: Self) -> Self::Output {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.rows, self.cols);

        for i in 0..self.rows {
            for j in 0..self.cols {
                res.data[i][j] = self.data[i][j] + rhs.data[i][j];
            }
        }

        res
    }
}

impl Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Self) -> Self::Output {
        if self.cols != rhs.rows {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.rows, rhs.cols);

        for i in 0..res.rows {
            for j in 0..res.cols {
                let mut sum = 0.0;

                for k in 0..self.cols {
                    sum += self.data[i][k] * rhs.data[k][j];
                }

                res.data[i][j] = sum;
            }
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn row_vector_times_matrix() {
        let x = Matrix::row(&[1.0, 2.0]);
        let w = Matrix::from_data(vec![vec![1.0, 0.0, -1.0], vec![0.5, 2.0, 1.0]]);
        let y = &x * &w;
        assert_eq!(y.data, vec![vec![2.0, 4.0, 1.0]]);
    }

    #[test]
    fn transpose_swaps_shape() {
        let m = Matrix::from_data(vec![vec![1.0, 2.0, 3.0]]);
        let t = m.transpose();
        assert_eq!((t.rows, t.cols), (3, 1));
        assert_eq!(t.data[2][0], 3.0);
    }

    #[test]
    fn he_init_is_seeded() {
        let a = Matrix::he(4, 3, &mut StdRng::seed_from_u64(7));
        let b = Matrix::he(4, 3, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
