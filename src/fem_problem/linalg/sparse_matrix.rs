use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::{BufMut, BytesMut};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};

/// PETSc class id for binary matrix files
const PETSC_MAT_FILE_CLASSID: i32 = 1211216;
/// PETSc class id for binary vector files
const PETSC_VEC_FILE_CLASSID: i32 = 1211214;

/// Wrapper around a BTreeMap to store square-symmetric matrices in a sparse data structure
///
/// Only the upper triangle is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    /// Size of the square matrix
    pub dimension: usize,
    /// Matrix Entries
    entries: BTreeMap<[u32; 2], f64>,
}

impl SparseMatrix {
    pub fn new(dimension: usize) -> Self {
        assert!(
            dimension <= (u32::MAX as usize),
            "Matrix Dimension cannot exceed the size of a u32!"
        );

        Self {
            dimension,
            entries: BTreeMap::new(),
        }
    }

    /// Number of non-zero entries in the full (upper and lower) matrix
    pub fn num_entries(&self) -> usize {
        let num_diag = self.entries.keys().filter(|[i, j]| i == j).count();
        2 * self.entries.len() - num_diag
    }

    #[inline]
    fn coordinates(&self, [row_idx, col_idx]: [usize; 2]) -> [u32; 2] {
        assert!(
            row_idx < self.dimension,
            "row_idx exceeded matrix dimension; cannot insert value!"
        );
        assert!(
            col_idx < self.dimension,
            "col_idx exceeded matrix dimension; cannot insert value!"
        );

        // both indices are below the dimension, which fits in a u32
        if row_idx <= col_idx {
            [row_idx as u32, col_idx as u32]
        } else {
            [col_idx as u32, row_idx as u32]
        }
    }

    /// Add a value into the matrix. Assumes symmetry: row/col order does not matter.
    pub fn insert(&mut self, rc: [usize; 2], value: f64) {
        let coordinates = self.coordinates(rc);
        *self.entries.entry(coordinates).or_insert(0.0) += value;
    }

    /// Insert a group of entries
    pub fn insert_group(&mut self, entry_group: Vec<([usize; 2], f64)>) {
        for (rc, value) in entry_group {
            self.insert(rc, value);
        }
    }

    /// Value at a location (zero if no entry is stored)
    pub fn get(&self, rc: [usize; 2]) -> f64 {
        self.entries
            .get(&self.coordinates(rc))
            .copied()
            .unwrap_or(0.0)
    }

    // Remove the entries from the matrix, replacing them with an empty BTreeMap.
    fn take_entries(&mut self) -> BTreeMap<[u32; 2], f64> {
        std::mem::take(&mut self.entries)
    }

    /// Consume the entries from another sparse matrix leaving it empty.
    pub fn consume_matrix(&mut self, other: &mut Self) {
        assert!(
            self.dimension == other.dimension,
            "Sparse Matrices have different dimensions; cannot consume matrix!"
        );

        for (coordinates, value) in other.take_entries() {
            *self.entries.entry(coordinates).or_insert(0.0) += value;
        }
    }

    /// Iterate over the upper triangle of the matrix.
    pub fn iter_upper_tri(&self) -> impl Iterator<Item = ([usize; 2], f64)> + '_ {
        self.entries
            .iter()
            .map(|(coords, value)| ([coords[0] as usize, coords[1] as usize], *value))
    }

    pub fn diagonal(&self) -> Vec<f64> {
        let mut diag = vec![0.0; self.dimension];
        for ([r, c], v) in self.iter_upper_tri() {
            if r == c {
                diag[r] = v;
            }
        }
        diag
    }

    /// Compute `A x` using the full symmetric matrix
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(
            x.len(),
            self.dimension,
            "Vector length does not match matrix dimension; cannot multiply!"
        );

        let mut y = vec![0.0; self.dimension];
        for ([r, c], v) in self.iter_upper_tri() {
            y[r] += v * x[c];
            if r != c {
                y[c] += v * x[r];
            }
        }
        y
    }

    /// Convert into a compressed sparse column matrix holding both triangles
    pub fn to_csc(&self) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(self.dimension, self.dimension);
        for ([r, c], v) in self.iter_upper_tri() {
            coo.push(r, c, v);
            if r != c {
                coo.push(c, r, v);
            }
        }
        CscMatrix::from(&coo)
    }
}

impl From<&SparseMatrix> for DMatrix<f64> {
    fn from(sm: &SparseMatrix) -> Self {
        let mut dense = DMatrix::zeros(sm.dimension, sm.dimension);

        for ([r, c], v) in sm.iter_upper_tri() {
            dense[(r, c)] = v;
            dense[(c, r)] = v;
        }

        dense
    }
}

impl From<&SparseMatrix> for AIJMatrixBinary {
    fn from(sm: &SparseMatrix) -> Self {
        // number of entries in each row
        let mut row_counts = vec![0; sm.dimension];

        for [r, c] in sm.entries.keys() {
            row_counts[*r as usize] += 1;
            if r != c {
                row_counts[*c as usize] += 1;
            }
        }

        // upper and lower triangles of matrix; sorted by row then column
        let mut full_matrix: BTreeMap<[u32; 2], f64> = sm
            .entries
            .iter()
            .map(|([r, c], v)| ([*c, *r], *v))
            .collect();
        full_matrix.extend(sm.entries.iter().map(|(rc, v)| (*rc, *v)));

        // matrix entries and their associated columns
        let (j, a) = full_matrix
            .iter()
            .map(|([_, c], v)| (*c as i32, *v))
            .unzip();

        AIJMatrixBinary {
            a,
            i: row_counts,
            j,
            dim: sm.dimension,
        }
    }
}

/// Petsc Sparse Matrix Format
pub struct AIJMatrixBinary {
    pub a: Vec<f64>,
    pub i: Vec<i32>, // Number of entries on each row (compute a prefix sum to get canonical form)
    pub j: Vec<i32>,
    pub dim: usize,
}

impl AIJMatrixBinary {
    pub fn print_to_petsc_binary_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);

        // header
        let mut header_buf = BytesMut::with_capacity(16);
        header_buf.put_i32(PETSC_MAT_FILE_CLASSID);
        header_buf.put_i32(self.dim as i32);
        header_buf.put_i32(self.dim as i32);
        header_buf.put_i32(self.a.len() as i32);
        writer.write_all(header_buf.as_ref())?;

        // num-non-zero entries on each row
        let mut rnnz_buf = BytesMut::with_capacity(self.i.len() * 4);
        for &rnz in self.i.iter() {
            rnnz_buf.put_i32(rnz);
        }
        writer.write_all(rnnz_buf.as_ref())?;

        // column indices of non-zero entries
        let mut j_buf = BytesMut::with_capacity(self.j.len() * 4);
        for &j in self.j.iter() {
            j_buf.put_i32(j);
        }
        writer.write_all(j_buf.as_ref())?;

        // non-zero entries
        let mut a_buf = BytesMut::with_capacity(self.a.len() * 8);
        for &a in self.a.iter() {
            a_buf.put_f64(a);
        }
        writer.write_all(a_buf.as_ref())?;

        writer.flush()
    }
}

/// Write a dense vector in Petsc's binary vector format
pub fn print_vector_to_petsc_binary_file(values: &[f64], path: impl AsRef<Path>) -> std::io::Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    let mut buf = BytesMut::with_capacity(8 + values.len() * 8);
    buf.put_i32(PETSC_VEC_FILE_CLASSID);
    buf.put_i32(values.len() as i32);
    for &v in values {
        buf.put_f64(v);
    }
    writer.write_all(buf.as_ref())?;

    writer.flush()
}

/// Convert a slice into a nalgebra column vector
pub fn to_dvector(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> SparseMatrix {
        let mut sm = SparseMatrix::new(10);

        sm.insert([0, 0], 1.0);
        sm.insert([0, 0], 1.0);
        sm.insert([9, 9], 10.0);
        sm.insert([4, 3], 0.25);
        sm.insert([0, 8], 0.125);
        sm.insert([8, 0], 0.125);
        sm
    }

    #[test]
    fn petsc_binary_format() {
        let sm = sample_matrix();
        let sm_bin: AIJMatrixBinary = (&sm).into();

        assert_eq!(sm_bin.i, vec![2, 0, 0, 1, 1, 0, 0, 0, 1, 1]);
        assert_eq!(sm_bin.j, vec![0, 8, 4, 3, 0, 9]);
        assert_eq!(sm_bin.a.len(), sm.num_entries());

        let path = std::env::temp_dir().join("heat_fem_2d_sparse_matrix_test.dat");
        sm_bin.print_to_petsc_binary_file(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 16 + 10 * 4 + 6 * 4 + 6 * 8);
        assert_eq!(&bytes[0..4], &PETSC_MAT_FILE_CLASSID.to_be_bytes());
    }

    #[test]
    fn value_insertion() {
        let mut sm = sample_matrix();

        assert!((sm.get([3, 4]) - 0.25).abs() < 1e-15);
        assert!((sm.get([4, 3]) - 0.25).abs() < 1e-15);
        assert_eq!(sm.get([5, 5]), 0.0);

        let raw_entries = sm.take_entries();

        assert!((raw_entries.get(&[0, 0]).unwrap() - 2.0).abs() < 1e-15);
        assert!((raw_entries.get(&[9, 9]).unwrap() - 10.0).abs() < 1e-15);
        assert!((raw_entries.get(&[3, 4]).unwrap() - 0.25).abs() < 1e-15);
        assert!((raw_entries.get(&[0, 8]).unwrap() - 0.25).abs() < 1e-15);

        assert!(raw_entries.get(&[4, 3]).is_none());
        assert!(raw_entries.get(&[8, 0]).is_none());
    }

    #[test]
    fn consume_another_matrix() {
        let mut sm_a = SparseMatrix::new(5);
        let mut sm_b = SparseMatrix::new(5);

        for i in 0..5 {
            sm_a.insert([i, i], (i + 1) as f64);
            sm_b.insert([i, i], (5 - i) as f64);
        }
        sm_a.insert([0, 4], 0.5);
        sm_a.insert([3, 1], 0.5);
        sm_b.insert([4, 0], -0.5);
        sm_b.insert([2, 3], -0.5);

        sm_a.consume_matrix(&mut sm_b);

        assert_eq!(sm_b.num_entries(), 0);
        assert_eq!(sm_a.diagonal(), vec![6.0; 5]);
        assert!(sm_a.get([0, 4]).abs() < 1e-15);
        assert!((sm_a.get([1, 3]) - 0.5).abs() < 1e-15);
        assert!((sm_a.get([2, 3]) + 0.5).abs() < 1e-15);
    }

    #[test]
    fn symmetric_products_agree() {
        let sm = sample_matrix();
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.5 - 1.0).collect();

        let y = sm.mul_vec(&x);
        let dense = DMatrix::from(&sm) * to_dvector(&x);
        let csc = sm.to_csc();

        assert_eq!(csc.nnz(), sm.num_entries());
        for (a, b) in y.iter().zip(dense.iter()) {
            assert!((a - b).abs() < 1e-14);
        }
        assert!((y[0] - (2.0 * -1.0 + 0.25 * 3.0)).abs() < 1e-14);
    }

    #[test]
    #[should_panic]
    fn consume_matrix_of_different_dim() {
        let mut sm_a = SparseMatrix::new(5);
        let mut sm_b = SparseMatrix::new(6);

        sm_a.consume_matrix(&mut sm_b);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_insertion() {
        let mut sm = SparseMatrix::new(10);
        sm.insert([10, 2], 1.0);
    }
}
