//! # Linear Algebra
//!
//! $$
//! (AB)_{ij}=\sum_k A_{ik}B_{kj}
//! $$
//!
//! Dense row-major matrix and vector primitives over `Vec<Vec<f64>>`.
//! Every binary operation checks operand shapes and fails with both shapes in
//! the error message instead of truncating or padding.

use anyhow::bail;
use anyhow::Result;
use nalgebra::Cholesky;
use nalgebra::DMatrix;

/// Row-major dense matrix.
pub type Matrix = Vec<Vec<f64>>;

/// Shape of a row-major matrix as `(rows, cols)`.
///
/// Ragged matrices report the length of the first row as their column count;
/// [`ensure_rectangular`] rejects them.
pub fn shape(a: &[Vec<f64>]) -> (usize, usize) {
  (a.len(), a.first().map(|row| row.len()).unwrap_or(0))
}

/// Fail if any row length differs from the first one.
pub fn ensure_rectangular(a: &[Vec<f64>], name: &str) -> Result<()> {
  let (_, cols) = shape(a);
  if let Some((i, row)) = a.iter().enumerate().find(|(_, row)| row.len() != cols) {
    bail!(
      "{name}: ragged matrix, row {i} has {} columns but row 0 has {cols}",
      row.len()
    );
  }
  Ok(())
}

fn ensure_square(a: &[Vec<f64>], name: &str) -> Result<usize> {
  ensure_rectangular(a, name)?;
  let (rows, cols) = shape(a);
  if rows != cols {
    bail!("{name}: expected a square matrix, got {rows}x{cols}");
  }
  Ok(rows)
}

/// Matrix product `A·B`.
pub fn multiply(a: &[Vec<f64>], b: &[Vec<f64>]) -> Result<Matrix> {
  ensure_rectangular(a, "multiply (left)")?;
  ensure_rectangular(b, "multiply (right)")?;
  let (ar, ac) = shape(a);
  let (br, bc) = shape(b);
  if ac != br {
    bail!("multiply: left operand is {ar}x{ac}, right operand is {br}x{bc}");
  }

  let mut out = vec![vec![0.0; bc]; ar];
  for i in 0..ar {
    for k in 0..ac {
      let aik = a[i][k];
      if aik == 0.0 {
        continue;
      }
      for j in 0..bc {
        out[i][j] += aik * b[k][j];
      }
    }
  }
  Ok(out)
}

/// Matrix-vector product `A·v`.
pub fn mat_vec_mul(a: &[Vec<f64>], v: &[f64]) -> Result<Vec<f64>> {
  ensure_rectangular(a, "mat_vec_mul")?;
  let (rows, cols) = shape(a);
  if rows > 0 && cols != v.len() {
    bail!(
      "mat_vec_mul: matrix is {rows}x{cols}, vector has length {}",
      v.len()
    );
  }
  Ok(
    a.iter()
      .map(|row| row.iter().zip(v.iter()).map(|(x, y)| x * y).sum())
      .collect(),
  )
}

/// Inner product of two vectors of equal length.
pub fn dot(a: &[f64], b: &[f64]) -> Result<f64> {
  if a.len() != b.len() {
    bail!(
      "dot: left vector has length {}, right vector has length {}",
      a.len(),
      b.len()
    );
  }
  Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Transpose of a rectangular matrix.
pub fn transpose(a: &[Vec<f64>]) -> Result<Matrix> {
  ensure_rectangular(a, "transpose")?;
  let (rows, cols) = shape(a);
  let mut out = vec![vec![0.0; rows]; cols];
  for (i, row) in a.iter().enumerate() {
    for (j, &x) in row.iter().enumerate() {
      out[j][i] = x;
    }
  }
  Ok(out)
}

/// `n × n` identity matrix.
pub fn identity(n: usize) -> Matrix {
  let mut out = vec![vec![0.0; n]; n];
  for (i, row) in out.iter_mut().enumerate() {
    row[i] = 1.0;
  }
  out
}

fn elementwise(
  a: &[Vec<f64>],
  b: &[Vec<f64>],
  op: &str,
  f: impl Fn(f64, f64) -> f64,
) -> Result<Matrix> {
  ensure_rectangular(a, op)?;
  ensure_rectangular(b, op)?;
  let (ar, ac) = shape(a);
  let (br, bc) = shape(b);
  if ar != br || ac != bc {
    bail!("{op}: left operand is {ar}x{ac}, right operand is {br}x{bc}");
  }
  Ok(
    a.iter()
      .zip(b.iter())
      .map(|(ra, rb)| ra.iter().zip(rb.iter()).map(|(&x, &y)| f(x, y)).collect())
      .collect(),
  )
}

/// Element-wise sum `A + B`.
pub fn add(a: &[Vec<f64>], b: &[Vec<f64>]) -> Result<Matrix> {
  elementwise(a, b, "add", |x, y| x + y)
}

/// Element-wise difference `A − B`.
pub fn subtract(a: &[Vec<f64>], b: &[Vec<f64>]) -> Result<Matrix> {
  elementwise(a, b, "subtract", |x, y| x - y)
}

/// Scalar multiple `s·A`.
pub fn scale(a: &[Vec<f64>], s: f64) -> Matrix {
  a.iter()
    .map(|row| row.iter().map(|&x| x * s).collect())
    .collect()
}

/// Quadratic form `vᵀAv`.
pub fn quadratic_form(a: &[Vec<f64>], v: &[f64]) -> Result<f64> {
  let av = mat_vec_mul(a, v)?;
  dot(v, &av)
}

/// Copy a row-major matrix into an nalgebra matrix.
pub fn to_dmatrix(a: &[Vec<f64>]) -> Result<DMatrix<f64>> {
  ensure_rectangular(a, "to_dmatrix")?;
  let (rows, cols) = shape(a);
  Ok(DMatrix::from_fn(rows, cols, |i, j| a[i][j]))
}

/// Copy an nalgebra matrix back into row-major form.
pub fn from_dmatrix(m: &DMatrix<f64>) -> Matrix {
  (0..m.nrows())
    .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
    .collect()
}

/// Positive-definiteness check by attempting a Cholesky factorization.
///
/// Non-square, empty and non-finite matrices are never positive definite.
pub fn is_positive_definite(a: &[Vec<f64>]) -> bool {
  let n = match ensure_square(a, "is_positive_definite") {
    Ok(n) => n,
    Err(_) => return false,
  };
  if n == 0 || a.iter().flatten().any(|x| !x.is_finite()) {
    return false;
  }
  let m = DMatrix::from_fn(n, n, |i, j| a[i][j]);
  Cholesky::new(m).is_some()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn multiply_matches_hand_computation() {
    let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
    let b = vec![vec![5.0, 6.0], vec![7.0, 8.0]];
    let c = multiply(&a, &b).unwrap();
    assert_eq!(c, vec![vec![19.0, 22.0], vec![43.0, 50.0]]);
  }

  #[test]
  fn multiply_reports_both_shapes_on_mismatch() {
    let a = vec![vec![1.0, 2.0, 3.0]];
    let b = vec![vec![1.0, 2.0]];
    let err = multiply(&a, &b).unwrap_err().to_string();
    assert!(err.contains("1x3"), "{err}");
    assert!(err.contains("1x2"), "{err}");
  }

  #[test]
  fn mat_vec_and_dot_reject_length_mismatch() {
    let a = identity(3);
    assert!(mat_vec_mul(&a, &[1.0, 2.0]).is_err());
    assert!(dot(&[1.0], &[1.0, 2.0]).is_err());
    assert_eq!(mat_vec_mul(&a, &[1.0, 2.0, 3.0]).unwrap(), vec![1.0, 2.0, 3.0]);
  }

  #[test]
  fn transpose_of_rectangular_matrix() {
    let a = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
    let t = transpose(&a).unwrap();
    assert_eq!(t, vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
  }

  #[test]
  fn ragged_rows_are_rejected() {
    let a = vec![vec![1.0, 2.0], vec![3.0]];
    assert!(transpose(&a).is_err());
    assert!(add(&a, &a).is_err());
  }

  #[test]
  fn add_subtract_scale() {
    let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
    let i = identity(2);
    let sum = add(&a, &i).unwrap();
    assert_eq!(sum, vec![vec![2.0, 2.0], vec![3.0, 5.0]]);
    assert_eq!(subtract(&sum, &i).unwrap(), a);
    assert_eq!(scale(&a, 2.0)[1][1], 8.0);
    assert!(subtract(&a, &identity(3)).is_err());
  }

  #[test]
  fn positive_definiteness() {
    assert!(is_positive_definite(&identity(3)));
    let singular = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
    assert!(!is_positive_definite(&singular));
    assert!(!is_positive_definite(&[]));
    assert!(!is_positive_definite(&[vec![1.0, 0.0]]));
  }

  #[test]
  fn dmatrix_round_trip_preserves_layout() {
    let a = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
    let m = to_dmatrix(&a).unwrap();
    assert_eq!(m[(1, 0)], 4.0);
    assert_eq!(from_dmatrix(&m), a);
  }
}
