use nalgebra::{DMatrix, SymmetricEigen};

/// 1D Gauss Legendre Quadrature integral of some function F defined over a set of points
///
/// ```
/// use heat_fem_2d::fem_problem::integration::glq::*;
///
/// let (points, weights) = gauss_quadrature_points(4);
///
/// // a 4 point rule is exact for polynomials up to degree 7
/// let solution = real_gauss_quad_1d(&weights, |m| points[m].powi(6));
/// assert!((solution - 2.0 / 7.0).abs() < 1e-12);
/// ```
pub fn real_gauss_quad_1d<F>(weights: &[f64], integrand: F) -> f64
where
    F: Fn(usize) -> f64,
{
    weights
        .iter()
        .enumerate()
        .map(|(m, w)| integrand(m) * w)
        .sum()
}

/// Get a set of n Gauss-Legendre-Quadrature Integration points and weights over `(-1, 1)` (sorted by ascending point)
///
/// ```
/// use heat_fem_2d::fem_problem::integration::glq::*;
///
/// // generate 10 GLQ points and weights over the range `(-1, 1)`
/// let (points, weights) = gauss_quadrature_points(10);
/// assert_eq!(points.len(), 10);
/// assert_eq!(weights.len(), 10);
/// assert!(points.iter().sum::<f64>().abs() < 1e-12);
/// assert!((weights.iter().sum::<f64>() - 2.0).abs() < 1e-12);
/// ```
// https://en.wikipedia.org/wiki/Gaussian_quadrature#Gauss%E2%80%93Legendre_quadrature
// Golub-Welsch: the points are the eigenvalues of the symmetric tridiagonal Jacobi matrix
pub fn gauss_quadrature_points(n: usize) -> (Vec<f64>, Vec<f64>) {
    if n == 0 {
        return (Vec::new(), Vec::new());
    }

    let betas: Vec<f64> = (1..n)
        .map(|i| 0.5 / (1.0 - (2.0 * i as f64).powi(-2)).sqrt())
        .collect();

    let polymat: DMatrix<f64> = DMatrix::from_fn(n, n, |r, c| {
        if r == c + 1 {
            betas[r - 1]
        } else if c == r + 1 {
            betas[c - 1]
        } else {
            0.0
        }
    });

    let eigen_decomp = SymmetricEigen::new(polymat);

    let mut xw: Vec<(f64, f64)> = eigen_decomp
        .eigenvalues
        .iter()
        .cloned()
        .zip(
            eigen_decomp
                .eigenvectors
                .row(0)
                .iter()
                .map(|weight| (*weight).powi(2) * 2.0),
        )
        .collect();

    xw.sort_by(|a, b| a.0.total_cmp(&b.0));

    xw.into_iter().unzip()
}
