use super::ShapeFn;

/// Normalized Lobatto Shape Functions
///
/// * `l_0 = (1 - x) / 2` and `l_1 = (1 + x) / 2` are the nodal (vertex) functions
/// * `l_k = (P_k - P_{k-2}) / sqrt(2 (2k - 1))` for `k >= 2` vanish at both endpoints
///
/// where `P_k` is the Legendre polynomial of order `k`. The derivatives of the higher order functions are
/// orthonormal over `[-1, 1]`: `l_k' = sqrt((2k - 1) / 2) P_{k-1}`.
#[derive(Clone, Debug)]
pub struct LobattoShapeFn {
    values: Vec<Vec<f64>>,
    d1: Vec<Vec<f64>>,
    d2: Vec<Vec<f64>>,
}

impl ShapeFn for LobattoShapeFn {
    fn with(max_order: usize, points: &[f64]) -> Self {
        let max_order = max_order.max(1);
        let legendre = LegendrePoly::with(max_order, points);
        let num_points = points.len();

        let mut values = Vec::with_capacity(max_order + 1);
        let mut d1 = Vec::with_capacity(max_order + 1);
        let mut d2 = Vec::with_capacity(max_order + 1);

        values.push(points.iter().map(|x| (1.0 - x) / 2.0).collect());
        d1.push(vec![-0.5; num_points]);
        d2.push(vec![0.0; num_points]);

        values.push(points.iter().map(|x| (1.0 + x) / 2.0).collect());
        d1.push(vec![0.5; num_points]);
        d2.push(vec![0.0; num_points]);

        for k in 2..=max_order {
            let k_f = k as f64;
            let value_norm = (2.0 * (2.0 * k_f - 1.0)).sqrt();
            let deriv_norm = ((2.0 * k_f - 1.0) / 2.0).sqrt();

            values.push(
                legendre.l[k]
                    .iter()
                    .zip(legendre.l[k - 2].iter())
                    .map(|(p_k, p_km2)| (p_k - p_km2) / value_norm)
                    .collect(),
            );
            d1.push(
                legendre.l[k - 1]
                    .iter()
                    .map(|p_km1| deriv_norm * p_km1)
                    .collect(),
            );
            d2.push(
                legendre.d1[k - 1]
                    .iter()
                    .map(|dp_km1| deriv_norm * dp_km1)
                    .collect(),
            );
        }

        Self { values, d1, d2 }
    }

    fn value(&self, n: usize, p: usize) -> f64 {
        self.values[n][p]
    }

    fn d1(&self, n: usize, p: usize) -> f64 {
        self.d1[n][p]
    }

    fn d2(&self, n: usize, p: usize) -> f64 {
        self.d2[n][p]
    }

    fn max_order(&self) -> usize {
        self.values.len() - 1
    }
}

/// Legendre Polynomials and their first derivatives evaluated over a set of points
#[derive(Clone, Debug)]
pub struct LegendrePoly {
    pub l: Vec<Vec<f64>>,
    pub d1: Vec<Vec<f64>>,
}

impl LegendrePoly {
    pub fn with(max_n: usize, points: &[f64]) -> Self {
        let mut values: Vec<Vec<f64>> = Vec::with_capacity(max_n + 1);
        let mut primes: Vec<Vec<f64>> = Vec::with_capacity(max_n + 1);

        for i in 0..=max_n {
            values.push(Vec::with_capacity(points.len()));
            primes.push(Vec::with_capacity(points.len()));

            let i_f = i as f64;
            for (p, &point) in points.iter().enumerate() {
                match i {
                    0 => {
                        values[i].push(1.0);
                        primes[i].push(0.0);
                    }
                    1 => {
                        values[i].push(point);
                        primes[i].push(1.0);
                    }
                    _ => {
                        let v = ((2.0 * i_f - 1.0) * point * values[i - 1][p]
                            - (i_f - 1.0) * values[i - 2][p])
                            / i_f;
                        values[i].push(v);

                        let d = i_f * values[i - 1][p] + point * primes[i - 1][p];
                        primes[i].push(d)
                    }
                }
            }
        }

        Self {
            l: values,
            d1: primes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem_problem::integration::glq::gauss_quadrature_points;
    use approx::assert_relative_eq;

    #[test]
    fn legendre_values() {
        let lp = LegendrePoly::with(4, &[-1.0, 0.5, 1.0]);
        assert_relative_eq!(lp.l[2][1], -0.125);
        assert_relative_eq!(lp.l[3][1], -0.4375);
        assert_relative_eq!(lp.l[4][2], 1.0);
        assert_relative_eq!(lp.d1[3][0], 6.0);
    }

    #[test]
    fn lobatto_endpoints() {
        let sf = LobattoShapeFn::with(6, &[-1.0, 1.0]);
        assert_relative_eq!(sf.value(0, 0), 1.0);
        assert_relative_eq!(sf.value(0, 1), 0.0);
        assert_relative_eq!(sf.value(1, 1), 1.0);
        for k in 2..=6 {
            assert!(sf.value(k, 0).abs() < 1e-14);
            assert!(sf.value(k, 1).abs() < 1e-14);
        }
    }

    #[test]
    fn lobatto_derivatives_are_orthonormal() {
        let (points, weights) = gauss_quadrature_points(8);
        let sf = LobattoShapeFn::with(6, &points);

        for i in 2..=6 {
            for j in 2..=6 {
                let inner: f64 = (0..points.len())
                    .map(|p| weights[p] * sf.d1(i, p) * sf.d1(j, p))
                    .sum();
                assert_relative_eq!(inner, if i == j { 1.0 } else { 0.0 }, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let (x, h) = (0.3, 1e-6);
        let sf = LobattoShapeFn::with(5, &[x - h, x, x + h]);
        for k in 0..=5 {
            let fd1 = (sf.value(k, 2) - sf.value(k, 0)) / (2.0 * h);
            let fd2 = (sf.d1(k, 2) - sf.d1(k, 0)) / (2.0 * h);
            assert_relative_eq!(sf.d1(k, 1), fd1, epsilon = 1e-6);
            assert_relative_eq!(sf.d2(k, 1), fd2, epsilon = 1e-6);
        }
    }
}
