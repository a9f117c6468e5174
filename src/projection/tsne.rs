//! Exact t-SNE.
//!
//! Input similarities are gaussian with a bandwidth calibrated on each point by bisection to match
//! the perplexity, output similarities follow a Student distribution with one degree of freedom.
//! Gradient descent uses momentum, per coordinate gains and early exaggeration.
//! Cost is quadratic in the number of points.

use anyhow::anyhow;
use ndarray::{Array2, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::pca::pca_2d;

const MACHINE_EPSIL: f64 = 1.0e-12;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TsneParams {
    pub perplexity: f64,
    pub early_exaggeration: f64,
    /// None for automatic : max(n / early_exaggeration / 4, 50)
    pub learning_rate: Option<f64>,
    pub n_iter: usize,
    /// number of iterations with exaggeration and low momentum
    pub n_iter_exploration: usize,
    pub min_gain: f64,
}

impl Default for TsneParams {
    fn default() -> Self {
        TsneParams {
            perplexity: 30.,
            early_exaggeration: 12.,
            learning_rate: None,
            n_iter: 1000,
            n_iter_exploration: 250,
            min_gain: 0.01,
        }
    }
}

pub struct Tsne {
    params: TsneParams,
}

/// squared euclidean distances between rows
fn squared_distances(data: &ArrayView2<f64>) -> Array2<f64> {
    let n = data.nrows();
    let mut dist2 = Array2::<f64>::zeros((n, n));
    Zip::indexed(&mut dist2).par_for_each(|(i, j), d| {
        let diff = &data.row(i) - &data.row(j);
        *d = diff.dot(&diff);
    });
    dist2
}

/// conditional probabilities p(j|i) with entropy matching log(perplexity), row by row
fn binary_search_perplexity(dist2: &Array2<f64>, perplexity: f64) -> Array2<f64> {
    let n = dist2.nrows();
    let target = perplexity.ln();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut beta = 1.;
            let (mut beta_min, mut beta_max) = (f64::NEG_INFINITY, f64::INFINITY);
            let mut p = vec![0.; n];
            for _ in 0..100 {
                let mut sum_p = 0.;
                for j in 0..n {
                    p[j] = if j == i { 0. } else { (-dist2[[i, j]] * beta).exp() };
                    sum_p += p[j];
                }
                if sum_p == 0. {
                    sum_p = MACHINE_EPSIL;
                }
                let mut sum_dp = 0.;
                for j in 0..n {
                    p[j] /= sum_p;
                    sum_dp += dist2[[i, j]] * p[j];
                }
                let entropy = sum_p.ln() + beta * sum_dp;
                let diff = entropy - target;
                if diff.abs() <= 1.0e-5 {
                    break;
                }
                if diff > 0. {
                    beta_min = beta;
                    beta = if beta_max == f64::INFINITY { beta * 2. } else { (beta + beta_max) / 2. };
                } else {
                    beta_max = beta;
                    beta = if beta_min == f64::NEG_INFINITY { beta / 2. } else { (beta + beta_min) / 2. };
                }
            }
            p
        })
        .collect();
    let mut cond = Array2::<f64>::zeros((n, n));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, v) in row.into_iter().enumerate() {
            cond[[i, j]] = v;
        }
    }
    cond
} // end of binary_search_perplexity

impl Tsne {
    pub fn new(params: TsneParams) -> Self {
        Tsne { params }
    }

    /// kullback-leibler divergence and its gradient at y
    fn kl_gradient(p: &Array2<f64>, y: &Array2<f64>) -> (f64, Array2<f64>) {
        let n = y.nrows();
        let mut num = squared_distances(&y.view()).mapv(|d| 1. / (1. + d));
        num.diag_mut().fill(0.);
        let sum_num = num.sum().max(MACHINE_EPSIL);
        let mut kl = 0.;
        let mut grad = Array2::<f64>::zeros(y.dim());
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = (num[[i, j]] / sum_num).max(MACHINE_EPSIL);
                let pij = p[[i, j]];
                if pij > 0. {
                    kl += pij * (pij.max(MACHINE_EPSIL) / q).ln();
                }
                let coeff = 4. * (pij - q) * num[[i, j]];
                for k in 0..y.ncols() {
                    grad[[i, k]] += coeff * (y[[i, k]] - y[[j, k]]);
                }
            }
        }
        (kl, grad)
    }

    /// 2 dimensional embedding of rows of data
    pub fn fit(&self, data: &ArrayView2<f64>) -> anyhow::Result<Array2<f64>> {
        let n = data.nrows();
        if self.params.perplexity >= n as f64 {
            return Err(anyhow!(
                "perplexity {} must be less than the number of points {}",
                self.params.perplexity,
                n
            ));
        }
        let cpu_start = cpu_time::ProcessTime::now();
        let cond = binary_search_perplexity(&squared_distances(data), self.params.perplexity);
        let mut p = (&cond + &cond.t()) / (2. * n as f64);
        p.mapv_inplace(|x| x.max(MACHINE_EPSIL));
        p.diag_mut().fill(0.);
        // pca init scaled to small standard deviation
        let mut y = pca_2d(data)?;
        let first = y.column(0);
        let std = first.std(0.);
        if std > 0. {
            y.mapv_inplace(|x| x / std * 1.0e-4);
        }
        let lr = self
            .params
            .learning_rate
            .unwrap_or_else(|| (n as f64 / self.params.early_exaggeration / 4.).max(50.));
        let mut update = Array2::<f64>::zeros(y.dim());
        let mut gains = Array2::<f64>::ones(y.dim());
        let mut kl = f64::INFINITY;
        for it in 0..self.params.n_iter {
            let exploring = it < self.params.n_iter_exploration;
            let momentum = if exploring { 0.5 } else { 0.8 };
            let (cost, grad) = if exploring {
                Self::kl_gradient(&(&p * self.params.early_exaggeration), &y)
            } else {
                Self::kl_gradient(&p, &y)
            };
            kl = cost;
            ndarray::Zip::from(&mut gains)
                .and(&mut update)
                .and(&grad)
                .for_each(|g, u, gr| {
                    if (*u * *gr) < 0. {
                        *g += 0.2;
                    } else {
                        *g *= 0.8;
                    }
                    *g = g.max(self.params.min_gain);
                    *u = momentum * *u - lr * *g * *gr;
                });
            y += &update;
            if it % 100 == 0 {
                log::debug!("tsne iteration {} kl divergence {:.4e}", it, cost);
            }
        }
        // center result
        let mean = y.mean_axis(Axis(0)).ok_or_else(|| anyhow!("tsne : empty embedding"))?;
        y -= &mean.insert_axis(Axis(0));
        log::info!(
            "tsne : {} points, final kl divergence {:.4e}, cpu time(ms) {:?}",
            n,
            kl,
            cpu_start.elapsed().as_millis()
        );
        Ok(y)
    } // end of fit
} // end of impl Tsne

#[cfg(test)]
mod tests {

    use super::*;
    use rand_distr::{Distribution, Normal};
    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_squared_distances() {
        let data = ndarray::arr2(&[[0., 0.], [3., 4.], [1., 0.]]);
        let dist2 = squared_distances(&data.view());
        assert_eq!(dist2.dim(), (3, 3));
        assert_eq!(dist2[[0, 1]], 25.);
        assert_eq!(dist2[[1, 2]], 20.);
        assert_eq!(dist2[[2, 0]], 1.);
        assert_eq!(dist2.diag().sum(), 0.);
    }

    #[test]
    fn test_perplexity_calibration() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let normal = Normal::new(0., 1.).unwrap();
        let data = Array2::from_shape_fn((30, 3), |_| normal.sample(&mut rng));
        let cond = binary_search_perplexity(&squared_distances(&data.view()), 5.);
        for i in 0..30 {
            let row = cond.row(i);
            assert!((row.sum() - 1.).abs() < 1.0e-8);
            let entropy: f64 = -row.iter().filter(|x| **x > 0.).map(|x| x * x.ln()).sum::<f64>();
            assert!((entropy - 5f64.ln()).abs() < 1.0e-3);
        }
    }

    #[test]
    fn test_tsne_separates_blobs() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let normal = Normal::new(0., 0.1).unwrap();
        let data = Array2::from_shape_fn((40, 4), |(i, j)| {
            let center = if i < 20 { 0. } else { 5. };
            if j == 0 { center + normal.sample(&mut rng) } else { normal.sample(&mut rng) }
        });
        let params = TsneParams {
            perplexity: 8.,
            n_iter: 400,
            ..Default::default()
        };
        let y = Tsne::new(params).fit(&data.view()).unwrap();
        assert_eq!(y.dim(), (40, 2));
        let c0 = y.slice(ndarray::s![0..20, ..]).mean_axis(Axis(0)).unwrap();
        let c1 = y.slice(ndarray::s![20..40, ..]).mean_axis(Axis(0)).unwrap();
        let between = (&c0 - &c1).mapv(|x| x * x).sum().sqrt();
        let within = (0..20).map(|i| (&y.row(i) - &c0).mapv(|x| x * x).sum().sqrt()).sum::<f64>() / 20.;
        assert!(between > 2. * within, "between {} within {}", between, within);
        // default perplexity is too large for 20 points
        let small = data.slice(ndarray::s![0..20, ..]);
        assert!(Tsne::new(TsneParams::default()).fit(&small).is_err());
    }
}
