//! Metric multidimensional scaling by SMACOF (majorization of the stress).

use anyhow::anyhow;
use ndarray::{Array2, ArrayView2};

use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use serde::{Deserialize, Serialize};

use crate::tools::linalg::pairwise_l2;

/// what the input matrix of [Mds::fit] is
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dissimilarity {
    /// input holds points, dissimilarity is their euclidean distance
    Euclidean,
    /// input is a square dissimilarity matrix
    Precomputed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MdsParams {
    pub nb_components: usize,
    /// number of random initializations, lowest stress wins
    pub n_init: usize,
    pub max_iter: usize,
    /// relative stress improvement below which iterations stop
    pub eps: f64,
    pub dissimilarity: Dissimilarity,
    pub seed: u64,
}

impl Default for MdsParams {
    fn default() -> Self {
        MdsParams {
            nb_components: 2,
            n_init: 4,
            max_iter: 300,
            eps: 1.0e-3,
            dissimilarity: Dissimilarity::Euclidean,
            seed: 0,
        }
    }
}

pub struct Mds {
    params: MdsParams,
}

impl Mds {
    pub fn new(params: MdsParams) -> Self {
        Mds { params }
    }

    /// returns the embedding with lowest stress and its stress
    pub fn fit(&self, data: &ArrayView2<f64>) -> anyhow::Result<(Array2<f64>, f64)> {
        let dissim = match self.params.dissimilarity {
            Dissimilarity::Euclidean => pairwise_l2(data),
            Dissimilarity::Precomputed => {
                if data.nrows() != data.ncols() {
                    return Err(anyhow!("precomputed dissimilarity must be square, got {:?}", data.dim()));
                }
                data.to_owned()
            }
        };
        if dissim.nrows() == 0 {
            return Err(anyhow!("mds on empty data"));
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.params.seed);
        let mut best: Option<(Array2<f64>, f64)> = None;
        for init in 0..self.params.n_init.max(1) {
            let (pos, stress, nb_iter) = self.smacof_single(&dissim, &mut rng);
            log::debug!("mds init {} stress {:.4e} after {} iterations", init, stress, nb_iter);
            if best.as_ref().map(|b| stress < b.1).unwrap_or(true) {
                best = Some((pos, stress));
            }
        }
        best.ok_or_else(|| anyhow!("mds : no initialization run"))
    } // end of fit

    fn smacof_single(&self, dissim: &Array2<f64>, rng: &mut Xoshiro256PlusPlus) -> (Array2<f64>, f64, usize) {
        let n = dissim.nrows();
        let mut pos = Array2::from_shape_fn((n, self.params.nb_components), |_| rng.gen::<f64>());
        let mut old_stress: Option<f64> = None;
        let mut stress = f64::INFINITY;
        let mut nb_iter = 0;
        for it in 0..self.params.max_iter {
            nb_iter = it + 1;
            let dis = pairwise_l2(&pos.view());
            stress = 0.5 * (&dis - dissim).mapv(|x| x * x).sum();
            // Guttman transform
            let mut b = Array2::<f64>::zeros((n, n));
            for i in 0..n {
                let mut row_sum = 0.;
                for j in 0..n {
                    let d = if dis[[i, j]] == 0. { 1.0e-5 } else { dis[[i, j]] };
                    let ratio = dissim[[i, j]] / d;
                    b[[i, j]] = -ratio;
                    row_sum += ratio;
                }
                b[[i, i]] += row_sum;
            }
            pos = b.dot(&pos) / n as f64;
            let norm: f64 = pos.rows().into_iter().map(|r| r.dot(&r).sqrt()).sum();
            let normalized = if norm > 0. { stress / norm } else { stress };
            if let Some(old) = old_stress {
                if old - normalized < self.params.eps {
                    break;
                }
            }
            old_stress = Some(normalized);
        }
        (pos, stress, nb_iter)
    } // end of smacof_single
} // end of impl Mds
