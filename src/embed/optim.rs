//! Optimizers and parameter blocks shared by the embedders.
//!
//! - [Adam] runs on a list of dense parameter blocks with L2 weight decay (as in torch.optim.Adam).
//! - [SparseAdam] updates only rows of an embedding table that received a gradient (lazy Adam).

use ahash::AHashMap;
use ndarray::{Array1, Array2, Axis};

use rand::RngCore;
use rand_distr::{Distribution, Uniform};

use serde::{Deserialize, Serialize};

/// Adam hyper parameters
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct AdamParams {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl AdamParams {
    pub fn new(lr: f64, weight_decay: f64) -> Self {
        AdamParams {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1.0e-8,
            weight_decay,
        }
    }
}

impl Default for AdamParams {
    fn default() -> Self {
        AdamParams::new(1.0e-3, 0.)
    }
}

/// Adam on a fixed list of parameter blocks. Blocks must always be given in the same order.
pub struct Adam {
    params: AdamParams,
    m: Vec<Array2<f64>>,
    v: Vec<Array2<f64>>,
    t: i32,
}

impl Adam {
    /// allocate moments for blocks of given shapes
    pub fn new(params: AdamParams, shapes: &[(usize, usize)]) -> Self {
        let m = shapes.iter().map(|s| Array2::<f64>::zeros(*s)).collect::<Vec<Array2<f64>>>();
        let v = m.clone();
        Adam { params, m, v, t: 0 }
    }

    pub fn get_params(&self) -> &AdamParams {
        &self.params
    }

    /// one step, weights and grads must be in the order given at allocation
    pub fn step(&mut self, weights: Vec<&mut Array2<f64>>, grads: &[Array2<f64>]) {
        assert_eq!(weights.len(), self.m.len());
        assert_eq!(grads.len(), self.m.len());
        self.t += 1;
        let p = self.params;
        let bias1 = 1. - p.beta1.powi(self.t);
        let bias2 = 1. - p.beta2.powi(self.t);
        for (k, w) in weights.into_iter().enumerate() {
            let m = &mut self.m[k];
            let v = &mut self.v[k];
            ndarray::Zip::from(w)
                .and(&grads[k])
                .and(m)
                .and(v)
                .for_each(|w, g, m, v| {
                    let g = *g + p.weight_decay * *w;
                    *m = p.beta1 * *m + (1. - p.beta1) * g;
                    *v = p.beta2 * *v + (1. - p.beta2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *w -= p.lr * m_hat / (v_hat.sqrt() + p.eps);
                });
        }
    } // end of step
} // end of impl Adam

/// Lazy Adam for embedding tables : moments of a row are updated only when the row has a gradient.
pub struct SparseAdam {
    params: AdamParams,
    m: Array2<f64>,
    v: Array2<f64>,
    t: i32,
}

impl SparseAdam {
    pub fn new(lr: f64, shape: (usize, usize)) -> Self {
        SparseAdam {
            params: AdamParams::new(lr, 0.),
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
            t: 0,
        }
    }

    /// update rows of table that appear in grads
    pub fn step(&mut self, table: &mut Array2<f64>, grads: &AHashMap<usize, Array1<f64>>) {
        self.t += 1;
        let p = self.params;
        let bias1 = 1. - p.beta1.powi(self.t);
        let bias2 = 1. - p.beta2.powi(self.t);
        for (row, g) in grads {
            let mut w = table.row_mut(*row);
            let mut m = self.m.row_mut(*row);
            let mut v = self.v.row_mut(*row);
            for k in 0..g.len() {
                m[k] = p.beta1 * m[k] + (1. - p.beta1) * g[k];
                v[k] = p.beta2 * v[k] + (1. - p.beta2) * g[k] * g[k];
                w[k] -= p.lr * (m[k] / bias1) / ((v[k] / bias2).sqrt() + p.eps);
            }
        }
    } // end of step
} // end of impl SparseAdam

//===========================================================================

/// A dense layer y = x.w + b, w is (in, out), b is (1, out)
#[derive(Clone, Debug)]
pub struct Linear {
    pub w: Array2<f64>,
    pub b: Array2<f64>,
}

impl Linear {
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        Linear {
            w: Array2::zeros((in_dim, out_dim)),
            b: Array2::zeros((1, out_dim)),
        }
    }

    pub fn get_in_dim(&self) -> usize {
        self.w.nrows()
    }

    pub fn get_out_dim(&self) -> usize {
        self.w.ncols()
    }

    /// glorot uniform weights, zero bias
    pub fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        let (fan_in, fan_out) = self.w.dim();
        let limit = (6. / (fan_in + fan_out) as f64).sqrt();
        let uniform = Uniform::<f64>::new_inclusive(-limit, limit);
        self.w.mapv_inplace(|_| uniform.sample(rng));
        self.b.fill(0.);
    }

    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.w) + &self.b
    }

    /// given input x and gradient of output, returns (grad w, grad b, grad x)
    pub fn backward(&self, x: &Array2<f64>, grad_out: &Array2<f64>) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        let grad_w = x.t().dot(grad_out);
        let grad_b = grad_out.sum_axis(Axis(0)).insert_axis(Axis(0));
        let grad_x = grad_out.dot(&self.w.t());
        (grad_w, grad_b, grad_x)
    }

    pub fn shapes(&self) -> Vec<(usize, usize)> {
        vec![self.w.dim(), self.b.dim()]
    }
} // end of impl Linear

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // minimize (w - 3)^2 elementwise
    #[test]
    fn test_adam_quadratic() {
        log_init_test();
        let mut w = Array2::<f64>::zeros((2, 2));
        let mut adam = Adam::new(AdamParams::new(0.1, 0.), &[(2, 2)]);
        for _ in 0..500 {
            let grad = w.mapv(|x| 2. * (x - 3.));
            adam.step(vec![&mut w], &[grad]);
        }
        for x in w.iter() {
            assert!((x - 3.).abs() < 1.0e-2, "x = {}", x);
        }
    } // end of test_adam_quadratic

    #[test]
    fn test_sparse_adam_untouched_rows() {
        log_init_test();
        let mut table = Array2::<f64>::ones((3, 2));
        let mut adam = SparseAdam::new(0.1, (3, 2));
        let mut grads = AHashMap::new();
        grads.insert(1usize, Array1::from(vec![1., -1.]));
        adam.step(&mut table, &grads);
        assert_eq!(table.row(0).to_vec(), vec![1., 1.]);
        assert_eq!(table.row(2).to_vec(), vec![1., 1.]);
        assert!(table[[1, 0]] < 1. && table[[1, 1]] > 1.);
    }

    #[test]
    fn test_linear_backward() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let mut lin = Linear::new(3, 2);
        lin.reset_parameters(&mut rng);
        let limit = (6. / 5f64).sqrt();
        assert!(lin.w.iter().all(|x| x.abs() <= limit));
        let x = Array2::from_shape_vec((2, 3), vec![1., 2., 3., -1., 0., 1.]).unwrap();
        let y = lin.forward(&x);
        assert_eq!(y.dim(), (2, 2));
        // loss = sum(y) so grad_out is ones
        let (gw, gb, gx) = lin.backward(&x, &Array2::ones((2, 2)));
        assert_eq!(gb, Array2::from_elem((1, 2), 2.));
        assert_eq!(gw[[0, 0]], 0.);
        assert_eq!(gw[[2, 1]], 4.);
        assert!((gx[[0, 0]] - lin.w.row(0).sum()).abs() < 1.0e-12);
    }
} // end of mod tests
