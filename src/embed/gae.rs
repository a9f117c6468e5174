//! Graph autoencoder with a two layer GCN encoder and an inner product decoder.
//!
//! Encoder : H = relu(Â X W1 + b1),  Z = Â H W2 + b2  with Â = D^-1/2 (A + I) D^-1/2 .
//! Decoder : probability of edge (u,v) is sigmoid(z_u . z_v).
//!
//! Optional auxiliary heads can be attached to the latent space :
//! - a [FeatureDecoder] reconstructing node features (mean squared error)
//! - a [LatentClassifier] predicting node classes (softmax cross entropy)
//!
//! Gradients are computed by hand, the model is trained full batch with [Adam](super::optim::Adam).
//! See Kipf, Welling. Variational Graph Auto-Encoders. 2016

use anyhow::anyhow;

use ndarray::{Array2, Axis, Zip};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use rand::RngCore;

use super::optim::Linear;
use crate::graph::{EdgePair, GraphSample};

// guard for log
const EPS: f64 = 1.0e-15;

/// Something with trainable parameters that can be reinitialized
pub trait TrainableT {
    /// reinitialize all parameters from rng
    fn reset_parameters(&mut self, rng: &mut dyn RngCore);
    /// shapes of parameter blocks
    fn shapes(&self) -> Vec<(usize, usize)>;
    /// parameter blocks, in the same order as shapes
    fn parameters(&self) -> Vec<&Array2<f64>>;
    ///
    fn parameters_mut(&mut self) -> Vec<&mut Array2<f64>>;
}

/// A graph sample prepared for the GCN encoder. Propagation matrices and Â.X are computed once.
pub struct PreparedSample {
    /// normalized adjacency, row i aggregates messages sent to i
    a_hat: CsMat<f64>,
    /// transpose of a_hat
    a_hat_t: CsMat<f64>,
    /// Â.X
    ax: Array2<f64>,
    /// node features
    x: Array2<f64>,
    pos_edges: Vec<EdgePair>,
    neg_edges: Vec<EdgePair>,
    node_label: Option<Vec<usize>>,
} // end of PreparedSample

impl PreparedSample {
    /// prepare sample, edge weights are used if use_edge_weight is true and sample has weights
    pub fn new(sample: &GraphSample, use_edge_weight: bool) -> Self {
        let a_hat = gcn_norm(sample, use_edge_weight);
        let a_hat_t: CsMat<f64> = a_hat.transpose_view().to_other_storage();
        let ax = csr_dense_prod(&a_hat, &sample.x);
        PreparedSample {
            a_hat,
            a_hat_t,
            ax,
            x: sample.x.clone(),
            pos_edges: sample.get_pos_supervision(),
            neg_edges: sample.get_neg_supervision(),
            node_label: sample.node_label.clone(),
        }
    }

    pub fn get_nb_nodes(&self) -> usize {
        self.x.nrows()
    }
} // end of impl PreparedSample

/// D^-1/2 (A + I) D^-1/2 as a csr matrix. Degrees are computed on targets.
pub fn gcn_norm(sample: &GraphSample, use_edge_weight: bool) -> CsMat<f64> {
    let n = sample.get_nb_nodes();
    let weights: Vec<f64> = match (&sample.edge_weight, use_edge_weight) {
        (Some(w), true) => w.clone(),
        _ => vec![1.; sample.get_nb_edges()],
    };
    let mut degrees = vec![1f64; n];
    for ((_, j), w) in sample.edge_index.iter().zip(weights.iter()) {
        degrees[*j] += *w;
    }
    let inv_sqrt: Vec<f64> = degrees
        .iter()
        .map(|d| if *d > 0. { 1. / d.sqrt() } else { 0. })
        .collect();
    let mut trimat = TriMat::<f64>::new((n, n));
    for ((i, j), w) in sample.edge_index.iter().zip(weights.iter()) {
        trimat.add_triplet(*j, *i, inv_sqrt[*i] * *w * inv_sqrt[*j]);
    }
    for i in 0..n {
        trimat.add_triplet(i, i, inv_sqrt[i] * inv_sqrt[i]);
    }
    trimat.to_csr()
} // end of gcn_norm

/// product of a csr matrix by a dense matrix, rows computed in parallel
pub(crate) fn csr_dense_prod(csr: &CsMat<f64>, dense: &Array2<f64>) -> Array2<f64> {
    debug_assert!(csr.is_csr());
    debug_assert_eq!(csr.cols(), dense.nrows());
    let mut res = Array2::<f64>::zeros((csr.rows(), dense.ncols()));
    res.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            if let Some(sparse_row) = csr.outer_view(i) {
                for (j, a) in sparse_row.iter() {
                    row.scaled_add(*a, &dense.row(j));
                }
            }
        });
    res
}

/// values of a forward pass needed by the backward pass
struct Forward {
    pre1: Array2<f64>,
    ah: Array2<f64>,
    z: Array2<f64>,
}

/// The GCN encoder of the autoencoder
#[derive(Clone, Debug)]
pub struct GraphAutoEncoder {
    layer1: Linear,
    layer2: Linear,
}

impl GraphAutoEncoder {
    /// parameters are zero until reset_parameters is called
    pub fn new(in_dim: usize, hidden_dim: usize, latent_dim: usize) -> Self {
        GraphAutoEncoder {
            layer1: Linear::new(in_dim, hidden_dim),
            layer2: Linear::new(hidden_dim, latent_dim),
        }
    }

    pub fn get_in_dim(&self) -> usize {
        self.layer1.get_in_dim()
    }

    pub fn get_latent_dim(&self) -> usize {
        self.layer2.get_out_dim()
    }

    fn forward(&self, data: &PreparedSample) -> Forward {
        let pre1 = data.ax.dot(&self.layer1.w) + &self.layer1.b;
        let h = pre1.mapv(|v| v.max(0.));
        let ah = csr_dense_prod(&data.a_hat, &h);
        let z = self.layer2.forward(&ah);
        Forward { pre1, ah, z }
    }

    /// latent vectors of nodes of data
    pub fn encode(&self, data: &PreparedSample) -> Array2<f64> {
        self.forward(data).z
    }

    /// encode a raw graph sample
    pub fn encode_sample(&self, sample: &GraphSample, use_edge_weight: bool) -> anyhow::Result<Array2<f64>> {
        if sample.get_nb_features() != self.get_in_dim() {
            return Err(anyhow!(
                "encoder expects {} features, sample has {}",
                self.get_in_dim(),
                sample.get_nb_features()
            ));
        }
        Ok(self.encode(&PreparedSample::new(sample, use_edge_weight)))
    }

    // gradient of layer parameters given gradient of z
    fn backward(&self, data: &PreparedSample, fwd: &Forward, grad_z: &Array2<f64>) -> Vec<Array2<f64>> {
        let (grad_w2, grad_b2, grad_ah) = self.layer2.backward(&fwd.ah, grad_z);
        let mut grad_pre1 = csr_dense_prod(&data.a_hat_t, &grad_ah);
        Zip::from(&mut grad_pre1).and(&fwd.pre1).for_each(|g, p| {
            if *p <= 0. {
                *g = 0.;
            }
        });
        let grad_w1 = data.ax.t().dot(&grad_pre1);
        let grad_b1 = grad_pre1.sum_axis(Axis(0)).insert_axis(Axis(0));
        vec![grad_w1, grad_b1, grad_w2, grad_b2]
    }
} // end of impl GraphAutoEncoder

impl TrainableT for GraphAutoEncoder {
    fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        self.layer1.reset_parameters(rng);
        self.layer2.reset_parameters(rng);
    }

    fn shapes(&self) -> Vec<(usize, usize)> {
        let mut shapes = self.layer1.shapes();
        shapes.append(&mut self.layer2.shapes());
        shapes
    }

    fn parameters(&self) -> Vec<&Array2<f64>> {
        vec![&self.layer1.w, &self.layer1.b, &self.layer2.w, &self.layer2.b]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![&mut self.layer1.w, &mut self.layer1.b, &mut self.layer2.w, &mut self.layer2.b]
    }
} // end of impl TrainableT for GraphAutoEncoder

/// linear reconstruction of node features from latents
#[derive(Clone, Debug)]
pub struct FeatureDecoder {
    layer: Linear,
}

impl FeatureDecoder {
    pub fn new(latent_dim: usize, nb_features: usize) -> Self {
        FeatureDecoder {
            layer: Linear::new(latent_dim, nb_features),
        }
    }
}

impl TrainableT for FeatureDecoder {
    fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        self.layer.reset_parameters(rng);
    }
    fn shapes(&self) -> Vec<(usize, usize)> {
        self.layer.shapes()
    }
    fn parameters(&self) -> Vec<&Array2<f64>> {
        vec![&self.layer.w, &self.layer.b]
    }
    fn parameters_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![&mut self.layer.w, &mut self.layer.b]
    }
}

/// linear classifier of nodes from latents
#[derive(Clone, Debug)]
pub struct LatentClassifier {
    layer: Linear,
}

impl LatentClassifier {
    pub fn new(latent_dim: usize, nb_classes: usize) -> Self {
        LatentClassifier {
            layer: Linear::new(latent_dim, nb_classes),
        }
    }

    pub fn get_nb_classes(&self) -> usize {
        self.layer.get_out_dim()
    }
}

impl TrainableT for LatentClassifier {
    fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        self.layer.reset_parameters(rng);
    }
    fn shapes(&self) -> Vec<(usize, usize)> {
        self.layer.shapes()
    }
    fn parameters(&self) -> Vec<&Array2<f64>> {
        vec![&self.layer.w, &self.layer.b]
    }
    fn parameters_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![&mut self.layer.w, &mut self.layer.b]
    }
}

/// weights of loss components
#[derive(Copy, Clone, Debug)]
pub struct LossWeights {
    /// graph reconstruction
    pub alpha: f64,
    /// feature reconstruction
    pub beta: f64,
    /// node classification
    pub gamma: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        LossWeights {
            alpha: 1.,
            beta: 1.,
            gamma: 1.,
        }
    }
}

/// the loss components of one evaluation
#[derive(Copy, Clone, Debug, Default)]
pub struct GaeLoss {
    pub total: f64,
    pub gae_recon: f64,
    pub feat_recon: f64,
    pub class: f64,
}

/// The autoencoder with its optional heads, trained together.
#[derive(Clone, Debug)]
pub struct GaeModel {
    pub gae: GraphAutoEncoder,
    pub feature_decoder: Option<FeatureDecoder>,
    pub latent_classifier: Option<LatentClassifier>,
}

impl GaeModel {
    pub fn new(gae: GraphAutoEncoder) -> Self {
        GaeModel {
            gae,
            feature_decoder: None,
            latent_classifier: None,
        }
    }

    pub fn with_feature_decoder(mut self, decoder: FeatureDecoder) -> Self {
        self.feature_decoder = Some(decoder);
        self
    }

    pub fn with_latent_classifier(mut self, classifier: LatentClassifier) -> Self {
        self.latent_classifier = Some(classifier);
        self
    }

    /// check sample is compatible with model
    pub fn check(&self, data: &PreparedSample) -> anyhow::Result<()> {
        if data.x.ncols() != self.gae.get_in_dim() {
            return Err(anyhow!(
                "encoder expects {} features, got {}",
                self.gae.get_in_dim(),
                data.x.ncols()
            ));
        }
        if let Some(classifier) = &self.latent_classifier {
            match &data.node_label {
                None => {
                    return Err(anyhow!("latent classifier requires node labels"));
                }
                Some(labels) => {
                    if let Some(bad) = labels.iter().find(|l| **l >= classifier.get_nb_classes()) {
                        return Err(anyhow!("node label {} out of range", bad));
                    }
                }
            }
        }
        Ok(())
    } // end of check

    /// losses and, if asked, gradients of all parameter blocks (in parameters() order)
    pub fn loss_and_grad(&self, data: &PreparedSample, weights: &LossWeights, with_grad: bool) -> (GaeLoss, Option<Vec<Array2<f64>>>) {
        let fwd = self.gae.forward(data);
        let z = &fwd.z;
        let mut grad_z = Array2::<f64>::zeros(z.dim());
        let mut loss = GaeLoss::default();
        // graph reconstruction, -log(sigmoid(s)) for positives, -log(1 - sigmoid(s)) for negatives
        for (edges, positive) in [(&data.pos_edges, true), (&data.neg_edges, false)] {
            if edges.is_empty() {
                continue;
            }
            let nb = edges.len() as f64;
            let mut sum = 0.;
            for (u, v) in edges.iter() {
                let s = z.row(*u).dot(&z.row(*v));
                let p = sigmoid(s);
                let (l, g) = match positive {
                    true => (-(p + EPS).ln(), p - 1.),
                    false => (-(1. - p + EPS).ln(), p),
                };
                sum += l;
                if with_grad {
                    let g = weights.alpha * g / nb;
                    let (zu, zv) = (z.row(*u).to_owned(), z.row(*v).to_owned());
                    grad_z.row_mut(*u).scaled_add(g, &zv);
                    grad_z.row_mut(*v).scaled_add(g, &zu);
                }
            }
            loss.gae_recon += sum / nb;
        }
        let mut head_grads = Vec::<Array2<f64>>::new();
        // feature reconstruction
        if let Some(decoder) = &self.feature_decoder {
            let x_hat = decoder.layer.forward(z);
            let diff = &x_hat - &data.x;
            let nb = diff.len() as f64;
            loss.feat_recon = diff.iter().map(|d| d * d).sum::<f64>() / nb;
            if with_grad {
                let grad_out = diff.mapv(|d| weights.beta * 2. * d / nb);
                let (gw, gb, gz) = decoder.layer.backward(z, &grad_out);
                grad_z += &gz;
                head_grads.push(gw);
                head_grads.push(gb);
            }
        }
        // classification
        if let Some(classifier) = &self.latent_classifier {
            if let Some(labels) = &data.node_label {
                let logits = classifier.layer.forward(z);
                let nb = labels.len() as f64;
                let mut grad_out = Array2::<f64>::zeros(logits.dim());
                let mut sum = 0.;
                for (i, label) in labels.iter().enumerate() {
                    let row = logits.row(i);
                    let max = row.fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));
                    let exps = row.mapv(|v| (v - max).exp());
                    let norm = exps.sum();
                    sum -= (exps[*label] / norm + EPS).ln();
                    for k in 0..exps.len() {
                        let target = if k == *label { 1. } else { 0. };
                        grad_out[[i, k]] = weights.gamma * (exps[k] / norm - target) / nb;
                    }
                }
                loss.class = sum / nb;
                if with_grad {
                    let (gw, gb, gz) = classifier.layer.backward(z, &grad_out);
                    grad_z += &gz;
                    head_grads.push(gw);
                    head_grads.push(gb);
                }
            }
        }
        loss.total = weights.alpha * loss.gae_recon + weights.beta * loss.feat_recon + weights.gamma * loss.class;
        if !with_grad {
            return (loss, None);
        }
        let mut grads = self.gae.backward(data, &fwd, &grad_z);
        grads.append(&mut head_grads);
        (loss, Some(grads))
    } // end of loss_and_grad
} // end of impl GaeModel

impl TrainableT for GaeModel {
    fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        self.gae.reset_parameters(rng);
        if let Some(decoder) = self.feature_decoder.as_mut() {
            decoder.reset_parameters(rng);
        }
        if let Some(classifier) = self.latent_classifier.as_mut() {
            classifier.reset_parameters(rng);
        }
    }

    fn shapes(&self) -> Vec<(usize, usize)> {
        let mut shapes = self.gae.shapes();
        if let Some(decoder) = &self.feature_decoder {
            shapes.append(&mut decoder.shapes());
        }
        if let Some(classifier) = &self.latent_classifier {
            shapes.append(&mut classifier.shapes());
        }
        shapes
    }

    fn parameters(&self) -> Vec<&Array2<f64>> {
        let mut params = self.gae.parameters();
        if let Some(decoder) = &self.feature_decoder {
            params.append(&mut decoder.parameters());
        }
        if let Some(classifier) = &self.latent_classifier {
            params.append(&mut classifier.parameters());
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Array2<f64>> {
        let mut params = self.gae.parameters_mut();
        if let Some(decoder) = self.feature_decoder.as_mut() {
            params.append(&mut decoder.parameters_mut());
        }
        if let Some(classifier) = self.latent_classifier.as_mut() {
            params.append(&mut classifier.parameters_mut());
        }
        params
    }
} // end of impl TrainableT for GaeModel

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        let e = x.exp();
        e / (1. + e)
    }
}

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn small_sample() -> GraphSample {
        let edges = vec![(0, 1), (1, 0), (1, 2), (2, 1), (2, 3), (3, 2)];
        let x = Array2::from_shape_fn((4, 3), |(i, j)| ((i + 2 * j) % 3) as f64);
        let mut sample = GraphSample::new(x, edges).unwrap();
        sample = sample.with_node_label(vec![0, 1, 0, 1]).unwrap();
        sample.supervision = Some(crate::graph::EdgeSupervision::Split {
            key: String::from("edge_label"),
            pos_label: vec![1., 1.],
            pos_index: vec![(0, 1), (2, 3)],
            neg_label: Some(vec![0., 0.]),
            neg_index: Some(vec![(0, 3), (1, 3)]),
        });
        sample
    }

    #[test]
    fn test_gcn_norm_symetric() {
        log_init_test();
        let sample = small_sample();
        let a_hat = gcn_norm(&sample, false);
        // node 0 has degree 1 + self loop
        assert!((a_hat.get(0, 0).unwrap() - 0.5).abs() < 1.0e-12);
        let a01 = *a_hat.get(0, 1).unwrap();
        let a10 = *a_hat.get(1, 0).unwrap();
        assert!((a01 - a10).abs() < 1.0e-12);
        assert!((a01 - 1. / (2f64 * 3.).sqrt()).abs() < 1.0e-12);
        assert!(a_hat.get(0, 3).is_none());
    } // end of test_gcn_norm_symetric

    #[test]
    fn test_csr_dense_prod() {
        log_init_test();
        let sample = small_sample();
        let a_hat = gcn_norm(&sample, false);
        let prod = csr_dense_prod(&a_hat, &sample.x);
        for i in 0..4 {
            for k in 0..3 {
                let expected: f64 = (0..4)
                    .map(|j| a_hat.get(i, j).copied().unwrap_or(0.) * sample.x[[j, k]])
                    .sum();
                assert!((prod[[i, k]] - expected).abs() < 1.0e-12);
            }
        }
        let a_hat_t: CsMat<f64> = a_hat.transpose_view().to_other_storage();
        let prod_t = csr_dense_prod(&a_hat_t, &sample.x);
        assert_eq!(prod_t.dim(), (4, 3));
    }

    // compare analytic gradient with finite differences
    #[test]
    fn test_gae_gradient() {
        log_init_test();
        let sample = small_sample();
        let data = PreparedSample::new(&sample, false);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(45);
        let mut model = GaeModel::new(GraphAutoEncoder::new(3, 5, 2))
            .with_feature_decoder(FeatureDecoder::new(2, 3))
            .with_latent_classifier(LatentClassifier::new(2, 2));
        model.reset_parameters(&mut rng);
        model.check(&data).unwrap();
        let weights = LossWeights { alpha: 1., beta: 0.5, gamma: 2. };
        let (_, grads) = model.loss_and_grad(&data, &weights, true);
        let grads = grads.unwrap();
        assert_eq!(grads.len(), model.shapes().len());
        let h = 1.0e-6;
        for block in 0..grads.len() {
            let shape = grads[block].dim();
            for i in 0..shape.0 {
                for j in 0..shape.1 {
                    let mut plus = model.clone();
                    plus.parameters_mut()[block][[i, j]] += h;
                    let mut minus = model.clone();
                    minus.parameters_mut()[block][[i, j]] -= h;
                    let lp = plus.loss_and_grad(&data, &weights, false).0.total;
                    let lm = minus.loss_and_grad(&data, &weights, false).0.total;
                    let numeric = (lp - lm) / (2. * h);
                    assert!(
                        (numeric - grads[block][[i, j]]).abs() < 1.0e-5,
                        "block {} ({},{}) numeric {} analytic {}",
                        block,
                        i,
                        j,
                        numeric,
                        grads[block][[i, j]]
                    );
                }
            }
        }
    } // end of test_gae_gradient

    #[test]
    fn test_classifier_requires_labels() {
        log_init_test();
        let mut sample = small_sample();
        sample.node_label = None;
        let data = PreparedSample::new(&sample, false);
        let model = GaeModel::new(GraphAutoEncoder::new(3, 4, 2)).with_latent_classifier(LatentClassifier::new(2, 2));
        assert!(model.check(&data).is_err());
        let model = GaeModel::new(GraphAutoEncoder::new(2, 4, 2));
        assert!(model.check(&data).is_err());
    }
} // end of mod tests
