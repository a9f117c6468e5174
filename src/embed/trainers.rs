//! Per seed training of embedders.
//!
//! For each seed the random generator is reset from the seed, all trainable components are reinitialized,
//! the model is trained and the latent vectors of all nodes of the full graph are stored.
//! Seeds are run sequentially.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use indexmap::IndexMap;

use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use serde::{Deserialize, Serialize};

use super::gae::{GaeModel, LossWeights, PreparedSample, TrainableT};
use super::history::LossHistory;
use super::node2vec::{Node2Vec, Node2VecParams};
use super::optim::AdamParams;
use super::train::{train_gae, GaeFitParams};
use super::LatentsDict;

use crate::graph::negative::negative_sampling;
use crate::graph::split::{LinkSplit, LinkSplitParams, RandomLinkSplit, SplitSize};
use crate::graph::{remove_self_loops, EdgeSupervision, GraphSample};
use crate::plot;

/// how supervision edges are obtained
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitType {
    /// random link split 0.7/0.1/0.2
    Link,
    /// not supported
    Node,
}

/// parameters of gae_latents_for_seeds
#[derive(Clone, Debug)]
pub struct GaeTrainParams {
    /// None means all edges are used for supervision in train, val and test
    pub split_type: Option<SplitType>,
    pub weights: LossWeights,
    pub lr: f64,
    pub weight_decay: f64,
    pub n_epochs: usize,
    pub early_stopping: usize,
    /// in link mode, message passing uses the full graph in all splits
    pub use_full_graph: bool,
    pub neg_edge_ratio: f64,
    /// use edge weights of graph in GCN normalization
    pub use_edge_weight: bool,
    /// directory where loss plots are written, one svg by seed
    pub plot_loss: Option<PathBuf>,
} // end of GaeTrainParams

impl Default for GaeTrainParams {
    fn default() -> Self {
        GaeTrainParams {
            split_type: None,
            weights: LossWeights::default(),
            lr: 1.0e-3,
            weight_decay: 0.,
            n_epochs: 100,
            early_stopping: 50,
            use_full_graph: false,
            neg_edge_ratio: 1.0,
            use_edge_weight: false,
            plot_loss: None,
        }
    }
}

/// all edges as positives and as many negatives (no self loops), same sample in the 3 splits
fn full_graph_split(graph: &GraphSample, rng: &mut Xoshiro256PlusPlus) -> LinkSplit {
    let pos_index = graph.edge_index.clone();
    let neg_index = negative_sampling(&graph.edge_index, graph.get_nb_nodes(), pos_index.len(), false, rng);
    let (neg_index, _) = remove_self_loops(&neg_index);
    let mut sample = graph.clone();
    sample.supervision = Some(EdgeSupervision::Split {
        key: String::from(crate::graph::DEFAULT_LABEL_KEY),
        pos_label: vec![1.; pos_index.len()],
        pos_index,
        neg_label: Some(vec![0.; neg_index.len()]),
        neg_index: Some(neg_index),
    });
    LinkSplit {
        train: sample.clone(),
        val: sample.clone(),
        test: sample,
    }
} // end of full_graph_split

/// builds the split asked for in params
pub fn build_split(graph: &GraphSample, params: &GaeTrainParams, rng: &mut Xoshiro256PlusPlus) -> anyhow::Result<LinkSplit> {
    match params.split_type {
        None => Ok(full_graph_split(graph, rng)),
        Some(SplitType::Link) => {
            let split_params = LinkSplitParams::new(SplitSize::Fraction(0.1), SplitSize::Fraction(0.2), true)
                .with_split_labels(true)
                .with_negative_train_samples(true)
                .with_neg_sampling_ratio(params.neg_edge_ratio);
            let mut split = RandomLinkSplit::new(split_params).split(graph, rng)?;
            if params.use_full_graph {
                for sample in [&mut split.train, &mut split.val, &mut split.test] {
                    sample.edge_index = graph.edge_index.clone();
                    sample.edge_weight = graph.edge_weight.clone();
                    sample.edge_class = graph.edge_class.clone();
                }
            }
            Ok(split)
        }
        Some(SplitType::Node) => {
            log::error!("build_split : node split is not implemented");
            Err(anyhow!("node split is not implemented"))
        }
    }
} // end of build_split

/// Trains model once for each seed and returns latents of the full graph and loss history by seed.
///
/// If data_split is None, the split is built with the first seed and reused for the next seeds.
pub fn gae_latents_for_seeds(
    graph: &GraphSample,
    model: &mut GaeModel,
    seeds: &[u64],
    params: &GaeTrainParams,
    data_split: Option<LinkSplit>,
) -> anyhow::Result<(LatentsDict, IndexMap<u64, LossHistory>)> {
    //
    let mut latents_dict = LatentsDict::with_capacity(seeds.len());
    let mut loss_hist_dict = IndexMap::<u64, LossHistory>::with_capacity(seeds.len());
    let mut data_split = data_split;
    let fit_params = GaeFitParams {
        adam: AdamParams::new(params.lr, params.weight_decay),
        n_epochs: params.n_epochs,
        early_stopping: params.early_stopping,
        weights: params.weights,
    };
    //
    for seed in seeds {
        log::info!("gae_latents_for_seeds, training with seed {}", seed);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(*seed);
        model.reset_parameters(&mut rng);
        if data_split.is_none() {
            data_split = Some(build_split(graph, params, &mut rng)?);
        }
        let split = match data_split.as_ref() {
            Some(split) => split,
            None => return Err(anyhow!("no data split available")),
        };
        let train = PreparedSample::new(&split.train, params.use_edge_weight);
        let val = PreparedSample::new(&split.val, params.use_edge_weight);
        let loss_hist = train_gae(model, &train, &val, &fit_params)?;
        //
        let latents = model.gae.encode_sample(graph, params.use_edge_weight)?;
        if let Some(dir) = &params.plot_loss {
            let path = dir.join(format!("gae_loss_seed_{}.svg", seed));
            plot::plot_loss_history(&loss_hist, &path, &format!("seed {}", seed))?;
        }
        latents_dict.insert(*seed, latents);
        loss_hist_dict.insert(*seed, loss_hist);
    }
    Ok((latents_dict, loss_hist_dict))
} // end of gae_latents_for_seeds

/// Trains a fresh Node2Vec model for each seed and returns the embedding tables.
/// If plot_loss is a directory, the loss curve of each seed is written there.
pub fn n2v_latents_for_seeds(
    graph: &GraphSample,
    seeds: &[u64],
    params: &Node2VecParams,
    plot_loss: Option<&Path>,
) -> anyhow::Result<LatentsDict> {
    let mut latents_dict = LatentsDict::with_capacity(seeds.len());
    for seed in seeds {
        log::info!("n2v_latents_for_seeds, training with seed {}", seed);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(*seed);
        let mut model = Node2Vec::new(&graph.edge_index, graph.get_nb_nodes(), params.clone(), &mut rng)?;
        let losses = model.train(&mut rng)?;
        if let Some(last) = losses.last() {
            log::info!("seed {} final loss : {:.4e}", seed, last);
        }
        if let Some(dir) = plot_loss {
            let path = dir.join(format!("n2v_loss_seed_{}.svg", seed));
            plot::plot_loss_history(&LossHistory::from_epoch_losses(&losses), &path, "Loss during training")?;
        }
        latents_dict.insert(*seed, model.get_embedding().clone());
    }
    Ok(latents_dict)
} // end of n2v_latents_for_seeds

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    use crate::embed::gae::GraphAutoEncoder;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn ring(n: usize) -> GraphSample {
        let mut edges = Vec::new();
        for i in 0..n {
            for step in [1, 2] {
                edges.push((i, (i + step) % n));
                edges.push(((i + step) % n, i));
            }
        }
        GraphSample::featureless(n, edges).unwrap()
    }

    fn small_params(split_type: Option<SplitType>) -> GaeTrainParams {
        GaeTrainParams {
            split_type,
            lr: 0.01,
            n_epochs: 10,
            early_stopping: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_gae_latents_reproducible() {
        log_init_test();
        let graph = ring(16);
        let mut model = GaeModel::new(GraphAutoEncoder::new(16, 8, 3));
        let params = small_params(Some(SplitType::Link));
        let (latents, history) = gae_latents_for_seeds(&graph, &mut model, &[3, 7, 3], &params, None).unwrap();
        // seed 3 run twice, keeps last insertion but order of first
        assert_eq!(latents.len(), 2);
        assert_eq!(history.len(), 2);
        assert_eq!(latents.keys().copied().collect::<Vec<u64>>(), vec![3, 7]);
        assert_eq!(latents[&3].dim(), (16, 3));
        // same split reused and same seed : same latents
        let (again, _) = gae_latents_for_seeds(&graph, &mut model, &[3], &params, None).unwrap();
        assert_eq!(again[&3], latents[&3]);
        assert_ne!(latents[&3], latents[&7]);
    } // end of test_gae_latents_reproducible

    #[test]
    fn test_full_graph_split() {
        log_init_test();
        let graph = ring(10);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let split = build_split(&graph, &small_params(None), &mut rng).unwrap();
        assert_eq!(split.train.get_pos_supervision().len(), graph.get_nb_edges());
        let neg = split.val.get_neg_supervision();
        assert_eq!(neg.len(), graph.get_nb_edges());
        assert!(neg.iter().all(|(i, j)| i != j));
        assert!(build_split(&graph, &small_params(Some(SplitType::Node)), &mut rng).is_err());
    }

    #[test]
    fn test_use_full_graph() {
        log_init_test();
        let graph = ring(20);
        let mut params = small_params(Some(SplitType::Link));
        params.use_full_graph = true;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let split = build_split(&graph, &params, &mut rng).unwrap();
        assert_eq!(split.train.edge_index, graph.edge_index);
        // supervision still comes from the split
        assert_eq!(split.val.get_pos_supervision().len(), 4);
    }

    #[test]
    fn test_n2v_latents() {
        log_init_test();
        let graph = ring(12);
        let params = Node2VecParams {
            embedding_dim: 4,
            walk_length: 5,
            context_size: 3,
            walks_per_node: 2,
            batch_size: 6,
            num_workers: Some(1),
            n_epochs: 2,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let latents = n2v_latents_for_seeds(&graph, &[1, 2], &params, Some(dir.path())).unwrap();
        assert_eq!(latents.len(), 2);
        assert_eq!(latents[&1].dim(), (12, 4));
        assert!(dir.path().join("n2v_loss_seed_2.svg").exists());
        let again = n2v_latents_for_seeds(&graph, &[1], &params, None).unwrap();
        assert_eq!(again[&1], latents[&1]);
    }
} // end of mod tests
