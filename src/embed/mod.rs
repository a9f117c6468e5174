//! Embedders of graph nodes.
//!
//! - [gae] : graph autoencoder with GCN encoder, trained by [train::train_gae]
//! - [node2vec] : random walks and skip-gram
//!
//! [trainers] runs either embedder for a list of seeds and collects
//! the latent vectors in a [LatentsDict].

use indexmap::IndexMap;
use ndarray::Array2;

pub mod gae;
pub mod history;
pub mod node2vec;
pub mod optim;
pub mod train;
pub mod trainers;

/// latent vectors (one row by node) of each seed, in the order seeds were run
pub type LatentsDict = IndexMap<u64, Array2<f64>>;
