//! To ease access to most frequently items
//!

pub use crate::graph::split::{LinkSplit, LinkSplitParams, RandomLinkSplit, SplitError, SplitSize};
pub use crate::graph::{EdgePair, GraphSample};

pub use crate::embed::gae::{FeatureDecoder, GaeModel, GraphAutoEncoder, LatentClassifier, LossWeights};
pub use crate::embed::history::{LossHistory, Mode};
pub use crate::embed::node2vec::Node2VecParams;
pub use crate::embed::trainers::*;
pub use crate::embed::LatentsDict;

pub use crate::stability::agreement::{adjusted_mutual_info, adjusted_rand_index, AgreementMetric};
pub use crate::stability::hclust::{Affinity, Dendrogram, Linkage};
pub use crate::stability::rank::rank_difference_dict;
pub use crate::stability::*;

pub use crate::plot::*;
pub use crate::projection::mds::{Dissimilarity, MdsParams};
pub use crate::projection::tsne::TsneParams;

pub use crate::io::csv::*;
