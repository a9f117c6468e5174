//! Edge level random split of a graph into train, validation and test samples for link prediction.
//!
//! The permutation of edges is cut in 3 disjoint segments which provide the positive supervision edges
//! of each split. The edges used for message passing are cumulative : the train sample sees the first segment,
//! the validation sample the first two segments and the test sample all edges.
//! So the validation (resp. test) encoder sees all edges that were available at training (resp. validation) time.
//!
//! Negative edges are sampled once for the 3 splits, without replacement, against the true edges,
//! and distributed to each split in proportion to its number of positive edges.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use serde::{Deserialize, Serialize};

use super::negative::negative_sampling;
use super::{add_self_loops, EdgePair, EdgeSupervision, GraphSample, DEFAULT_LABEL_KEY};

/// errors raised by a link split
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SplitError {
    #[error("Insufficient number of edges for training. (nb edges {nb_edges}, val : {num_val}, test : {num_test})")]
    InsufficientEdges {
        nb_edges: usize,
        num_val: usize,
        num_test: usize,
    },
    #[error("split fraction {0} must be in [0., 1.]")]
    InvalidFraction(f64),
}

/// size of a validation or test segment
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SplitSize {
    /// fraction of the (canonical) edges, in [0., 1.]
    Fraction(f64),
    /// absolute number of edges
    Count(usize),
}

impl SplitSize {
    // floor(fraction * nb_edges) as a segment size
    fn to_count(self, nb_edges: usize) -> Result<usize, SplitError> {
        match self {
            SplitSize::Fraction(f) => {
                if !(0. ..=1.).contains(&f) {
                    return Err(SplitError::InvalidFraction(f));
                }
                Ok((f * nb_edges as f64).floor() as usize)
            }
            SplitSize::Count(c) => Ok(c),
        }
    }
} // end of impl SplitSize

impl fmt::Display for SplitSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitSize::Fraction(v) => write!(f, "{}", v),
            SplitSize::Count(c) => write!(f, "{}", c),
        }
    }
}

/// parameters of a random link split
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkSplitParams {
    /// size of validation segment
    pub num_val: SplitSize,
    /// size of test segment
    pub num_test: SplitSize,
    /// if true the graph is assumed undirected, only edges (i,j) with i <= j are permuted and
    /// each selected edge is emitted with its reverse, so reverse edges do not leak across splits.
    pub is_undirected: bool,
    /// name of the label attribute
    pub key: String,
    /// if true positive and negative labels go in distinct fields
    pub split_labels: bool,
    /// add negative edges to the train sample
    pub add_negative_train_samples: bool,
    /// ratio of negative edges to positive edges
    pub neg_sampling_ratio: f64,
} // end of LinkSplitParams

impl Default for LinkSplitParams {
    fn default() -> Self {
        LinkSplitParams {
            num_val: SplitSize::Fraction(0.1),
            num_test: SplitSize::Fraction(0.2),
            is_undirected: false,
            key: String::from(DEFAULT_LABEL_KEY),
            split_labels: false,
            add_negative_train_samples: true,
            neg_sampling_ratio: 1.0,
        }
    }
}

impl LinkSplitParams {
    pub fn new(num_val: SplitSize, num_test: SplitSize, is_undirected: bool) -> Self {
        LinkSplitParams {
            num_val,
            num_test,
            is_undirected,
            ..Default::default()
        }
    }

    pub fn with_split_labels(mut self, split_labels: bool) -> Self {
        self.split_labels = split_labels;
        self
    }

    pub fn with_neg_sampling_ratio(mut self, ratio: f64) -> Self {
        self.neg_sampling_ratio = ratio;
        self
    }

    pub fn with_negative_train_samples(mut self, add: bool) -> Self {
        self.add_negative_train_samples = add;
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = String::from(key);
        self
    }
} // end of impl LinkSplitParams

/// The three samples produced by a split
#[derive(Clone, Debug)]
pub struct LinkSplit {
    pub train: GraphSample,
    pub val: GraphSample,
    pub test: GraphSample,
}

/// The random link split transform
pub struct RandomLinkSplit {
    params: LinkSplitParams,
}

impl RandomLinkSplit {
    pub fn new(params: LinkSplitParams) -> Self {
        RandomLinkSplit { params }
    }

    pub fn get_params(&self) -> &LinkSplitParams {
        &self.params
    }

    /// split data. The permutation and the negative edges are drawn from rng.
    pub fn split<R: Rng + ?Sized>(&self, data: &GraphSample, rng: &mut R) -> Result<LinkSplit, SplitError> {
        //
        let mut perm: Vec<usize> = (0..data.get_nb_edges()).collect();
        perm.shuffle(rng);
        if self.params.is_undirected {
            perm.retain(|rank| {
                let (i, j) = data.edge_index[*rank];
                i <= j
            });
        }
        let nb_edges = perm.len();
        let num_val = self.params.num_val.to_count(nb_edges)?;
        let num_test = self.params.num_test.to_count(nb_edges)?;
        if num_val + num_test >= nb_edges {
            log::error!(
                "RandomLinkSplit : insufficient number of edges for training, nb edges : {}, val : {}, test : {}",
                nb_edges,
                num_val,
                num_test
            );
            return Err(SplitError::InsufficientEdges {
                nb_edges,
                num_val,
                num_test,
            });
        }
        let num_train = nb_edges - num_val - num_test;
        log::debug!(
            "RandomLinkSplit nb edges : {}, train : {}, val : {}, test : {}",
            nb_edges,
            num_train,
            num_val,
            num_test
        );
        //
        let train_edges = &perm[..num_train];
        let val_edges = &perm[num_train..num_train + num_val];
        let test_edges = &perm[num_train + num_val..];
        // message passing edges are cumulative
        let mut train_data = self.split_data(data, &perm[..num_train]);
        let mut val_data = self.split_data(data, &perm[..num_train + num_val]);
        let mut test_data = self.split_data(data, &perm);
        //
        let ratio = self.params.neg_sampling_ratio;
        let num_neg_train = match self.params.add_negative_train_samples {
            true => (num_train as f64 * ratio).floor() as usize,
            false => 0,
        };
        let num_neg_val = (num_val as f64 * ratio).floor() as usize;
        let num_neg_test = (num_test as f64 * ratio).floor() as usize;
        let num_neg = num_neg_train + num_neg_val + num_neg_test;
        let neg_edge_index = negative_sampling(
            &add_self_loops(&data.edge_index, data.get_nb_nodes()),
            data.get_nb_nodes(),
            num_neg,
            false,
            rng,
        );
        // val takes the first negatives, test the next ones, train what remains
        let nb_sampled = neg_edge_index.len();
        let val_end = num_neg_val.min(nb_sampled);
        let test_end = (num_neg_val + num_neg_test).min(nb_sampled);
        train_data.supervision = Some(self.create_label(data, train_edges, &neg_edge_index[test_end..]));
        val_data.supervision = Some(self.create_label(data, val_edges, &neg_edge_index[..val_end]));
        test_data.supervision = Some(self.create_label(data, test_edges, &neg_edge_index[val_end..test_end]));
        //
        Ok(LinkSplit {
            train: train_data,
            val: val_data,
            test: test_data,
        })
    } // end of split

    // selected edges, with their reverse if undirected
    fn split_edges<T: Copy>(&self, values: &[T], index: &[usize], reverse: impl Fn(T) -> T) -> Vec<T> {
        let mut selected: Vec<T> = index.iter().map(|rank| values[*rank]).collect();
        if self.params.is_undirected {
            let reversed: Vec<T> = selected.iter().map(|v| reverse(*v)).collect();
            selected.extend(reversed);
        }
        selected
    }

    // a copy of data restricted to edges given by index. Edge attributes follow edges
    fn split_data(&self, data: &GraphSample, index: &[usize]) -> GraphSample {
        let mut split = data.clone();
        split.edge_index = self.split_edges(&data.edge_index, index, |(i, j)| (j, i));
        split.edge_weight = data
            .edge_weight
            .as_ref()
            .map(|weights| self.split_edges(weights, index, |w| w));
        split.edge_class = data
            .edge_class
            .as_ref()
            .map(|classes| self.split_edges(classes, index, |c| c));
        split.supervision = None;
        split
    } // end of split_data

    fn create_label(&self, data: &GraphSample, index: &[usize], neg_edge_index: &[EdgePair]) -> EdgeSupervision {
        let edge_index: Vec<EdgePair> = index.iter().map(|rank| data.edge_index[*rank]).collect();
        let edge_label: Vec<f64> = match &data.edge_class {
            Some(classes) => index.iter().map(|rank| (classes[*rank] + 1) as f64).collect(),
            None => vec![1.; index.len()],
        };
        let key = self.params.key.clone();
        if self.params.split_labels {
            let (neg_label, neg_index) = match neg_edge_index.is_empty() {
                true => (None, None),
                false => (Some(vec![0.; neg_edge_index.len()]), Some(neg_edge_index.to_vec())),
            };
            EdgeSupervision::Split {
                key,
                pos_label: edge_label,
                pos_index: edge_index,
                neg_label,
                neg_index,
            }
        } else {
            let mut label = edge_label;
            let mut index = edge_index;
            label.extend(std::iter::repeat(0.).take(neg_edge_index.len()));
            index.extend_from_slice(neg_edge_index);
            EdgeSupervision::Merged { key, label, index }
        }
    } // end of create_label
} // end of impl RandomLinkSplit

impl fmt::Display for RandomLinkSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RandomLinkSplit(num_val={}, num_test={})",
            self.params.num_val, self.params.num_test
        )
    }
}

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    use ahash::AHashSet;
    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // undirected graph : a ring of n nodes plus chords (i, i+3), both directions stored
    fn undirected_graph(n: usize) -> GraphSample {
        let mut edges = Vec::new();
        for i in 0..n {
            for step in [1, 3] {
                let j = (i + step) % n;
                edges.push((i, j));
                edges.push((j, i));
            }
        }
        GraphSample::featureless(n, edges).unwrap()
    }

    fn as_set(edges: &[EdgePair]) -> AHashSet<EdgePair> {
        edges.iter().copied().collect()
    }

    #[test]
    fn test_split_counts() {
        log_init_test();
        let graph = undirected_graph(50);
        // 100 canonical edges
        let params = LinkSplitParams::new(SplitSize::Fraction(0.15), SplitSize::Fraction(0.25), true).with_split_labels(true);
        let splitter = RandomLinkSplit::new(params);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(112);
        let split = splitter.split(&graph, &mut rng).unwrap();
        assert_eq!(split.val.get_pos_supervision().len(), 15);
        assert_eq!(split.test.get_pos_supervision().len(), 25);
        assert_eq!(split.train.get_pos_supervision().len(), 60);
        // negatives in proportion
        assert_eq!(split.val.get_neg_supervision().len(), 15);
        assert_eq!(split.test.get_neg_supervision().len(), 25);
        assert_eq!(split.train.get_neg_supervision().len(), 60);
        // message passing edges are cumulative, with reverse edges
        assert_eq!(split.train.get_nb_edges(), 120);
        assert_eq!(split.val.get_nb_edges(), 150);
        assert_eq!(split.test.get_nb_edges(), 200);
        let train = as_set(&split.train.edge_index);
        let val = as_set(&split.val.edge_index);
        let test = as_set(&split.test.edge_index);
        assert!(train.is_subset(&val));
        assert!(val.is_subset(&test));
        assert!(split.train.is_undirected());
        // supervision segments are disjoint
        let pos_train = as_set(&split.train.get_pos_supervision());
        let pos_val = as_set(&split.val.get_pos_supervision());
        let pos_test = as_set(&split.test.get_pos_supervision());
        assert!(pos_train.is_disjoint(&pos_val));
        assert!(pos_val.is_disjoint(&pos_test));
        assert!(pos_train.is_disjoint(&pos_test));
        // val positives are not seen in train message passing
        for (i, j) in &pos_val {
            assert!(!train.contains(&(*i, *j)) && !train.contains(&(*j, *i)));
        }
    } // end of test_split_counts

    #[test]
    fn test_split_negatives_are_non_edges() {
        log_init_test();
        let graph = undirected_graph(30);
        let edges = as_set(&graph.edge_index);
        let splitter = RandomLinkSplit::new(LinkSplitParams::new(SplitSize::Fraction(0.1), SplitSize::Fraction(0.2), true));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let split = splitter.split(&graph, &mut rng).unwrap();
        let mut all_neg = AHashSet::<EdgePair>::new();
        for sample in [&split.train, &split.val, &split.test] {
            for e in sample.get_neg_supervision() {
                assert_ne!(e.0, e.1);
                assert!(!edges.contains(&e));
                assert!(all_neg.insert(e), "negative edge shared between splits");
            }
        }
    } // end of test_split_negatives_are_non_edges

    #[test]
    fn test_split_identity() {
        log_init_test();
        let graph = undirected_graph(20);
        let splitter = RandomLinkSplit::new(LinkSplitParams::new(SplitSize::Fraction(0.), SplitSize::Count(0), true));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let split = splitter.split(&graph, &mut rng).unwrap();
        let original = as_set(&graph.edge_index);
        for sample in [&split.train, &split.val, &split.test] {
            assert_eq!(as_set(&sample.edge_index), original);
            assert_eq!(sample.get_nb_edges(), graph.get_nb_edges());
        }
        assert!(split.val.get_pos_supervision().is_empty());
        assert!(split.test.get_pos_supervision().is_empty());
    } // end of test_split_identity

    #[test]
    fn test_split_insufficient_edges() {
        log_init_test();
        let graph = undirected_graph(10);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for (v, t) in [(0.5, 0.5), (0.6, 0.4), (0.9, 0.3), (1.0, 0.)] {
            let splitter = RandomLinkSplit::new(LinkSplitParams::new(SplitSize::Fraction(v), SplitSize::Fraction(t), true));
            let res = splitter.split(&graph, &mut rng);
            assert!(matches!(res, Err(SplitError::InsufficientEdges { .. })), "v {} t {}", v, t);
        }
        let splitter = RandomLinkSplit::new(LinkSplitParams::new(SplitSize::Count(15), SplitSize::Count(5), true));
        assert!(splitter.split(&graph, &mut rng).is_err());
        let splitter = RandomLinkSplit::new(LinkSplitParams::new(SplitSize::Fraction(1.5), SplitSize::Count(0), true));
        assert_eq!(splitter.split(&graph, &mut rng).err(), Some(SplitError::InvalidFraction(1.5)));
    } // end of test_split_insufficient_edges

    #[test]
    fn test_split_merged_labels() {
        log_init_test();
        let graph = undirected_graph(20);
        let nb_edges = graph.get_nb_edges();
        let graph = graph.with_edge_class(vec![2; nb_edges]).unwrap();
        let params = LinkSplitParams::new(SplitSize::Fraction(0.1), SplitSize::Fraction(0.2), true)
            .with_negative_train_samples(false)
            .with_neg_sampling_ratio(2.);
        let splitter = RandomLinkSplit::new(params);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(77);
        let split = splitter.split(&graph, &mut rng).unwrap();
        match split.val.supervision.as_ref().unwrap() {
            EdgeSupervision::Merged { key, label, index } => {
                assert_eq!(key, DEFAULT_LABEL_KEY);
                assert_eq!(label.len(), index.len());
                // 4 val positives with label class + 1, 8 negatives
                assert_eq!(label.iter().filter(|l| **l == 3.).count(), 4);
                assert_eq!(label.iter().filter(|l| **l == 0.).count(), 8);
            }
            _ => panic!("expected merged labels"),
        }
        // no negatives in train
        assert!(split.train.get_neg_supervision().is_empty());
        assert_eq!(split.train.edge_class.as_ref().unwrap().len(), split.train.get_nb_edges());
        assert_eq!(format!("{}", splitter), "RandomLinkSplit(num_val=0.1, num_test=0.2)");
    } // end of test_split_merged_labels

    #[test]
    fn test_split_labels_without_negatives() {
        log_init_test();
        let graph = undirected_graph(20);
        let params = LinkSplitParams::new(SplitSize::Fraction(0.1), SplitSize::Fraction(0.2), true)
            .with_split_labels(true)
            .with_negative_train_samples(false);
        let split = RandomLinkSplit::new(params)
            .split(&graph, &mut Xoshiro256PlusPlus::seed_from_u64(5))
            .unwrap();
        match split.train.supervision.as_ref().unwrap() {
            EdgeSupervision::Split { neg_label, neg_index, pos_label, .. } => {
                assert!(neg_label.is_none() && neg_index.is_none());
                assert!(pos_label.iter().all(|l| *l == 1.));
            }
            _ => panic!("expected split labels"),
        }
    }
} // end of mod tests
