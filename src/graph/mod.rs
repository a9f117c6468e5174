//! Graph samples as consumed by the embedders and by the link split.
//!
//! A [GraphSample] stores node features as an Array2 (one row by node), the edges as a list of
//! (source, target) node ranks, and optionally per edge weights and categorical labels.
//! After a link split the sample also carries its supervision edges, see [EdgeSupervision].

use anyhow::anyhow;

use ndarray::Array2;

use ahash::AHashSet;

pub mod negative;
pub mod split;

/// an edge as (source rank, target rank)
pub type EdgePair = (usize, usize);

/// default name of the attribute holding supervision labels
pub const DEFAULT_LABEL_KEY: &str = "edge_label";

/// Supervision edges attached to a graph sample by a link split.
///
/// Positive labels are 1. (or categorical label + 1), negative labels are 0.
#[derive(Clone, Debug)]
pub enum EdgeSupervision {
    /// positives and negatives concatenated in `key` and `key_index`
    Merged {
        key: String,
        label: Vec<f64>,
        index: Vec<EdgePair>,
    },
    /// positives in `pos_key`, `pos_key_index`, negatives in `neg_key`, `neg_key_index`.
    /// Negative fields are None when no negative edge was allocated.
    Split {
        key: String,
        pos_label: Vec<f64>,
        pos_index: Vec<EdgePair>,
        neg_label: Option<Vec<f64>>,
        neg_index: Option<Vec<EdgePair>>,
    },
} // end of EdgeSupervision

impl EdgeSupervision {
    /// name of the label attribute
    pub fn get_key(&self) -> &str {
        match self {
            EdgeSupervision::Merged { key, .. } => key,
            EdgeSupervision::Split { key, .. } => key,
        }
    }

    /// positive supervision edges
    pub fn get_pos_edges(&self) -> Vec<EdgePair> {
        match self {
            EdgeSupervision::Merged { label, index, .. } => index
                .iter()
                .zip(label.iter())
                .filter(|(_, l)| **l > 0.)
                .map(|(e, _)| *e)
                .collect(),
            EdgeSupervision::Split { pos_index, .. } => pos_index.clone(),
        }
    }

    /// negative supervision edges
    pub fn get_neg_edges(&self) -> Vec<EdgePair> {
        match self {
            EdgeSupervision::Merged { label, index, .. } => index
                .iter()
                .zip(label.iter())
                .filter(|(_, l)| **l <= 0.)
                .map(|(e, _)| *e)
                .collect(),
            EdgeSupervision::Split { neg_index, .. } => match neg_index {
                Some(index) => index.clone(),
                None => Vec::new(),
            },
        }
    }
} // end of impl EdgeSupervision

/// A graph with node features.
#[derive(Clone, Debug)]
pub struct GraphSample {
    /// number of nodes
    num_nodes: usize,
    /// node features, (num_nodes, nb_features)
    pub x: Array2<f64>,
    /// edges used for message passing
    pub edge_index: Vec<EdgePair>,
    /// optional weights, one by edge of edge_index
    pub edge_weight: Option<Vec<f64>>,
    /// optional categorical edge label, one by edge of edge_index.
    pub edge_class: Option<Vec<usize>>,
    /// optional class of nodes, used by latent classifiers
    pub node_label: Option<Vec<usize>>,
    /// supervision edges filled by a link split
    pub supervision: Option<EdgeSupervision>,
} // end of GraphSample

impl GraphSample {
    /// builds a sample without weights. Returns an error if an edge refers to a node not in features.
    pub fn new(x: Array2<f64>, edge_index: Vec<EdgePair>) -> anyhow::Result<Self> {
        let num_nodes = x.nrows();
        if let Some(edge) = edge_index.iter().find(|e| e.0 >= num_nodes || e.1 >= num_nodes) {
            log::error!("GraphSample::new edge {:?} out of range, nb nodes : {}", edge, num_nodes);
            return Err(anyhow!("edge {:?} refers to a node out of range (nb nodes {})", edge, num_nodes));
        }
        Ok(GraphSample {
            num_nodes,
            x,
            edge_index,
            edge_weight: None,
            edge_class: None,
            node_label: None,
            supervision: None,
        })
    }

    /// builds a sample without node features (features are the identity matrix)
    pub fn featureless(num_nodes: usize, edge_index: Vec<EdgePair>) -> anyhow::Result<Self> {
        GraphSample::new(Array2::<f64>::eye(num_nodes), edge_index)
    }

    /// set edge weights. Must have one weight by edge
    pub fn with_edge_weight(mut self, weights: Vec<f64>) -> anyhow::Result<Self> {
        if weights.len() != self.edge_index.len() {
            return Err(anyhow!(
                "got {} weights for {} edges",
                weights.len(),
                self.edge_index.len()
            ));
        }
        self.edge_weight = Some(weights);
        Ok(self)
    }

    /// set categorical edge labels. Must have one label by edge
    pub fn with_edge_class(mut self, classes: Vec<usize>) -> anyhow::Result<Self> {
        if classes.len() != self.edge_index.len() {
            return Err(anyhow!(
                "got {} edge labels for {} edges",
                classes.len(),
                self.edge_index.len()
            ));
        }
        self.edge_class = Some(classes);
        Ok(self)
    }

    /// set node classes. Must have one label by node
    pub fn with_node_label(mut self, labels: Vec<usize>) -> anyhow::Result<Self> {
        if labels.len() != self.num_nodes {
            return Err(anyhow!("got {} node labels for {} nodes", labels.len(), self.num_nodes));
        }
        self.node_label = Some(labels);
        Ok(self)
    }

    pub fn get_nb_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn get_nb_edges(&self) -> usize {
        self.edge_index.len()
    }

    pub fn get_nb_features(&self) -> usize {
        self.x.ncols()
    }

    /// returns positive supervision edges if a split was done, else all edges
    pub fn get_pos_supervision(&self) -> Vec<EdgePair> {
        match &self.supervision {
            Some(supervision) => supervision.get_pos_edges(),
            None => self.edge_index.clone(),
        }
    }

    /// returns negative supervision edges, empty if no split was done
    pub fn get_neg_supervision(&self) -> Vec<EdgePair> {
        match &self.supervision {
            Some(supervision) => supervision.get_neg_edges(),
            None => Vec::new(),
        }
    }

    /// true if for each edge (i,j) the edge (j,i) is also present
    pub fn is_undirected(&self) -> bool {
        let set: AHashSet<EdgePair> = self.edge_index.iter().copied().collect();
        self.edge_index.iter().all(|(i, j)| set.contains(&(*j, *i)))
    }
} // end of impl GraphSample

/// removes self loops, returns kept edges and the rank of kept edges in input
pub fn remove_self_loops(edge_index: &[EdgePair]) -> (Vec<EdgePair>, Vec<usize>) {
    let mut kept = Vec::<EdgePair>::with_capacity(edge_index.len());
    let mut ranks = Vec::<usize>::with_capacity(edge_index.len());
    for (rank, edge) in edge_index.iter().enumerate() {
        if edge.0 != edge.1 {
            kept.push(*edge);
            ranks.push(rank);
        }
    }
    (kept, ranks)
} // end of remove_self_loops

/// appends a self loop for every node
pub fn add_self_loops(edge_index: &[EdgePair], num_nodes: usize) -> Vec<EdgePair> {
    let mut edges = Vec::<EdgePair>::with_capacity(edge_index.len() + num_nodes);
    edges.extend_from_slice(edge_index);
    edges.extend((0..num_nodes).map(|i| (i, i)));
    edges
} // end of add_self_loops

pub fn contains_self_loops(edge_index: &[EdgePair]) -> bool {
    edge_index.iter().any(|e| e.0 == e.1)
}

/// symetrize and deduplicate edges. Output is sorted.
pub fn to_undirected(edge_index: &[EdgePair]) -> Vec<EdgePair> {
    let mut edges = Vec::<EdgePair>::with_capacity(2 * edge_index.len());
    for (i, j) in edge_index {
        edges.push((*i, *j));
        edges.push((*j, *i));
    }
    edges.sort_unstable();
    edges.dedup();
    edges
} // end of to_undirected

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_self_loops() {
        log_init_test();
        let edges = vec![(0, 1), (1, 1), (2, 0), (2, 2)];
        assert!(contains_self_loops(&edges));
        let (kept, ranks) = remove_self_loops(&edges);
        assert_eq!(kept, vec![(0, 1), (2, 0)]);
        assert_eq!(ranks, vec![0, 2]);
        assert!(!contains_self_loops(&kept));
        let looped = add_self_loops(&kept, 3);
        assert_eq!(looped.len(), 5);
        assert_eq!(looped[2..], [(0, 0), (1, 1), (2, 2)]);
    } // end of test_self_loops

    #[test]
    fn test_undirected() {
        log_init_test();
        let edges = vec![(0, 1), (1, 2), (2, 1)];
        let sym = to_undirected(&edges);
        assert_eq!(sym, vec![(0, 1), (1, 0), (1, 2), (2, 1)]);
        let graph = GraphSample::featureless(3, sym).unwrap();
        assert!(graph.is_undirected());
        let graph = GraphSample::featureless(3, edges).unwrap();
        assert!(!graph.is_undirected());
    } // end of test_undirected

    #[test]
    fn test_out_of_range_edge() {
        log_init_test();
        let res = GraphSample::featureless(2, vec![(0, 2)]);
        assert!(res.is_err());
        let graph = GraphSample::featureless(2, vec![(0, 1)]).unwrap();
        assert!(graph.clone().with_edge_weight(vec![1., 2.]).is_err());
        assert!(graph.with_edge_weight(vec![0.5]).is_ok());
    }
} // end of mod tests
