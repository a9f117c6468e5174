//! Node2Vec embedding.
//!
//! Grover, Leskovec. node2vec: Scalable Feature Learning for Networks. KDD 2016
//!
//! Second order random walks are cut in windows of size context_size. The first node of a window
//! must be close in embedded space to the other nodes of the window (skip-gram), and far from
//! the nodes of random windows (negative sampling). A single embedding table is used for nodes and contexts.
//!
//! Walks are generated in a rayon pool of num_workers threads, each walk with its own random generator
//! seeded from the batch seed and the walk rank, so results do not depend on the number of workers.

use anyhow::anyhow;

use cpu_time::ProcessTime;
use std::time::SystemTime;

use ahash::AHashMap;
use ndarray::{Array1, Array2};

use petgraph::graph::{Graph, NodeIndex};
use petgraph::Directed;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use rayon::prelude::*;

use serde::{Deserialize, Serialize};

use super::gae::sigmoid;
use super::optim::SparseAdam;
use crate::graph::EdgePair;

const EPS: f64 = 1.0e-15;

/// Node2Vec parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node2VecParams {
    /// dimension of embedding
    pub embedding_dim: usize,
    /// number of steps of a walk
    pub walk_length: usize,
    /// window size, must be less or equal to walk_length
    pub context_size: usize,
    pub walks_per_node: usize,
    pub num_negative_samples: usize,
    /// return parameter
    pub p: f64,
    /// in-out parameter
    pub q: f64,
    /// number of start nodes in a batch
    pub batch_size: usize,
    /// number of threads generating walks, defaults to number of cpus
    pub num_workers: Option<usize>,
    pub lr: f64,
    pub n_epochs: usize,
} // end of Node2VecParams

impl Default for Node2VecParams {
    fn default() -> Self {
        Node2VecParams {
            embedding_dim: 64,
            walk_length: 30,
            context_size: 10,
            walks_per_node: 50,
            num_negative_samples: 1,
            p: 1.,
            q: 1.,
            batch_size: 128,
            num_workers: None,
            lr: 0.01,
            n_epochs: 100,
        }
    }
}

impl Node2VecParams {
    pub fn get_num_workers(&self) -> usize {
        self.num_workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

pub struct Node2Vec {
    params: Node2VecParams,
    /// sorted out neighbours of each node
    adjacency: Vec<Vec<usize>>,
    /// (nb nodes, embedding_dim)
    embedding: Array2<f64>,
} // end of Node2Vec

impl Node2Vec {
    /// allocate a model, the embedding table is initialized from rng with N(0,1) entries.
    pub fn new(edge_index: &[EdgePair], num_nodes: usize, params: Node2VecParams, rng: &mut dyn RngCore) -> anyhow::Result<Self> {
        if params.walk_length < params.context_size {
            log::error!("Node2Vec walk_length {} < context_size {}", params.walk_length, params.context_size);
            return Err(anyhow!("walk_length must be greater or equal to context_size"));
        }
        if params.context_size < 2 {
            return Err(anyhow!("context_size must be at least 2"));
        }
        if params.p <= 0. || params.q <= 0. {
            return Err(anyhow!("p and q must be positive"));
        }
        let mut graph = Graph::<(), (), Directed, u32>::with_capacity(num_nodes, edge_index.len());
        for _ in 0..num_nodes {
            graph.add_node(());
        }
        for (i, j) in edge_index {
            if *i >= num_nodes || *j >= num_nodes {
                return Err(anyhow!("edge ({},{}) out of range", i, j));
            }
            graph.add_edge(NodeIndex::new(*i), NodeIndex::new(*j), ());
        }
        let adjacency = (0..num_nodes)
            .map(|i| {
                let mut neighbours: Vec<usize> = graph.neighbors(NodeIndex::new(i)).map(|n| n.index()).collect();
                neighbours.sort_unstable();
                neighbours
            })
            .collect();
        let mut model = Node2Vec {
            embedding: Array2::zeros((num_nodes, params.embedding_dim)),
            params,
            adjacency,
        };
        model.reset_parameters(rng);
        Ok(model)
    } // end of new

    pub fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        self.embedding.mapv_inplace(|_| StandardNormal.sample(rng));
    }

    pub fn get_params(&self) -> &Node2VecParams {
        &self.params
    }

    pub fn get_nb_nodes(&self) -> usize {
        self.adjacency.len()
    }

    /// the embedding table, one row by node
    pub fn get_embedding(&self) -> &Array2<f64> {
        &self.embedding
    }

    // one step of a second order walk from cur, having come from prev
    fn next_node(&self, prev: Option<usize>, cur: usize, rng: &mut Xoshiro256PlusPlus) -> usize {
        let neighbours = &self.adjacency[cur];
        if neighbours.is_empty() {
            return cur;
        }
        let uniform = self.params.p == 1. && self.params.q == 1.;
        match prev {
            Some(t) if !uniform => {
                let weight = |x: usize| -> f64 {
                    if x == t {
                        1. / self.params.p
                    } else if self.adjacency[t].binary_search(&x).is_ok() {
                        1.
                    } else {
                        1. / self.params.q
                    }
                };
                let total: f64 = neighbours.iter().map(|x| weight(*x)).sum();
                let mut xsi = rng.gen::<f64>() * total;
                for x in neighbours {
                    xsi -= weight(*x);
                    if xsi <= 0. {
                        return *x;
                    }
                }
                neighbours[neighbours.len() - 1]
            }
            _ => neighbours[rng.gen_range(0..neighbours.len())],
        }
    } // end of next_node

    /// a walk of walk_length steps starting at start. Isolated nodes stay in place.
    pub fn random_walk(&self, start: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut walk = Vec::<usize>::with_capacity(self.params.walk_length + 1);
        walk.push(start);
        let mut prev = None;
        let mut cur = start;
        for _ in 0..self.params.walk_length {
            let next = self.next_node(prev, cur, rng);
            prev = Some(cur);
            cur = next;
            walk.push(cur);
        }
        walk
    }

    // cut walks in windows of context_size
    fn to_windows(&self, walks: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
        let c = self.params.context_size;
        let mut windows = Vec::with_capacity(walks.len() * (self.params.walk_length + 2 - c));
        for walk in walks {
            for j in 0..(walk.len() + 1 - c) {
                windows.push(walk[j..j + c].to_vec());
            }
        }
        windows
    }

    /// positive windows : random walks from batch nodes
    pub fn pos_sample(&self, batch: &[usize], seed: u64, pool: &rayon::ThreadPool) -> Vec<Vec<usize>> {
        let starts: Vec<usize> = batch
            .iter()
            .flat_map(|n| std::iter::repeat(*n).take(self.params.walks_per_node))
            .collect();
        let walks: Vec<Vec<usize>> = pool.install(|| {
            starts
                .par_iter()
                .enumerate()
                .map(|(k, start)| {
                    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(k as u64));
                    self.random_walk(*start, &mut rng)
                })
                .collect()
        });
        self.to_windows(walks)
    }

    /// negative windows : batch nodes followed by uniformly drawn nodes
    pub fn neg_sample(&self, batch: &[usize], seed: u64, pool: &rayon::ThreadPool) -> Vec<Vec<usize>> {
        let nb_nodes = self.get_nb_nodes();
        let starts: Vec<usize> = batch
            .iter()
            .flat_map(|n| std::iter::repeat(*n).take(self.params.walks_per_node * self.params.num_negative_samples))
            .collect();
        let walk_length = self.params.walk_length;
        let walks: Vec<Vec<usize>> = pool.install(|| {
            starts
                .par_iter()
                .enumerate()
                .map(|(k, start)| {
                    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(k as u64));
                    let mut walk = Vec::with_capacity(walk_length + 1);
                    walk.push(*start);
                    walk.extend((0..walk_length).map(|_| rng.gen_range(0..nb_nodes)));
                    walk
                })
                .collect()
        });
        self.to_windows(walks)
    }

    /// skip-gram loss of windows, accumulating gradients of rows if grads is given
    pub fn loss(&self, pos: &[Vec<usize>], neg: &[Vec<usize>], mut grads: Option<&mut AHashMap<usize, Array1<f64>>>) -> f64 {
        let mut total = 0.;
        for (windows, positive) in [(pos, true), (neg, false)] {
            let nb_pairs = windows.iter().map(|w| w.len() - 1).sum::<usize>();
            if nb_pairs == 0 {
                continue;
            }
            let mut sum = 0.;
            for window in windows {
                let start = window[0];
                for other in &window[1..] {
                    let s = self.embedding.row(start).dot(&self.embedding.row(*other));
                    let p = sigmoid(s);
                    let (l, g) = match positive {
                        true => (-(p + EPS).ln(), p - 1.),
                        false => (-(1. - p + EPS).ln(), p),
                    };
                    sum += l;
                    if let Some(grads) = grads.as_mut() {
                        let g = g / nb_pairs as f64;
                        let dim = self.params.embedding_dim;
                        grads
                            .entry(start)
                            .or_insert_with(|| Array1::zeros(dim))
                            .scaled_add(g, &self.embedding.row(*other));
                        grads
                            .entry(*other)
                            .or_insert_with(|| Array1::zeros(dim))
                            .scaled_add(g, &self.embedding.row(start));
                    }
                }
            }
            total += sum / nb_pairs as f64;
        }
        total
    } // end of loss

    /// train for n_epochs, returns the mean batch loss of each epoch
    pub fn train(&mut self, rng: &mut Xoshiro256PlusPlus) -> anyhow::Result<Vec<f64>> {
        let nb_workers = self.params.get_num_workers();
        let pool = match rayon::ThreadPoolBuilder::new().num_threads(nb_workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                log::error!("Node2Vec::train could not build thread pool : {}", e);
                return Err(anyhow!("could not build thread pool : {}", e));
            }
        };
        let cpu_start = ProcessTime::now();
        let sys_start = SystemTime::now();
        let mut optimizer = SparseAdam::new(self.params.lr, self.embedding.dim());
        let mut nodes: Vec<usize> = (0..self.get_nb_nodes()).collect();
        let batch_size = self.params.batch_size.max(1);
        let mut epoch_losses = Vec::<f64>::with_capacity(self.params.n_epochs);
        for epoch in 0..self.params.n_epochs {
            nodes.shuffle(rng);
            let mut total = 0.;
            let mut nb_batches = 0;
            for batch in nodes.chunks(batch_size) {
                let pos = self.pos_sample(batch, rng.next_u64(), &pool);
                let neg = self.neg_sample(batch, rng.next_u64(), &pool);
                let mut grads = AHashMap::<usize, Array1<f64>>::new();
                total += self.loss(&pos, &neg, Some(&mut grads));
                optimizer.step(&mut self.embedding, &grads);
                nb_batches += 1;
            }
            let epoch_loss = if nb_batches > 0 { total / nb_batches as f64 } else { 0. };
            log::debug!("Node2Vec epoch {} loss : {:.4e}", epoch + 1, epoch_loss);
            epoch_losses.push(epoch_loss);
        }
        log::info!(
            "Node2Vec trained {} epochs, sys time(ms) {:?} cpu time(ms) {:?}",
            self.params.n_epochs,
            sys_start.elapsed().map(|d| d.as_millis()).unwrap_or(0),
            cpu_start.elapsed().as_millis()
        );
        Ok(epoch_losses)
    } // end of train
} // end of impl Node2Vec

//========================================================================================

// end of mod tests
