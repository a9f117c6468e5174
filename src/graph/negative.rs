//! Sampling of negative edges, i.e node pairs that are not edges of the graph.
//!
//! Pairs are sampled without replacement. Self loops are never returned.
//! When the graph is sparse we sample pairs at random and reject pairs already taken,
//! when the requested number approaches the number of available pairs we enumerate
//! all non edges and draw a uniform subset.

use rand::seq::index;
use rand::Rng;

use ahash::AHashSet;

use super::EdgePair;

/// samples at most num_neg_samples node pairs (i,j) with i != j and (i,j) not in edge_index.
///
/// If force_undirected is true, pairs are returned with i < j and neither (i,j) nor (j,i) is an edge.
/// The result is shorter than asked for if there are not enough non edges.
pub fn negative_sampling<R: Rng + ?Sized>(
    edge_index: &[EdgePair],
    num_nodes: usize,
    num_neg_samples: usize,
    force_undirected: bool,
    rng: &mut R,
) -> Vec<EdgePair> {
    //
    if num_nodes < 2 || num_neg_samples == 0 {
        return Vec::new();
    }
    let key = |i: usize, j: usize| -> usize {
        if force_undirected && i > j {
            j * num_nodes + i
        } else {
            i * num_nodes + j
        }
    };
    let mut taken = AHashSet::<usize>::with_capacity(edge_index.len() + num_neg_samples);
    for (i, j) in edge_index {
        if i != j {
            taken.insert(key(*i, *j));
        }
    }
    let nb_pairs = match force_undirected {
        true => num_nodes * (num_nodes - 1) / 2,
        false => num_nodes * (num_nodes - 1),
    };
    let available = nb_pairs.saturating_sub(taken.len());
    let asked = num_neg_samples.min(available);
    if asked < num_neg_samples {
        log::warn!(
            "negative_sampling : asked {} negative edges, only {} available",
            num_neg_samples,
            available
        );
    }
    log::debug!(
        "negative_sampling nb nodes : {}, nb edges : {}, asked : {}",
        num_nodes,
        edge_index.len(),
        asked
    );
    //
    let mut sampled = Vec::<EdgePair>::with_capacity(asked);
    if 2 * asked >= available {
        // dense case, enumerate all non edges
        let mut candidates = Vec::<EdgePair>::with_capacity(available);
        for i in 0..num_nodes {
            let start = if force_undirected { i + 1 } else { 0 };
            for j in start..num_nodes {
                if i != j && !taken.contains(&key(i, j)) {
                    candidates.push((i, j));
                }
            }
        }
        for rank in index::sample(rng, candidates.len(), asked).into_iter() {
            sampled.push(candidates[rank]);
        }
    } else {
        while sampled.len() < asked {
            let i = rng.gen_range(0..num_nodes);
            let j = rng.gen_range(0..num_nodes);
            if i == j {
                continue;
            }
            let (i, j) = if force_undirected && i > j { (j, i) } else { (i, j) };
            if taken.insert(key(i, j)) {
                sampled.push((i, j));
            }
        }
    }
    sampled
} // end of negative_sampling

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn ring(n: usize) -> Vec<EdgePair> {
        let mut edges = Vec::new();
        for i in 0..n {
            edges.push((i, (i + 1) % n));
            edges.push(((i + 1) % n, i));
        }
        edges
    }

    #[test]
    fn test_negative_never_edge_nor_loop() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4664397);
        let edges = ring(50);
        let edge_set: AHashSet<EdgePair> = edges.iter().copied().collect();
        let neg = negative_sampling(&edges, 50, 200, false, &mut rng);
        assert_eq!(neg.len(), 200);
        let mut seen = AHashSet::<EdgePair>::new();
        for e in &neg {
            assert_ne!(e.0, e.1);
            assert!(!edge_set.contains(e));
            assert!(seen.insert(*e), "duplicated negative edge {:?}", e);
        }
    } // end of test_negative_never_edge_nor_loop

    #[test]
    fn test_negative_dense_exhaustion() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(17);
        // complete graph on 4 nodes minus (0,1) and (1,0)
        let mut edges = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                if i != j && !((i == 0 && j == 1) || (i == 1 && j == 0)) {
                    edges.push((i, j));
                }
            }
        }
        let neg = negative_sampling(&edges, 4, 10, false, &mut rng);
        assert_eq!(neg.len(), 2);
        assert!(neg.contains(&(0, 1)) && neg.contains(&(1, 0)));
        let neg = negative_sampling(&edges, 4, 10, true, &mut rng);
        assert_eq!(neg, vec![(0, 1)]);
    } // end of test_negative_dense_exhaustion

    #[test]
    fn test_negative_undirected() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let edges = ring(20);
        let edge_set: AHashSet<EdgePair> = edges.iter().copied().collect();
        let neg = negative_sampling(&edges, 20, 60, true, &mut rng);
        assert_eq!(neg.len(), 60);
        for (i, j) in &neg {
            assert!(i < j);
            assert!(!edge_set.contains(&(*i, *j)) && !edge_set.contains(&(*j, *i)));
        }
    }
} // end of mod tests
