//! Contribution of each node to the numerical rank of a latent matrix.

use indexmap::IndexMap;
use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;

use crate::tools::linalg::matrix_rank;

/// default tolerance on singular values
pub const RANK_TOL: f64 = 1.0e-5;

/// For each row (node) of latents, the decrease of the rank of latents when this row is removed.
/// Only nodes with a non zero decrease are returned, in increasing node order.
pub fn rank_difference_dict(latents: &ArrayView2<f64>, tol: f64) -> IndexMap<usize, usize> {
    let nb_nodes = latents.nrows();
    let full_rank = matrix_rank(latents, tol);
    log::debug!("rank_difference_dict : {} nodes, full rank {}", nb_nodes, full_rank);
    let drops: Vec<(usize, usize)> = (0..nb_nodes)
        .into_par_iter()
        .filter_map(|node| {
            let kept: Vec<usize> = (0..nb_nodes).filter(|i| *i != node).collect();
            let reduced = latents.select(Axis(0), &kept);
            let drop = full_rank.saturating_sub(matrix_rank(&reduced.view(), tol));
            if drop > 0 {
                Some((node, drop))
            } else {
                None
            }
        })
        .collect();
    drops.into_iter().collect()
} // end of rank_difference_dict
