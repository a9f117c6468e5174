//! Stability of embeddings across seeds.
//!
//! Each embedding is clustered hierarchically, the dendrogram being cut at 1..=K clusters.
//! Two embeddings are compared by the matrix of agreement scores between the i-cluster solution
//! of the first and the j-cluster solution of the second.
//! A stable embedder gives matrices with large values near the diagonal.

use anyhow::anyhow;
use ndarray::{Array2, ArrayView2, Zip};
use num_traits::Float;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub mod agreement;
pub mod hclust;
pub mod rank;

use agreement::AgreementMetric;
use hclust::{Affinity, Dendrogram, Linkage};

use crate::embed::LatentsDict;

/// default number of clusters up to which dendrograms are cut
pub const DEFAULT_MAX_CLUSTERS: usize = 15;

/// how an embedding is clustered
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub affinity: Affinity,
    pub linkage: Linkage,
}

impl ClusterParams {
    pub fn new(affinity: Affinity, linkage: Linkage) -> Self {
        ClusterParams { affinity, linkage }
    }
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams::new(Affinity::Euclidean, Linkage::Average)
    }
}

/// clustering params for each of the 2 embeddings compared
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParamsPair(pub ClusterParams, pub ClusterParams);

impl From<ClusterParams> for ParamsPair {
    fn from(params: ClusterParams) -> Self {
        ParamsPair(params, params)
    }
}

impl From<(ClusterParams, ClusterParams)> for ParamsPair {
    fn from(pair: (ClusterParams, ClusterParams)) -> Self {
        ParamsPair(pair.0, pair.1)
    }
}

/// labels of points for 1..=n_max_clusters clusters
pub fn cluster_labels<F: Float>(
    latents: &ArrayView2<F>,
    params: &ClusterParams,
    n_max_clusters: usize,
) -> anyhow::Result<Vec<Vec<usize>>> {
    if n_max_clusters == 0 {
        return Err(anyhow!("n_max_clusters must be at least 1"));
    }
    let dendrogram = Dendrogram::new(latents, params.affinity, params.linkage)?;
    (1..=n_max_clusters).map(|k| dendrogram.cut(k)).collect()
}

fn score_matrix(labels_1: &[Vec<usize>], labels_2: &[Vec<usize>], metric: AgreementMetric) -> Array2<f64> {
    let mut scores = Array2::<f64>::zeros((labels_1.len(), labels_2.len()));
    Zip::indexed(&mut scores).par_for_each(|(i, j), score| *score = metric.score(&labels_1[i], &labels_2[j]));
    scores
}

/// Agreement matrix between the clusterings of 2 embeddings of the same nodes.
/// Entry (i-1, j-1) compares the i-cluster solution of latents_1 with the j-cluster solution of latents_2.
pub fn compute_agreement_matrix<F: Float>(
    latents_1: &ArrayView2<F>,
    latents_2: &ArrayView2<F>,
    params: impl Into<ParamsPair>,
    n_max_clusters: usize,
    metric: AgreementMetric,
) -> anyhow::Result<Array2<f64>> {
    if latents_1.nrows() != latents_2.nrows() {
        return Err(anyhow!(
            "embeddings do not have the same number of nodes : {} {}",
            latents_1.nrows(),
            latents_2.nrows()
        ));
    }
    let ParamsPair(params_1, params_2) = params.into();
    let labels_1 = cluster_labels(latents_1, &params_1, n_max_clusters)?;
    let labels_2 = cluster_labels(latents_2, &params_2, n_max_clusters)?;
    Ok(score_matrix(&labels_1, &labels_2, metric))
}

/// Adjusted mutual information matrix between the clusterings of 2 embeddings,
/// see [compute_agreement_matrix]. (usual value of n_max_clusters is [DEFAULT_MAX_CLUSTERS])
pub fn compute_ami_matrix<F: Float>(
    latents_1: &ArrayView2<F>,
    latents_2: &ArrayView2<F>,
    params: impl Into<ParamsPair>,
    n_max_clusters: usize,
) -> anyhow::Result<Array2<f64>> {
    compute_agreement_matrix(
        latents_1,
        latents_2,
        params,
        n_max_clusters,
        AgreementMetric::AdjustedMutualInfo,
    )
}

/// Co-clustering screen of all embeddings of latents_dict.
/// Returns the agreement matrices of all ordered pairs (i,j) of entries, pair (i,j) at index i * S + j.
/// Each embedding is clustered once.
pub fn stability_cocluster_screen(
    latents_dict: &LatentsDict,
    params: &ClusterParams,
    n_max_clusters: usize,
    metric: AgreementMetric,
) -> anyhow::Result<Vec<Array2<f64>>> {
    let nb_entries = latents_dict.len();
    log::info!(
        "stability_cocluster_screen : {} embeddings, affinity {}, linkage {}, up to {} clusters",
        nb_entries,
        params.affinity,
        params.linkage,
        n_max_clusters
    );
    let cpu_start = cpu_time::ProcessTime::now();
    let labels: Vec<Vec<Vec<usize>>> = latents_dict
        .values()
        .collect::<Vec<&Array2<f64>>>()
        .into_par_iter()
        .map(|latents| cluster_labels(&latents.view(), params, n_max_clusters))
        .collect::<anyhow::Result<_>>()?;
    let mut matrices = Vec::<Array2<f64>>::with_capacity(nb_entries * nb_entries);
    for i in 0..nb_entries {
        for j in 0..nb_entries {
            matrices.push(score_matrix(&labels[i], &labels[j], metric));
        }
    }
    log::info!(
        "stability_cocluster_screen done, cpu time(ms) {:?}",
        cpu_start.elapsed().as_millis()
    );
    Ok(matrices)
} // end of stability_cocluster_screen

//========================================================================================

// end of mod tests
