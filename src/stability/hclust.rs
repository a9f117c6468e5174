//! Agglomerative hierarchical clustering.
//!
//! The dendrogram is computed once by the nearest neighbour chain algorithm on a condensed
//! distance matrix, distances to a merged cluster being updated with the Lance-Williams formulas.
//! All linkages supported are reducible so the chain algorithm gives the same hierarchy as
//! the naive algorithm. The dendrogram can then be cut at any number of clusters.

use anyhow::anyhow;
use num_traits::Float;
use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// distance between points
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    Euclidean,
    Manhattan,
    /// 1 - cosine similarity
    Cosine,
}

impl FromStr for Affinity {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Affinity::Euclidean),
            "manhattan" | "l1" => Ok(Affinity::Manhattan),
            "cosine" => Ok(Affinity::Cosine),
            _ => Err(anyhow!("unknown affinity : {}", s)),
        }
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Affinity::Euclidean => "euclidean",
            Affinity::Manhattan => "manhattan",
            Affinity::Cosine => "cosine",
        };
        write!(f, "{}", s)
    }
}

/// distance between clusters
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Single,
    Complete,
    Average,
    /// minimal increase of within cluster variance, requires euclidean affinity
    Ward,
}

impl FromStr for Linkage {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Linkage::Single),
            "complete" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            "ward" => Ok(Linkage::Ward),
            _ => Err(anyhow!("unknown linkage : {}", s)),
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::Ward => "ward",
        };
        write!(f, "{}", s)
    }
}

/// one merge : a leaf of each cluster merged and the distance between them
#[derive(Copy, Clone, Debug)]
pub struct Merge {
    pub leaf_a: usize,
    pub leaf_b: usize,
    pub height: f64,
}

/// upper triangle (without diagonal) of a symetric distance matrix
struct CondensedDist {
    n: usize,
    data: Vec<f64>,
}

impl CondensedDist {
    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        // rows before i hold n-1 + n-2 + ... + n-i terms
        i * (2 * self.n - i - 1) / 2 + (j - i - 1)
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, d: f64) {
        let idx = self.index(i, j);
        self.data[idx] = d;
    }
} // end of impl CondensedDist

fn distance(v1: &[f64], v2: &[f64], affinity: Affinity) -> f64 {
    match affinity {
        Affinity::Euclidean => v1.iter().zip(v2.iter()).map(|(a, b)| (a - b) * (a - b)).sum::<f64>().sqrt(),
        Affinity::Manhattan => v1.iter().zip(v2.iter()).map(|(a, b)| (a - b).abs()).sum::<f64>(),
        Affinity::Cosine => {
            let dot: f64 = v1.iter().zip(v2.iter()).map(|(a, b)| a * b).sum();
            let n1 = v1.iter().map(|a| a * a).sum::<f64>().sqrt();
            let n2 = v2.iter().map(|a| a * a).sum::<f64>().sqrt();
            if n1 > 0. && n2 > 0. {
                (1. - dot / (n1 * n2)).max(0.)
            } else {
                1.
            }
        }
    }
}

fn condensed_distances(rows: &[Vec<f64>], affinity: Affinity) -> CondensedDist {
    let n = rows.len();
    let data: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| ((i + 1)..n).map(|j| distance(&rows[i], &rows[j], affinity)).collect::<Vec<f64>>())
        .flatten()
        .collect();
    CondensedDist { n, data }
}

/// The full merge tree of a set of points.
pub struct Dendrogram {
    nb_points: usize,
    /// n-1 merges sorted by increasing height
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// computes the dendrogram of the rows of data
    pub fn new<F: Float>(data: &ArrayView2<F>, affinity: Affinity, linkage: Linkage) -> anyhow::Result<Self> {
        if linkage == Linkage::Ward && affinity != Affinity::Euclidean {
            log::error!("Dendrogram::new : ward linkage requires euclidean affinity, got {}", affinity);
            return Err(anyhow!("ward linkage requires euclidean affinity, got {}", affinity));
        }
        let nb_points = data.nrows();
        if nb_points == 0 {
            return Err(anyhow!("cannot cluster an empty data set"));
        }
        let mut rows = Vec::<Vec<f64>>::with_capacity(nb_points);
        for row in data.rows() {
            let mut v = Vec::with_capacity(row.len());
            for x in row.iter() {
                match x.to_f64() {
                    Some(x) if x.is_finite() => v.push(x),
                    _ => return Err(anyhow!("non finite value in data to cluster")),
                }
            }
            rows.push(v);
        }
        let dist = condensed_distances(&rows, affinity);
        let merges = nn_chain(dist, linkage);
        log::debug!("Dendrogram::new {} points, affinity {}, linkage {}", nb_points, affinity, linkage);
        Ok(Dendrogram { nb_points, merges })
    } // end of new

    pub fn get_nb_points(&self) -> usize {
        self.nb_points
    }

    /// merges in increasing height order
    pub fn get_merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Labels of points when the dendrogram is cut so as to get nb_clusters clusters.
    /// Labels are numbered from 0 in order of first appearance.
    pub fn cut(&self, nb_clusters: usize) -> anyhow::Result<Vec<usize>> {
        if nb_clusters == 0 || nb_clusters > self.nb_points {
            return Err(anyhow!(
                "number of clusters {} must be in [1, {}]",
                nb_clusters,
                self.nb_points
            ));
        }
        let mut parent: Vec<usize> = (0..self.nb_points).collect();
        for merge in self.merges.iter().take(self.nb_points - nb_clusters) {
            let ra = find_root(&mut parent, merge.leaf_a);
            let rb = find_root(&mut parent, merge.leaf_b);
            parent[ra.max(rb)] = ra.min(rb);
        }
        let mut labels = vec![usize::MAX; self.nb_points];
        let mut root_label = vec![usize::MAX; self.nb_points];
        let mut nb_labels = 0;
        for i in 0..self.nb_points {
            let r = find_root(&mut parent, i);
            if root_label[r] == usize::MAX {
                root_label[r] = nb_labels;
                nb_labels += 1;
            }
            labels[i] = root_label[r];
        }
        if nb_labels != nb_clusters {
            log::error!("Dendrogram::cut : got {} labels for {} clusters", nb_labels, nb_clusters);
            return Err(anyhow!("inconsistent merges, {} labels for {} clusters", nb_labels, nb_clusters));
        }
        Ok(labels)
    } // end of cut
} // end of impl Dendrogram

fn find_root(parent: &mut [usize], i: usize) -> usize {
    let mut r = i;
    while parent[r] != r {
        r = parent[r];
    }
    // path compression
    let mut j = i;
    while parent[j] != r {
        let next = parent[j];
        parent[j] = r;
        j = next;
    }
    r
}

// distance from merged cluster a+b to x
fn lance_williams(linkage: Linkage, d_ax: f64, d_bx: f64, d_ab: f64, sa: f64, sb: f64, sx: f64) -> f64 {
    match linkage {
        Linkage::Single => d_ax.min(d_bx),
        Linkage::Complete => d_ax.max(d_bx),
        Linkage::Average => (sa * d_ax + sb * d_bx) / (sa + sb),
        Linkage::Ward => {
            let t = sa + sb + sx;
            (((sa + sx) * d_ax * d_ax + (sb + sx) * d_bx * d_bx - sx * d_ab * d_ab) / t)
                .max(0.)
                .sqrt()
        }
    }
}

fn nn_chain(mut dist: CondensedDist, linkage: Linkage) -> Vec<Merge> {
    let n = dist.n;
    let mut active = vec![true; n];
    let mut size = vec![1usize; n];
    // a leaf of the cluster held in each slot
    let mut leaf: Vec<usize> = (0..n).collect();
    let mut merges = Vec::<Merge>::with_capacity(n.saturating_sub(1));
    let mut chain = Vec::<usize>::with_capacity(n);
    //
    while merges.len() + 1 < n {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|a| *a) {
                chain.push(first);
            }
        }
        let (a, b) = loop {
            let a = chain[chain.len() - 1];
            let prev = if chain.len() >= 2 { Some(chain[chain.len() - 2]) } else { None };
            // nearest active neighbour of a, previous element of the chain wins ties
            let mut best = prev;
            let mut best_d = prev.map(|p| dist.get(a, p)).unwrap_or(f64::INFINITY);
            for x in 0..n {
                if !active[x] || x == a {
                    continue;
                }
                let d = dist.get(a, x);
                if d < best_d {
                    best_d = d;
                    best = Some(x);
                }
            }
            let c = match best {
                Some(c) => c,
                None => unreachable!("nn_chain : no active neighbour"),
            };
            if Some(c) == prev {
                chain.pop();
                chain.pop();
                break (a, c);
            }
            chain.push(c);
        };
        let d_ab = dist.get(a, b);
        merges.push(Merge {
            leaf_a: leaf[a],
            leaf_b: leaf[b],
            height: d_ab,
        });
        // merged cluster goes in slot b
        let (sa, sb) = (size[a] as f64, size[b] as f64);
        active[a] = false;
        for x in 0..n {
            if !active[x] || x == b {
                continue;
            }
            let d = lance_williams(linkage, dist.get(a, x), dist.get(b, x), d_ab, sa, sb, size[x] as f64);
            dist.set(b, x, d);
        }
        size[b] += size[a];
        leaf[b] = leaf[b].min(leaf[a]);
    }
    // stable sort keeps a child merge before its parent at equal height
    merges.sort_by(|m1, m2| m1.height.partial_cmp(&m2.height).unwrap_or(std::cmp::Ordering::Equal));
    merges
} // end of nn_chain

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::Array2;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // 3 well separated blobs of 4 points in the plane
    fn blobs() -> Array2<f64> {
        let centers = [(0., 0.), (10., 0.), (0., 10.)];
        let offsets = [(0., 0.), (0.3, 0.1), (-0.2, 0.25), (0.1, -0.3)];
        let mut data = Array2::<f64>::zeros((12, 2));
        for (c, center) in centers.iter().enumerate() {
            for (k, off) in offsets.iter().enumerate() {
                data[[4 * c + k, 0]] = center.0 + off.0;
                data[[4 * c + k, 1]] = center.1 + off.1;
            }
        }
        data
    }

    #[test]
    fn test_condensed_index() {
        let dist = CondensedDist { n: 5, data: vec![0.; 10] };
        let mut seen = vec![false; 10];
        for i in 0..5 {
            for j in (i + 1)..5 {
                let idx = dist.index(i, j);
                assert!(!seen[idx]);
                seen[idx] = true;
                assert_eq!(idx, dist.index(j, i));
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_blobs_all_linkages() {
        log_init_test();
        let data = blobs();
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            let dendro = Dendrogram::new(&data.view(), Affinity::Euclidean, linkage).unwrap();
            assert_eq!(dendro.get_merges().len(), 11);
            let labels = dendro.cut(3).unwrap();
            for c in 0..3 {
                assert!(labels[4 * c..4 * c + 4].iter().all(|l| *l == c), "linkage {}", linkage);
            }
            let heights: Vec<f64> = dendro.get_merges().iter().map(|m| m.height).collect();
            assert!(heights.windows(2).all(|w| w[0] <= w[1]));
        }
    } // end of test_blobs_all_linkages

    #[test]
    fn test_cut_extremes() {
        log_init_test();
        let data = blobs();
        let dendro = Dendrogram::new(&data.view(), Affinity::Manhattan, Linkage::Average).unwrap();
        assert!(dendro.cut(1).unwrap().iter().all(|l| *l == 0));
        let labels = dendro.cut(12).unwrap();
        assert_eq!(labels, (0..12).collect::<Vec<usize>>());
        assert!(dendro.cut(0).is_err());
        assert!(dendro.cut(13).is_err());
        for k in 1..=12 {
            let labels = dendro.cut(k).unwrap();
            assert_eq!(*labels.iter().max().unwrap() + 1, k);
        }
    }

    #[test]
    fn test_cut_inconsistent_merges() {
        log_init_test();
        let merge = |a, b| Merge { leaf_a: a, leaf_b: b, height: 1. };
        let dendro = Dendrogram {
            nb_points: 3,
            merges: vec![merge(0, 1), merge(1, 0)],
        };
        assert_eq!(dendro.cut(2).unwrap(), vec![0, 0, 1]);
        assert!(dendro.cut(1).is_err());
    }

    #[test]
    fn test_single_linkage_heights() {
        log_init_test();
        // points on a line at 0, 1, 3, 7
        let data = Array2::from_shape_vec((4, 1), vec![0., 1., 3., 7.]).unwrap();
        let dendro = Dendrogram::new(&data.view(), Affinity::Euclidean, Linkage::Single).unwrap();
        let heights: Vec<f64> = dendro.get_merges().iter().map(|m| m.height).collect();
        assert_eq!(heights, vec![1., 2., 4.]);
        let dendro = Dendrogram::new(&data.view(), Affinity::Euclidean, Linkage::Complete).unwrap();
        let heights: Vec<f64> = dendro.get_merges().iter().map(|m| m.height).collect();
        assert_eq!(heights, vec![1., 3., 7.]);
    }

    #[test]
    fn test_ward_needs_euclidean() {
        log_init_test();
        let data = blobs();
        assert!(Dendrogram::new(&data.view(), Affinity::Cosine, Linkage::Ward).is_err());
        assert!(Dendrogram::new(&data.view(), Affinity::Cosine, Linkage::Average).is_ok());
        assert_eq!("Ward".parse::<Linkage>().unwrap(), Linkage::Ward);
        assert!("median".parse::<Linkage>().is_err());
    }
} // end of mod tests
