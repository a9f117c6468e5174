//! Agreement scores between two partitions of the same set of points.
//!
//! - [adjusted_mutual_info] with arithmetic normalization and exact expected mutual information
//! - [adjusted_rand_index]

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Contingency table of 2 labelings
pub struct Contingency {
    /// counts, row major, nb_rows x nb_cols
    counts: Vec<usize>,
    nb_rows: usize,
    nb_cols: usize,
    /// row sums
    a: Vec<usize>,
    /// column sums
    b: Vec<usize>,
    n: usize,
}

fn relabel(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut map = AHashMap::<usize, usize>::new();
    let relabeled = labels
        .iter()
        .map(|l| {
            let next = map.len();
            *map.entry(*l).or_insert(next)
        })
        .collect();
    (relabeled, map.len())
}

impl Contingency {
    pub fn new(labels_1: &[usize], labels_2: &[usize]) -> Self {
        assert_eq!(labels_1.len(), labels_2.len(), "labelings must have the same length");
        let (l1, nb_rows) = relabel(labels_1);
        let (l2, nb_cols) = relabel(labels_2);
        let mut counts = vec![0usize; nb_rows * nb_cols];
        let mut a = vec![0usize; nb_rows];
        let mut b = vec![0usize; nb_cols];
        for (i, j) in l1.iter().zip(l2.iter()) {
            counts[i * nb_cols + j] += 1;
            a[*i] += 1;
            b[*j] += 1;
        }
        Contingency {
            counts,
            nb_rows,
            nb_cols,
            a,
            b,
            n: labels_1.len(),
        }
    }

    pub fn get_shape(&self) -> (usize, usize) {
        (self.nb_rows, self.nb_cols)
    }

    pub fn get(&self, i: usize, j: usize) -> usize {
        self.counts[i * self.nb_cols + j]
    }

    /// mutual information in nats
    pub fn mutual_info(&self) -> f64 {
        let n = self.n as f64;
        let mut mi = 0.;
        for i in 0..self.nb_rows {
            for j in 0..self.nb_cols {
                let nij = self.get(i, j);
                if nij > 0 {
                    let nij = nij as f64;
                    mi += nij / n * (n * nij / (self.a[i] as f64 * self.b[j] as f64)).ln();
                }
            }
        }
        mi.max(0.)
    }

    /// expected mutual information of random partitions having the same cluster sizes
    pub fn expected_mutual_info(&self) -> f64 {
        let n = self.n;
        let nf = n as f64;
        // ln(k!) for k in 0..=n
        let mut lnfact = vec![0.; n + 1];
        for k in 1..=n {
            lnfact[k] = lnfact[k - 1] + (k as f64).ln();
        }
        let mut emi = 0.;
        for ai in self.a.iter() {
            for bj in self.b.iter() {
                let (ai, bj) = (*ai, *bj);
                let start = (ai + bj).saturating_sub(n).max(1);
                let end = ai.min(bj);
                let fixed = lnfact[ai] + lnfact[bj] + lnfact[n - ai] + lnfact[n - bj] - lnfact[n];
                for nij in start..=end {
                    let nijf = nij as f64;
                    let term1 = nijf / nf * (nf * nijf / (ai as f64 * bj as f64)).ln();
                    let lnp = fixed - lnfact[nij] - lnfact[ai - nij] - lnfact[bj - nij] - lnfact[n + nij - ai - bj];
                    emi += term1 * lnp.exp();
                }
            }
        }
        emi
    } // end of expected_mutual_info

    fn entropy_of(sums: &[usize], n: usize) -> f64 {
        let n = n as f64;
        -sums
            .iter()
            .filter(|c| **c > 0)
            .map(|c| {
                let p = *c as f64 / n;
                p * p.ln()
            })
            .sum::<f64>()
    }

    /// (entropy of first labeling, entropy of second labeling)
    pub fn entropies(&self) -> (f64, f64) {
        (Self::entropy_of(&self.a, self.n), Self::entropy_of(&self.b, self.n))
    }
} // end of impl Contingency

/// Adjusted mutual information, arithmetic normalization:
///
/// $$ AMI(U,V) = \frac{MI(U,V) - E[MI(U,V)]}{\frac{1}{2}(H(U) + H(V)) - E[MI(U,V)]} $$
///
/// The expectation is computed exactly under the hypergeometric model of random
/// partitions with fixed cluster sizes.
/// Returns 1. when both labelings have at most one cluster.
#[cfg_attr(doc, katexit::katexit)]
pub fn adjusted_mutual_info(labels_1: &[usize], labels_2: &[usize]) -> f64 {
    let contingency = Contingency::new(labels_1, labels_2);
    let (nb_rows, nb_cols) = contingency.get_shape();
    if nb_rows == nb_cols && nb_rows <= 1 {
        return 1.;
    }
    let mi = contingency.mutual_info();
    let emi = contingency.expected_mutual_info();
    let (h1, h2) = contingency.entropies();
    let normalizer = 0.5 * (h1 + h2);
    let mut denominator = normalizer - emi;
    if denominator < 0. {
        denominator = denominator.min(-f64::EPSILON);
    } else {
        denominator = denominator.max(f64::EPSILON);
    }
    (mi - emi) / denominator
} // end of adjusted_mutual_info

fn comb2(k: usize) -> f64 {
    let k = k as f64;
    k * (k - 1.) / 2.
}

/// Adjusted Rand index
///
/// $$ ARI = \frac{\sum_{ij} \binom{n_{ij}}{2} - E}{\frac{1}{2}\left[\sum_i \binom{a_i}{2} + \sum_j \binom{b_j}{2}\right] - E}
///  \quad E = \sum_i \binom{a_i}{2} \sum_j \binom{b_j}{2} / \binom{n}{2} $$
///
/// Returns 1. when the pair counting is degenerate
/// (all points in one cluster or all points in singletons in both labelings).
#[cfg_attr(doc, katexit::katexit)]
pub fn adjusted_rand_index(labels_1: &[usize], labels_2: &[usize]) -> f64 {
    let contingency = Contingency::new(labels_1, labels_2);
    if contingency.n <= 1 {
        return 1.;
    }
    let sum_ij: f64 = contingency.counts.iter().map(|c| comb2(*c)).sum();
    let sum_a: f64 = contingency.a.iter().map(|c| comb2(*c)).sum();
    let sum_b: f64 = contingency.b.iter().map(|c| comb2(*c)).sum();
    let expected = sum_a * sum_b / comb2(contingency.n);
    let max_index = 0.5 * (sum_a + sum_b);
    if max_index == expected {
        return 1.;
    }
    (sum_ij - expected) / (max_index - expected)
}

/// agreement scores available
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AgreementMetric {
    #[default]
    AdjustedMutualInfo,
    AdjustedRand,
}

impl AgreementMetric {
    pub fn score(&self, labels_1: &[usize], labels_2: &[usize]) -> f64 {
        match self {
            AgreementMetric::AdjustedMutualInfo => adjusted_mutual_info(labels_1, labels_2),
            AgreementMetric::AdjustedRand => adjusted_rand_index(labels_1, labels_2),
        }
    }
}

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_identical_and_permuted() {
        let l1 = vec![0, 0, 1, 1, 2, 2, 2];
        let l2 = vec![5, 5, 3, 3, 9, 9, 9];
        assert!((adjusted_mutual_info(&l1, &l1) - 1.).abs() < 1.0e-10);
        assert!((adjusted_mutual_info(&l1, &l2) - 1.).abs() < 1.0e-10);
        assert!((adjusted_rand_index(&l1, &l2) - 1.).abs() < 1.0e-10);
    }

    #[test]
    fn test_degenerate() {
        let ones = vec![0; 6];
        assert_eq!(adjusted_mutual_info(&ones, &ones), 1.);
        assert_eq!(adjusted_rand_index(&ones, &ones), 1.);
        let singletons: Vec<usize> = (0..6).collect();
        assert_eq!(adjusted_rand_index(&singletons, &singletons), 1.);
        // one cluster against anything else has zero information
        let l2 = vec![0, 0, 0, 1, 1, 1];
        assert!(adjusted_mutual_info(&ones, &l2).abs() < 1.0e-10);
        assert!(adjusted_rand_index(&ones, &l2).abs() < 1.0e-10);
    }

    #[test]
    fn test_known_values() {
        // values checked against a reference implementation
        let l1 = vec![0, 0, 0, 1, 1, 1];
        let l2 = vec![0, 0, 1, 1, 2, 2];
        let ari = adjusted_rand_index(&l1, &l2);
        assert!((ari - 0.24242424242424243).abs() < 1.0e-10, "ari {}", ari);
        let ami = adjusted_mutual_info(&l1, &l2);
        assert!((ami - 0.29879245817089006).abs() < 1.0e-6, "ami {}", ami);
        // symetry
        assert!((adjusted_mutual_info(&l2, &l1) - ami).abs() < 1.0e-12);
    }

    #[test]
    fn test_contingency() {
        let c = Contingency::new(&[1, 1, 2, 2], &[0, 1, 0, 1]);
        assert_eq!(c.get_shape(), (2, 2));
        assert_eq!(c.get(0, 0), 1);
        assert!(c.mutual_info().abs() < 1.0e-12);
        let (h1, h2) = c.entropies();
        assert!((h1 - 2f64.ln()).abs() < 1.0e-12);
        assert!((h2 - 2f64.ln()).abs() < 1.0e-12);
    }
} // end of mod tests
