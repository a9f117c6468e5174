//! Small dense linear algebra : symetric eigen decomposition, rank, distances.
//!
//! Matrices handled here are small (dimension of latent space, at most a few hundreds)
//! so we use cyclic Jacobi rotations.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use rayon::prelude::*;

/// threshold for the sum of squares of off diagonal terms, relative to the frobenius norm
const JACOBI_EPSIL: f64 = 1.0e-22;

const JACOBI_MAX_SWEEP: usize = 100;

/// Eigen decomposition of a symetric matrix.
/// Returns eigenvalues in decreasing order and eigenvectors as columns of the returned matrix.
pub fn symetric_eigen(mat: &ArrayView2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = mat.nrows();
    assert_eq!(n, mat.ncols(), "symetric_eigen expects a square matrix");
    let mut a = mat.to_owned();
    let mut v = Array2::<f64>::eye(n);
    let norm2: f64 = a.iter().map(|x| x * x).sum();
    let mut nb_sweep = 0;
    loop {
        let mut off = 0.;
        for i in 0..n {
            for j in (i + 1)..n {
                off += a[[i, j]] * a[[i, j]];
            }
        }
        if off <= JACOBI_EPSIL * norm2 || nb_sweep >= JACOBI_MAX_SWEEP {
            if nb_sweep >= JACOBI_MAX_SWEEP {
                log::warn!("symetric_eigen : no convergence after {} sweeps, off diagonal : {:.3e}", nb_sweep, off);
            }
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0. {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2. * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.).sqrt());
                let t = if theta == 0. { 1. } else { t };
                let c = 1. / (t * t + 1.).sqrt();
                let s = t * c;
                // rotate rows and columns p, q
                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
        nb_sweep += 1;
    }
    // sort in decreasing order
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|i, j| a[[*j, *j]].partial_cmp(&a[[*i, *i]]).unwrap_or(std::cmp::Ordering::Equal));
    let eigenvalues = Array1::from_iter(order.iter().map(|i| a[[*i, *i]]));
    let eigenvectors = v.select(Axis(1), &order);
    (eigenvalues, eigenvectors)
} // end of symetric_eigen

/// singular values of mat (in decreasing order) from the eigenvalues of the Gram matrix
pub fn singular_values(mat: &ArrayView2<f64>) -> Array1<f64> {
    let gram = if mat.nrows() >= mat.ncols() {
        mat.t().dot(mat)
    } else {
        mat.dot(&mat.t())
    };
    let (eigenvalues, _) = symetric_eigen(&gram.view());
    eigenvalues.mapv(|x| x.max(0.).sqrt())
}

/// number of singular values above tol
pub fn matrix_rank(mat: &ArrayView2<f64>, tol: f64) -> usize {
    if mat.is_empty() {
        return 0;
    }
    singular_values(mat).iter().filter(|s| **s > tol).count()
}

/// subtract column means
pub fn center_columns(mat: &ArrayView2<f64>) -> Array2<f64> {
    let nrows = mat.nrows().max(1) as f64;
    let mean = mat.sum_axis(Axis(0)) / nrows;
    mat.to_owned() - &mean.insert_axis(Axis(0))
}

pub fn l2_dist(v1: &ArrayView1<f64>, v2: &ArrayView1<f64>) -> f64 {
    v1.iter().zip(v2.iter()).map(|(a, b)| (a - b) * (a - b)).sum::<f64>().sqrt()
}

/// full matrix of euclidean distances between rows of data
pub fn pairwise_l2(data: &ArrayView2<f64>) -> Array2<f64> {
    let n = data.nrows();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| (0..n).map(|j| l2_dist(&data.row(i), &data.row(j))).collect())
        .collect();
    let mut dist = Array2::<f64>::zeros((n, n));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, d) in row.into_iter().enumerate() {
            dist[[i, j]] = d;
        }
    }
    dist
} // end of pairwise_l2

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_jacobi_eigen() {
        log_init_test();
        let mat = Array2::from_shape_vec((3, 3), vec![4., 1., 0., 1., 3., 1., 0., 1., 2.]).unwrap();
        let (values, vectors) = symetric_eigen(&mat.view());
        assert!(values[0] >= values[1] && values[1] >= values[2]);
        assert!((values.sum() - 9.).abs() < 1.0e-10);
        for k in 0..3 {
            let v = vectors.column(k);
            let av = mat.dot(&v);
            for i in 0..3 {
                assert!((av[i] - values[k] * v[i]).abs() < 1.0e-9);
            }
        }
    } // end of test_jacobi_eigen

    #[test]
    fn test_rank() {
        log_init_test();
        // third column is sum of first two
        let mat = Array2::from_shape_fn((5, 3), |(i, j)| match j {
            0 => i as f64,
            1 => (i * i) as f64,
            _ => (i + i * i) as f64,
        });
        assert_eq!(matrix_rank(&mat.view(), 1.0e-5), 2);
        assert_eq!(matrix_rank(&Array2::<f64>::eye(4).view(), 1.0e-5), 4);
        assert_eq!(matrix_rank(&Array2::<f64>::zeros((3, 2)).view(), 1.0e-5), 0);
    }

    #[test]
    fn test_pairwise_l2() {
        log_init_test();
        let data = Array2::from_shape_vec((3, 2), vec![0., 0., 3., 4., 0., 1.]).unwrap();
        let dist = pairwise_l2(&data.view());
        assert_eq!(dist[[0, 1]], 5.);
        assert_eq!(dist[[1, 0]], 5.);
        assert_eq!(dist[[0, 2]], 1.);
        assert_eq!(dist[[2, 2]], 0.);
        let centered = center_columns(&data.view());
        assert!(centered.sum_axis(Axis(0)).iter().all(|x| x.abs() < 1.0e-12));
    }
} // end of mod tests
