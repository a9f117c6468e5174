//! Principal component analysis by eigen decomposition of the covariance matrix.

use anyhow::anyhow;
use ndarray::{s, Array1, Array2, ArrayView2};

use crate::tools::linalg::{center_columns, symetric_eigen};

/// result of a pca : principal axes as columns and the variance they explain
pub struct Pca {
    pub components: Array2<f64>,
    pub explained_variance: Array1<f64>,
    pub mean: Array1<f64>,
}

impl Pca {
    /// computes the nb_components first principal axes of the rows of data
    pub fn fit(data: &ArrayView2<f64>, nb_components: usize) -> anyhow::Result<Self> {
        let (nb_rows, dim) = data.dim();
        if nb_rows < 2 {
            return Err(anyhow!("pca needs at least 2 points, got {}", nb_rows));
        }
        let centered = center_columns(data);
        let cov = centered.t().dot(&centered) / (nb_rows - 1) as f64;
        let (values, vectors) = symetric_eigen(&cov.view());
        let kept = nb_components.min(dim);
        let mut components = Array2::<f64>::zeros((dim, nb_components));
        components.slice_mut(s![.., 0..kept]).assign(&vectors.slice(s![.., 0..kept]));
        // sign convention : largest loading of each axis is positive
        for k in 0..kept {
            let mut col = components.column_mut(k);
            let mut imax = 0;
            for i in 0..dim {
                if col[i].abs() > col[imax].abs() {
                    imax = i;
                }
            }
            if col[imax] < 0. {
                col.mapv_inplace(|x| -x);
            }
        }
        let mut explained_variance = Array1::<f64>::zeros(nb_components);
        explained_variance
            .slice_mut(s![0..kept])
            .assign(&values.slice(s![0..kept]).mapv(|x| x.max(0.)));
        let mean = data
            .mean_axis(ndarray::Axis(0))
            .ok_or_else(|| anyhow!("Pca::fit : empty data"))?;
        Ok(Pca {
            components,
            explained_variance,
            mean,
        })
    } // end of fit

    /// coordinates of rows of data on principal axes
    pub fn transform(&self, data: &ArrayView2<f64>) -> Array2<f64> {
        (data.to_owned() - &self.mean.view().insert_axis(ndarray::Axis(0))).dot(&self.components)
    }
} // end of impl Pca

/// coordinates of data on its 2 first principal axes
pub fn pca_2d(data: &ArrayView2<f64>) -> anyhow::Result<Array2<f64>> {
    let pca = Pca::fit(data, 2)?;
    Ok(pca.transform(data))
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_pca_line() {
        // points along direction (1, 1, 0) with a small orthogonal noise
        let n = 20;
        let data = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 | 1 => i as f64,
            // pattern + - - + is uncorrelated with i
            _ => if i % 4 == 0 || i % 4 == 3 { 0.1 } else { -0.1 },
        });
        let pca = Pca::fit(&data.view(), 2).unwrap();
        let axis = pca.components.column(0);
        let inv_sqrt2 = 1. / 2f64.sqrt();
        assert!((axis[0] - inv_sqrt2).abs() < 1.0e-8);
        assert!((axis[1] - inv_sqrt2).abs() < 1.0e-8);
        assert!(pca.explained_variance[0] > pca.explained_variance[1]);
        let proj = pca_2d(&data.view()).unwrap();
        assert_eq!(proj.dim(), (n, 2));
        assert!(proj.column(0).sum().abs() < 1.0e-8);
        // one dimensional data : second column is zero
        let line = Array2::from_shape_fn((5, 1), |(i, _)| i as f64);
        let proj = pca_2d(&line.view()).unwrap();
        assert!(proj.column(1).iter().all(|x| *x == 0.));
    }
}
