//! 2 dimensional projections of latent vectors for visualization.
//!
//! - [pca] : principal axes from the covariance eigen decomposition
//! - [mds] : metric MDS by SMACOF
//! - [tsne] : exact t-SNE

pub mod mds;
pub mod pca;
pub mod tsne;
