//! numeric helpers

pub mod linalg;
