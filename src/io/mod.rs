//! csv input of graphs, csv output of results, file listing.

pub mod csv;
pub mod files;
