//! Graph embedding training and stability analysis.
//!
//! - [graph] : graph samples, negative sampling and random link split
//! - [embed] : graph autoencoder and Node2Vec trainers, run for a list of seeds
//! - [stability] : agglomerative clustering of embeddings and agreement (AMI, ARI) screens
//! - [projection] and [plot] : 2d projections of latents and svg plots
//! - [transforms] : image transformation steps receiving per sample metadata
//! - [io] : csv input and output

use env_logger::Builder;

#[macro_use]
extern crate lazy_static;

lazy_static! {
    static ref LOG: u64 = init_log();
}

// install a logger facility, keeping one already installed
fn init_log() -> u64 {
    if Builder::from_default_env().try_init().is_ok() {
        println!("\n ************** initializing logger *****************\n");
    }
    1
}

/// initializes the logger once, later calls do nothing
pub fn log_init() {
    lazy_static::initialize(&LOG);
}

pub mod graph;

pub mod embed;

pub mod stability;

pub mod projection;

pub mod plot;

pub mod transforms;

pub mod io;

pub mod tools;

pub mod prelude;

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_log_init_twice() {
        let _ = env_logger::builder().is_test(true).try_init();
        log_init();
        log_init();
        assert_eq!(*LOG, 1);
        log::info!("logger still usable");
    }
} // end of mod tests
