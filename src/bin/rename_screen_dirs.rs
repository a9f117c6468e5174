//! renames each directory of a screen holding a yml file after that file
//! example usage:
//! rename_screen_dirs --root_dir "screens/ppi"
//!
//! a directory screens/ppi/run_0 holding gae_ppi.yml becomes screens/ppi/gae_ppi

use clap::{Arg, Command};
use std::path::Path;

use graphstab::io::files::rename_screen_dirs;

pub fn main() {
    //
    graphstab::log_init();
    log::info!("logger initialized");
    //
    let matches = Command::new("rename_screen_dirs")
        .arg_required_else_help(true)
        .arg(Arg::new("root_dir")
            .long("root_dir")
            .takes_value(true)
            .required(true)
            .help("directory searched recursively for yml files"))
    .get_matches();
    //
    let root_dir = match matches.value_of("root_dir") {
        Some(str) if !str.is_empty() => str,
        _ => {
            log::error!("parsing of root_dir failed");
            std::process::exit(1);
        }
    };
    log::info!("root dir : {:?}", root_dir);
    match rename_screen_dirs(Path::new(root_dir)) {
        Ok(renamed) => log::info!("{} directories processed", renamed.len()),
        Err(e) => {
            log::error!("error : {:?}", e);
            std::process::exit(1);
        }
    }
} // end of main
