//! Recursive file listing and renaming of screen result directories.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use walkdir::WalkDir;

/// Lists recursively files under root whose name ends with extension (without dot, ex "yml").
/// Paths are absolute, sorted by walk order.
pub fn get_file_list(root: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    let root = match root.canonicalize() {
        Ok(root) => root,
        Err(e) => {
            log::error!("get_file_list cannot access {:?}", root);
            return Err(anyhow!("cannot access {} : {}", root.display(), e));
        }
    };
    let mut files = Vec::<PathBuf>::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.path().extension() {
            Some(ext) if ext == extension => files.push(entry.into_path()),
            _ => {}
        }
    }
    log::info!("get_file_list : {} files with extension {} under {:?}", files.len(), extension, root);
    Ok(files)
}

/// For each yml file found under root, renames its parent directory to root/<file stem>.
/// The file list is collected before any rename. Returns the new directory paths.
pub fn rename_screen_dirs(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let files = get_file_list(root, "yml")?;
    let root = root.canonicalize()?;
    let mut renamed = Vec::<PathBuf>::with_capacity(files.len());
    for file in &files {
        let parent = match file.parent() {
            Some(parent) => parent,
            None => return Err(anyhow!("file {} has no parent directory", file.display())),
        };
        let stem = match file.file_stem() {
            Some(stem) => stem,
            None => return Err(anyhow!("file {} has no name", file.display())),
        };
        let target = root.join(stem);
        if target == parent {
            log::debug!("{:?} already named after its yml file", parent);
            renamed.push(target);
            continue;
        }
        log::info!("renaming {:?} to {:?}", parent, target);
        if let Err(e) = std::fs::rename(parent, &target) {
            log::error!("rename of {:?} to {:?} failed : {}", parent, target, e);
            return Err(anyhow!("rename of {} to {} failed : {}", parent.display(), target.display(), e));
        }
        renamed.push(target);
    }
    Ok(renamed)
} // end of rename_screen_dirs

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_list_and_rename() {
        log_init_test();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (sub, name) in [("run_0", "gae_ppi.yml"), ("run_1", "n2v_ppi.yml")] {
            std::fs::create_dir(root.join(sub)).unwrap();
            std::fs::write(root.join(sub).join(name), "seed: 0\n").unwrap();
            std::fs::write(root.join(sub).join("ami.csv"), "1\n").unwrap();
        }
        let files = get_file_list(root, "yml").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.is_absolute()));
        //
        let renamed = rename_screen_dirs(root).unwrap();
        assert_eq!(renamed.len(), 2);
        assert!(root.join("gae_ppi").join("gae_ppi.yml").exists());
        assert!(root.join("n2v_ppi").join("ami.csv").exists());
        assert!(!root.join("run_0").exists());
        // second pass finds directories already renamed
        assert_eq!(rename_screen_dirs(root).unwrap().len(), 2);
        assert!(get_file_list(&root.join("missing"), "yml").is_err());
    }
} // end of mod tests
