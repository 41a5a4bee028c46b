use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use walkdir::{DirEntry, WalkDir};

use crate::{config::is_folder_config, config::DEFAULT_LOG_DIR, env::ENV_FILE_NAME};

const REQUEST_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

pub fn is_request_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| REQUEST_EXTENSIONS.contains(&ext))
        && !is_folder_config(path)
}

/// The directory a target belongs to: the target itself when it is a
/// directory, otherwise the nearest ancestor holding an environment file,
/// falling back to the file's own directory.
pub fn find_collection_root(target: &Path) -> Result<PathBuf> {
    let target = target
        .canonicalize()
        .with_context(|| format!("path not found: {}", target.display()))?;

    if target.is_dir() {
        return Ok(target);
    }

    let parent = target
        .parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("{} has no parent directory", target.display()))?;

    Ok(parent
        .ancestors()
        .find(|dir| dir.join(ENV_FILE_NAME).is_file())
        .map(Path::to_path_buf)
        .unwrap_or(parent))
}

/// Request files to run for `target`, in execution order.
pub fn discover_requests(target: &Path) -> Result<Vec<PathBuf>> {
    if target.is_file() {
        if !is_request_file(target) {
            bail!("{} is not a .yaml/.yml request file", target.display());
        }
        return Ok(vec![target.to_path_buf()]);
    }
    if !target.is_dir() {
        bail!("path not found: {}", target.display());
    }

    let mut requests = Vec::new();
    let walker = WalkDir::new(target)
        .sort_by(files_first)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry));

    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", target.display()))?;
        if entry.file_type().is_file() && is_request_file(entry.path()) {
            requests.push(entry.into_path());
        }
    }
    Ok(requests)
}

fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && name == DEFAULT_LOG_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "request:\n  url: http://x\n").unwrap();
    }

    #[test]
    fn walks_files_before_subdirectories_in_name_order() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path().canonicalize()?;
        for rel in [
            "b.yaml",
            "a.yml",
            "config.yaml",
            "notes.txt",
            "users/z.yaml",
            "users/config.yml",
            "users/admin/x.yaml",
            "auth/login.yaml",
            "logs/old.yaml",
            ".hidden/secret.yaml",
        ] {
            touch(&root.join(rel));
        }

        let found: Vec<_> = discover_requests(&root)?
            .into_iter()
            .map(|p| p.strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            found,
            vec![
                PathBuf::from("a.yml"),
                PathBuf::from("b.yaml"),
                PathBuf::from("auth/login.yaml"),
                PathBuf::from("users/z.yaml"),
                PathBuf::from("users/admin/x.yaml"),
            ]
        );
        Ok(())
    }

    #[test]
    fn single_file_target() -> Result<()> {
        let temp = tempdir()?;
        let file = temp.path().join("ping.yaml");
        touch(&file);
        assert_eq!(discover_requests(&file)?, vec![file]);

        let other = temp.path().join("readme.md");
        fs::write(&other, "# hi")?;
        assert!(discover_requests(&other).is_err());
        Ok(())
    }

    #[test]
    fn root_of_file_target_is_nearest_env_ancestor() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path().canonicalize()?;
        fs::write(root.join(ENV_FILE_NAME), "A=1\n")?;
        let file = root.join("users/admin/create.yaml");
        touch(&file);

        assert_eq!(find_collection_root(&file)?, root);
        assert_eq!(find_collection_root(&root)?, root);
        Ok(())
    }

    #[test]
    fn root_falls_back_to_file_directory() -> Result<()> {
        let temp = tempdir()?;
        let file = temp.path().join("loose/ping.yaml");
        touch(&file);
        let expected = temp.path().join("loose").canonicalize()?;
        let root = find_collection_root(&file)?;
        // an environment file above the temp dir would change the answer
        if !root.starts_with(temp.path().canonicalize()?) {
            return Ok(());
        }
        assert_eq!(root, expected);
        Ok(())
    }

    #[test]
    fn missing_target_is_an_error() {
        assert!(find_collection_root(Path::new("/definitely/not/here")).is_err());
    }
}
