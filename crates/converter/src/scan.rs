use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use log::{debug, info, warn};
use crate::error::{ConvertError, Result};

/// Extension of the files we convert, compared case-insensitively
const INPUT_EXTENSION: &str = "mp4";

/// Whether paths differing only in case name the same file on this platform
pub fn filesystem_folds_case() -> bool {
    cfg!(any(windows, target_os = "macos"))
}

/// Key used to detect duplicate inputs
pub fn normalize_case(path: &Path, fold_case: bool) -> PathBuf {
    if fold_case {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path.to_path_buf()
    }
}

/// Drop later paths whose normalized form was already seen, keeping order
pub fn dedupe_paths(paths: Vec<PathBuf>, fold_case: bool) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| {
            let keep = seen.insert(normalize_case(p, fold_case));
            if !keep {
                debug!("Skipping duplicate input: {}", p.display());
            }
            keep
        })
        .collect()
}

fn is_input_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(INPUT_EXTENSION))
        .unwrap_or(false)
}

/// Find `*.mp4` files (any case) directly inside `dir`, sorted by name and
/// deduplicated by case-normalized path
pub fn discover_inputs(dir: &Path, fold_case: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConvertError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Input directory does not exist: {}", dir.display()),
        )));
    }

    info!("Scanning directory: {}", dir.display());

    let mut found = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_file() && is_input_file(path) {
            found.push(path.to_path_buf());
        }
    }

    Ok(dedupe_paths(found, fold_case))
}

/// `<output_dir>/<prefix><original file name>`
pub fn output_path_for(input: &Path, output_dir: &Path, prefix: &str) -> Option<PathBuf> {
    let name = input.file_name()?.to_string_lossy();
    Some(output_dir.join(format!("{}{}", prefix, name)))
}
