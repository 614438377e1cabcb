//! Input discovery and output naming.

use std::path::{Path, PathBuf};

use log::{info, warn};
use walkdir::WalkDir;

use crate::Error;

/// Extension of the files picked up from the input directory.
pub const INPUT_EXTENSION: &str = "wav";

/// List the WAV files directly inside `dir`, sorted by file name.
///
/// Subdirectories are not descended into. Entries that cannot be read are
/// logged and left out.
pub fn find_wav_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if !dir.is_dir() {
        return Err(Error::MissingInputDirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_wav(entry.path()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(err) => warn!("ignoring unreadable entry in '{}': {err}", dir.display()),
        }
    }

    info!("found {} WAV file(s) in '{}'", files.len(), dir.display());
    Ok(files)
}

/// Output path for `input`: same location and stem, `extension` substituted.
pub fn output_path(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(INPUT_EXTENSION))
        .unwrap_or(false)
}
