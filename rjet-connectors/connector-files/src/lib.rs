#[macro_use]
extern crate log;

pub mod read;
pub mod stream;

use std::fs;
use std::path::{Path, PathBuf};

use rjet_core::utils::glob::glob_match;
use rjet_core::Result;

pub use read::read_files;
pub use stream::stream_files;

/// Regular files directly in `directory` whose name matches `glob`, by name
pub(crate) fn list_files(directory: &Path, glob: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let matched = entry
            .file_name()
            .to_str()
            .map(|name| glob_match(glob, name))
            .unwrap_or(false);
        if matched {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
