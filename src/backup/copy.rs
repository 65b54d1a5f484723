//! Source enumeration and the bounded parallel copy used by backup and restore

use crate::{Error, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A regular file to copy and where it lands below the destination root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyEntry {
    pub source: PathBuf,
    pub relative: PathBuf,
    pub size: u64,
}

/// Enumerate every regular file under `sources`.
///
/// A file source lands at its own name; a directory source keeps its name as
/// the top-level directory. Fails before anything is copied if a source is
/// missing or two different files would land on the same relative path.
pub fn plan_sources(sources: &[PathBuf]) -> Result<Vec<CopyEntry>> {
    let mut entries = Vec::new();
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

    for source in sources {
        let source = match fs::canonicalize(source) {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::SourceNotFound {
                    path: source.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let name = source.file_name().ok_or_else(|| Error::Configuration {
            reason: format!("cannot back up filesystem root {}", source.display()),
        })?;

        let planned = if source.is_dir() {
            plan_tree(&source, Path::new(name))?
        } else {
            vec![CopyEntry {
                size: fs::metadata(&source)?.len(),
                relative: PathBuf::from(name),
                source: source.clone(),
            }]
        };

        for entry in planned {
            match claimed.get(&entry.relative) {
                Some(existing) if *existing == entry.source => {
                    debug!("Source listed twice: {}", entry.source.display());
                }
                Some(existing) => {
                    return Err(Error::Configuration {
                        reason: format!(
                            "{} and {} would both be stored as {}",
                            existing.display(),
                            entry.source.display(),
                            entry.relative.display()
                        ),
                    })
                }
                None => {
                    claimed.insert(entry.relative.clone(), entry.source.clone());
                    entries.push(entry);
                }
            }
        }
    }

    Ok(entries)
}

/// Enumerate regular files under `root`, placing them below `prefix`.
/// Symbolic links are not followed.
pub fn plan_tree(root: &Path, prefix: &Path) -> Result<Vec<CopyEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::Configuration {
                reason: format!("{} escapes {}", entry.path().display(), root.display()),
            })?;
        let size = entry.metadata()?.len();
        entries.push(CopyEntry {
            relative: prefix.join(relative),
            source: entry.into_path(),
            size,
        });
    }
    Ok(entries)
}

/// Copy `entries` below `dest_root` using at most `concurrency` threads.
/// Stops at the first failure.
pub fn copy_files(entries: &[CopyEntry], dest_root: &Path, concurrency: usize) -> Result<()> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|i| format!("nova-copy-{}", i))
        .build()
        .map_err(|e| Error::Configuration {
            reason: format!("cannot start copy pool: {}", e),
        })?;

    pool.install(|| {
        entries
            .par_iter()
            .try_for_each(|entry| copy_one(entry, dest_root))
    })
}

fn copy_one(entry: &CopyEntry, dest_root: &Path) -> Result<()> {
    let dest = dest_root.join(&entry.relative);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    copy_file(&entry.source, &dest)?;
    debug!("Copied {} -> {}", entry.source.display(), dest.display());
    Ok(())
}

/// Copy one file, keeping its modification time. Permission bits travel with
/// the copy, so the timestamp is set through a read-only handle.
pub fn copy_file(source: &Path, dest: &Path) -> Result<u64> {
    let bytes = fs::copy(source, dest)?;
    let modified = fs::metadata(source)?.modified()?;
    File::open(dest)?.set_modified(modified)?;
    Ok(bytes)
}
