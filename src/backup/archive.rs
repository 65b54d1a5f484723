//! Zip archive creation, extraction and integrity checks

use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Entry totals of an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub bytes: u64,
}

/// Result of reading every entry of an archive back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveCheck {
    pub stats: ArchiveStats,
    pub errors: Vec<String>,
}

/// Compress every regular file under `dir` into a deflate zip at `archive_path`.
///
/// The archive is written next to its final location and renamed into place
/// once complete, so a failed run never leaves a truncated `.zip` behind.
pub fn create_archive(dir: &Path, archive_path: &Path) -> Result<ArchiveStats> {
    let partial = archive_path.with_extension("zip.partial");
    let result = write_archive(dir, &partial);
    match result {
        Ok(stats) => {
            fs::rename(&partial, archive_path)?;
            debug!(
                "Archived {} files ({} bytes) into {}",
                stats.files,
                stats.bytes,
                archive_path.display()
            );
            Ok(stats)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&partial) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!("Cannot remove {}: {}", partial.display(), cleanup);
                }
            }
            Err(e)
        }
    }
}

fn write_archive(dir: &Path, target: &Path) -> Result<ArchiveStats> {
    let mut writer = ZipWriter::new(BufWriter::new(File::create(target)?));
    let mut stats = ArchiveStats::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry_name(dir, entry.path())?;
        let size = entry.metadata()?.len();
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= u64::from(u32::MAX));

        writer.start_file(name, options)?;
        let mut source = File::open(entry.path())?;
        io::copy(&mut source, &mut writer)?;

        stats.files += 1;
        stats.bytes += size;
    }

    let mut inner = writer.finish()?;
    inner.flush()?;
    inner.get_ref().sync_all()?;
    Ok(stats)
}

/// Forward-slash relative name of `path` below `dir`
fn entry_name(dir: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(dir).map_err(|_| Error::Configuration {
        reason: format!("{} is not below {}", path.display(), dir.display()),
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

/// Unpack `archive_path` into `dest`, which must already exist
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<ArchiveStats> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(archive_path)?))?;

    let mut stats = ArchiveStats::default();
    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        stats.files += 1;
        stats.bytes += file.size();
    }

    archive.extract(dest)?;
    Ok(stats)
}

/// Read every entry back, collecting checksum and decode failures.
///
/// Fails only if the archive itself cannot be opened.
pub fn verify_archive(archive_path: &Path) -> Result<ArchiveCheck> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(archive_path)?))?;
    let mut check = ArchiveCheck::default();

    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                check.errors.push(format!("entry #{}: {}", index, e));
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let size = file.size();
        match io::copy(&mut file, &mut io::sink()) {
            Ok(_) => {
                check.stats.files += 1;
                check.stats.bytes += size;
            }
            Err(e) => check.errors.push(format!("{}: {}", name, e)),
        }
    }

    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) -> Result<()> {
        fs::create_dir_all(root.join("docs").join("old"))?;
        fs::write(root.join("top.txt"), "top level")?;
        fs::write(root.join("docs").join("a.txt"), "alpha")?;
        fs::write(root.join("docs").join("old").join("b.txt"), "beta")?;
        Ok(())
    }

    #[test]
    fn test_create_and_extract() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        sample_tree(&src)?;

        let archive = temp_dir.path().join("out.zip");
        let stats = create_archive(&src, &archive)?;
        assert_eq!(stats, ArchiveStats { files: 3, bytes: 18 });
        assert!(!temp_dir.path().join("out.zip.partial").exists());

        let dest = temp_dir.path().join("dest");
        fs::create_dir_all(&dest)?;
        assert_eq!(extract_archive(&archive, &dest)?, stats);
        assert_eq!(fs::read_to_string(dest.join("docs").join("old").join("b.txt"))?, "beta");
        assert_eq!(fs::read_to_string(dest.join("top.txt"))?, "top level");
        Ok(())
    }

    #[test]
    fn test_entry_names_use_forward_slashes() -> Result<()> {
        let dir = Path::new("/data/staging");
        let name = entry_name(dir, &dir.join("docs").join("old").join("b.txt"))?;
        assert_eq!(name, "docs/old/b.txt");
        Ok(())
    }

    #[test]
    fn test_verify_clean_archive() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        sample_tree(&src)?;
        let archive = temp_dir.path().join("out.zip");
        create_archive(&src, &archive)?;

        let check = verify_archive(&archive)?;
        assert!(check.errors.is_empty());
        assert_eq!(check.stats.files, 3);
        Ok(())
    }

    #[test]
    fn test_verify_unreadable_archive() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let bogus = temp_dir.path().join("bogus.zip");
        fs::write(&bogus, "definitely not a zip file")?;
        assert!(verify_archive(&bogus).is_err());
        Ok(())
    }
}
