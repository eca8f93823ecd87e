//! Backup archives of the published canonical dataset

use crate::error::{Result, TabmergeError};
use crate::progress::create_file_progress;
use std::fs::File;
use std::path::Path;
use tar::{Archive, Builder};
use walkdir::WalkDir;
use zstd::{Decoder, Encoder};

/// Creates and inspects `.tar.zst` backups of a dataset directory
pub struct ArchiveManager;

impl ArchiveManager {
    /// Archive every file below `source` into `archive_path`, paths relative to `source`
    pub fn archive_directory(
        source: &Path,
        archive_path: &Path,
        show_progress: bool,
    ) -> Result<ArchiveStats> {
        if !source.is_dir() {
            return Err(TabmergeError::archive(format!(
                "Cannot archive {}: not a directory",
                source.display()
            )));
        }
        if let Some(parent) = archive_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        let total_size: u64 = files
            .iter()
            .filter_map(|p| p.metadata().ok())
            .map(|m| m.len())
            .sum();
        let progress =
            create_file_progress(total_size, "Backing up canonical dataset", show_progress);

        let archive_file = File::create(archive_path)?;
        let mut encoder = Encoder::new(archive_file, 3)?;
        {
            let mut tar_builder = Builder::new(&mut encoder);
            let mut processed = 0u64;

            for path in &files {
                let relative = path.strip_prefix(source).map_err(|e| {
                    TabmergeError::archive(format!("{}: {}", path.display(), e))
                })?;
                tar_builder.append_path_with_name(path, relative)?;

                processed += path.metadata().map(|m| m.len()).unwrap_or(0);
                progress.set_position(processed);
            }

            tar_builder.finish()?;
        }
        encoder.finish()?;

        progress.finish_and_clear();

        let compressed_size = std::fs::metadata(archive_path)?.len();
        log::info!(
            "Archived {} files from {} to {}",
            files.len(),
            source.display(),
            archive_path.display()
        );

        Ok(ArchiveStats {
            compressed_size,
            uncompressed_size: total_size,
            file_count: files.len(),
        })
    }

    /// List files in an archive without extracting
    pub fn list_archive_contents(archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
        let archive_file = File::open(archive_path)?;
        let mut decoder = Decoder::new(archive_file)?;
        let mut archive = Archive::new(&mut decoder);

        let mut entries = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            entries.push(ArchiveEntry {
                path: entry.path()?.to_string_lossy().to_string(),
                size: entry.header().size()?,
            });
        }

        Ok(entries)
    }
}

/// Information about a file in an archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub size: u64,
}

/// Statistics about a created archive
#[derive(Debug, Clone, Copy)]
pub struct ArchiveStats {
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_count: usize,
}
