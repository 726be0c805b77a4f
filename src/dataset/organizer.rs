//! Archive extraction and two-bucket organization.
//!
//! An uploaded zip is extracted into a scratch directory (with safety limits
//! and traversal protection), nested zips are unpacked in place, and every
//! recognized audio file is moved into `safe/` or `danger/` buckets according
//! to the labeling policy. The buckets are then merged into the canonical
//! dataset by copying, so a failed training run never loses merged clips.

use std::fs::File;
use std::path::{Path, PathBuf};

use super::{
    ClipLabel, DANGER_DIR_NAME, DatasetError, SAFE_DIR_NAME, classify_clip, count_audio_files,
    is_audio_file, resolve_destination,
};

const MAX_ZIP_ENTRIES: usize = 10_000;
const MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES: u64 = 512 * 1024 * 1024;
const MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES: u64 = 2 * 1024 * 1024 * 1024;
const MAX_ZIP_COMPRESSION_RATIO: u64 = 200;
/// How many rounds of nested-archive unpacking to attempt.
const MAX_NESTED_ROUNDS: usize = 3;

#[derive(Clone, Copy)]
struct ZipExtractionLimits {
    max_entries: usize,
    max_entry_uncompressed_bytes: u64,
    max_total_uncompressed_bytes: u64,
    max_compression_ratio: u64,
}

impl ZipExtractionLimits {
    fn standard() -> Self {
        Self {
            max_entries: MAX_ZIP_ENTRIES,
            max_entry_uncompressed_bytes: MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES,
            max_total_uncompressed_bytes: MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES,
            max_compression_ratio: MAX_ZIP_COMPRESSION_RATIO,
        }
    }
}

/// The organized two-bucket split produced from one upload.
#[derive(Debug, Clone)]
pub struct OrganizedSplit {
    pub safe_dir: PathBuf,
    pub danger_dir: PathBuf,
    pub safe_count: usize,
    pub danger_count: usize,
}

impl OrganizedSplit {
    /// Total number of organized audio files.
    pub fn total(&self) -> usize {
        self.safe_count + self.danger_count
    }
}

/// Files copied into the canonical dataset by a merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeStats {
    pub safe_copied: usize,
    pub danger_copied: usize,
}

/// Extract an archive and organize its audio members into `safe/`/`danger/`.
///
/// `extract_dir` is the scratch area; callers clear it between runs to keep
/// the operation idempotent. Returns the two populated bucket directories
/// with per-class counts.
pub fn extract_and_organize(
    zip_path: &Path,
    extract_dir: &Path,
) -> Result<OrganizedSplit, DatasetError> {
    std::fs::create_dir_all(extract_dir).map_err(|source| DatasetError::Io {
        path: extract_dir.to_path_buf(),
        source,
    })?;
    let safe_dir = extract_dir.join(SAFE_DIR_NAME);
    let danger_dir = extract_dir.join(DANGER_DIR_NAME);
    for dir in [&safe_dir, &danger_dir] {
        std::fs::create_dir_all(dir).map_err(|source| DatasetError::Io {
            path: dir.clone(),
            source,
        })?;
    }

    unzip_to_dir(zip_path, extract_dir, ZipExtractionLimits::standard())?;
    extract_nested_archives(extract_dir)?;

    let mut audio_files = Vec::new();
    collect_audio_files(extract_dir, &[&safe_dir, &danger_dir], &mut audio_files)?;

    for source in &audio_files {
        let file_name = match source.file_name().and_then(|name| name.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let parent = source
            .parent()
            .and_then(|dir| dir.file_name())
            .and_then(|name| name.to_str());
        let dest_dir = match classify_clip(parent, &file_name) {
            ClipLabel::Safe => &safe_dir,
            ClipLabel::Danger => &danger_dir,
        };
        let dest = resolve_destination(dest_dir, &file_name, source);
        move_file(source, &dest)?;
    }

    let split = OrganizedSplit {
        safe_count: count_audio_files(&safe_dir),
        danger_count: count_audio_files(&danger_dir),
        safe_dir,
        danger_dir,
    };
    tracing::info!(
        "Organized {} audio files ({} safe, {} danger) from {}",
        split.total(),
        split.safe_count,
        split.danger_count,
        zip_path.display()
    );
    Ok(split)
}

/// Copy an organized split into the canonical dataset root.
///
/// The merge is append-only: existing clips are never replaced, and name
/// collisions fall back to the timestamp-suffixed destination.
pub fn merge_into_dataset(
    split: &OrganizedSplit,
    data_root: &Path,
) -> Result<MergeStats, DatasetError> {
    let safe_copied = copy_bucket(&split.safe_dir, &data_root.join(SAFE_DIR_NAME))?;
    let danger_copied = copy_bucket(&split.danger_dir, &data_root.join(DANGER_DIR_NAME))?;
    Ok(MergeStats {
        safe_copied,
        danger_copied,
    })
}

fn copy_bucket(source_dir: &Path, dest_dir: &Path) -> Result<usize, DatasetError> {
    std::fs::create_dir_all(dest_dir).map_err(|source| DatasetError::Io {
        path: dest_dir.to_path_buf(),
        source,
    })?;
    let entries = std::fs::read_dir(source_dir).map_err(|source| DatasetError::Io {
        path: source_dir.to_path_buf(),
        source,
    })?;
    let mut copied = 0usize;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if !path.is_file() || !is_audio_file(&path) {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let dest = resolve_destination(dest_dir, file_name, &path);
        std::fs::copy(&path, &dest).map_err(|source| DatasetError::Io {
            path: dest.clone(),
            source,
        })?;
        copied += 1;
    }
    Ok(copied)
}

/// Unpack `.zip` members found inside the extraction area, bounded in depth.
fn extract_nested_archives(extract_dir: &Path) -> Result<(), DatasetError> {
    for _round in 0..MAX_NESTED_ROUNDS {
        let mut nested = Vec::new();
        collect_nested_zips(extract_dir, &mut nested)?;
        if nested.is_empty() {
            return Ok(());
        }
        for zip_path in nested {
            let stem = zip_path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("nested");
            let dest = zip_path
                .parent()
                .unwrap_or(extract_dir)
                .join(format!("{stem}_contents"));
            unzip_to_dir(&zip_path, &dest, ZipExtractionLimits::standard())?;
            std::fs::remove_file(&zip_path).map_err(|source| DatasetError::Io {
                path: zip_path.clone(),
                source,
            })?;
        }
    }
    Ok(())
}

fn collect_nested_zips(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), DatasetError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_nested_zips(&path, out)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn collect_audio_files(
    dir: &Path,
    skip_dirs: &[&PathBuf],
    out: &mut Vec<PathBuf>,
) -> Result<(), DatasetError> {
    if skip_dirs.iter().any(|skip| dir == skip.as_path()) {
        return Ok(());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_audio_files(&path, skip_dirs, out)?;
        } else if is_audio_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn move_file(source: &Path, dest: &Path) -> Result<(), DatasetError> {
    if std::fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    std::fs::copy(source, dest).map_err(|err| DatasetError::Io {
        path: dest.to_path_buf(),
        source: err,
    })?;
    std::fs::remove_file(source).map_err(|err| DatasetError::Io {
        path: source.to_path_buf(),
        source: err,
    })
}

/// Extract a zip archive into a directory while enforcing safety limits.
fn unzip_to_dir(
    zip_path: &Path,
    dest_dir: &Path,
    limits: ZipExtractionLimits,
) -> Result<(), DatasetError> {
    let file = File::open(zip_path).map_err(|source| DatasetError::Io {
        path: zip_path.to_path_buf(),
        source,
    })?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| DatasetError::Zip(err.to_string()))?;
    let entry_count = archive.len();
    if entry_count > limits.max_entries {
        return Err(DatasetError::UnsafeArchive(format!(
            "Archive has {entry_count} entries, limit is {}",
            limits.max_entries
        )));
    }
    let mut total_uncompressed: u64 = 0;
    for i in 0..entry_count {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| DatasetError::Zip(err.to_string()))?;
        let uncompressed_size = entry.size();
        if uncompressed_size > limits.max_entry_uncompressed_bytes {
            return Err(DatasetError::UnsafeArchive(format!(
                "Archive entry '{}' is too large ({} bytes, limit {})",
                entry.name(),
                uncompressed_size,
                limits.max_entry_uncompressed_bytes
            )));
        }
        if uncompressed_size > 0 {
            let compressed_size = entry.compressed_size();
            if compressed_size == 0 {
                return Err(DatasetError::UnsafeArchive(format!(
                    "Archive entry '{}' has zero compressed size",
                    entry.name()
                )));
            }
            let max_uncompressed = compressed_size.saturating_mul(limits.max_compression_ratio);
            if uncompressed_size > max_uncompressed {
                return Err(DatasetError::UnsafeArchive(format!(
                    "Archive entry '{}' exceeds compression ratio limit",
                    entry.name()
                )));
            }
        }
        total_uncompressed = total_uncompressed
            .checked_add(uncompressed_size)
            .ok_or_else(|| DatasetError::UnsafeArchive("Archive size overflow".into()))?;
        if total_uncompressed > limits.max_total_uncompressed_bytes {
            return Err(DatasetError::UnsafeArchive(format!(
                "Archive extracted size {} exceeds limit {}",
                total_uncompressed, limits.max_total_uncompressed_bytes
            )));
        }
        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => continue,
        };
        if entry.name().ends_with('/') {
            std::fs::create_dir_all(&outpath).map_err(|source| DatasetError::Io {
                path: outpath.clone(),
                source,
            })?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut outfile = File::create(&outpath).map_err(|source| DatasetError::Io {
            path: outpath.clone(),
            source,
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|source| DatasetError::Io {
            path: outpath.clone(),
            source,
        })?;
    }
    Ok(())
}
