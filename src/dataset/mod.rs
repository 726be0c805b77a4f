//! Two-class audio dataset layout and labeling policy.
//!
//! The canonical dataset is a pair of flat directories (`safe/`, `danger/`)
//! that accumulates clips across retrain cycles. Uploaded archives are
//! organized into the same two-bucket shape before being merged.

mod organizer;

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;

pub use organizer::{MergeStats, OrganizedSplit, extract_and_organize, merge_into_dataset};

/// Directory name for the safe class.
pub const SAFE_DIR_NAME: &str = "safe";
/// Directory name for the danger class.
pub const DANGER_DIR_NAME: &str = "danger";

/// Recognized audio file extensions (lowercase).
pub const AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "flac", "ogg", "m4a"];

/// Filename keywords that classify an unlabeled clip as danger.
pub const DANGER_KEYWORDS: [&str; 5] = ["danger", "scream", "distress", "alarm", "emergency"];

/// Class label for a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipLabel {
    Safe,
    Danger,
}

impl ClipLabel {
    /// Directory the label maps to inside a dataset root.
    pub fn dir_name(self) -> &'static str {
        match self {
            ClipLabel::Safe => SAFE_DIR_NAME,
            ClipLabel::Danger => DANGER_DIR_NAME,
        }
    }

    /// Human-facing label string used in prediction responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClipLabel::Safe => "Safe",
            ClipLabel::Danger => "Danger",
        }
    }
}

/// Errors from archive extraction and dataset merging.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Filesystem operation failed.
    #[error("Dataset io failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Archive could not be opened or read.
    #[error("Archive error: {0}")]
    Zip(String),
    /// Archive violated an extraction safety limit.
    #[error("Unsafe archive: {0}")]
    UnsafeArchive(String),
}

/// True when the path carries a recognized audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_ascii_lowercase();
            AUDIO_EXTENSIONS.iter().any(|known| *known == lower)
        })
        .unwrap_or(false)
}

/// Classify a clip from its immediate parent directory name and filename.
///
/// Policy, in order: an exact `safe`/`danger` parent wins; otherwise a danger
/// keyword anywhere in the filename marks danger; everything else is safe.
pub fn classify_clip(parent_dir: Option<&str>, file_name: &str) -> ClipLabel {
    if let Some(parent) = parent_dir {
        if parent.eq_ignore_ascii_case(SAFE_DIR_NAME) {
            return ClipLabel::Safe;
        }
        if parent.eq_ignore_ascii_case(DANGER_DIR_NAME) {
            return ClipLabel::Danger;
        }
    }
    let lower = file_name.to_ascii_lowercase();
    if DANGER_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        return ClipLabel::Danger;
    }
    ClipLabel::Safe
}

/// Resolve the destination path for a file, disambiguating collisions.
///
/// When the destination name is taken, the source file's last-modified Unix
/// timestamp is appended to the stem (`name_1712345678.wav`).
pub(crate) fn resolve_destination(dest_dir: &Path, file_name: &str, source: &Path) -> PathBuf {
    let candidate = dest_dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let mtime_seconds = std::fs::metadata(source)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    let suffixed = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{stem}_{mtime_seconds}.{ext}"),
        None => format!("{stem}_{mtime_seconds}"),
    };
    dest_dir.join(suffixed)
}

/// Count recognized audio files directly inside a directory.
pub fn count_audio_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && is_audio_file(path))
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parent_directory_wins_over_keywords() {
        assert_eq!(
            classify_clip(Some("safe"), "scream_01.wav"),
            ClipLabel::Safe
        );
        assert_eq!(
            classify_clip(Some("DANGER"), "lullaby.wav"),
            ClipLabel::Danger
        );
    }

    #[test]
    fn keywords_classify_unlabeled_files_as_danger() {
        for name in [
            "danger_zone.wav",
            "a_scream.mp3",
            "distress-call.flac",
            "fire_alarm.ogg",
            "emergency01.m4a",
        ] {
            assert_eq!(classify_clip(Some("clips"), name), ClipLabel::Danger);
        }
    }

    #[test]
    fn ambiguous_files_default_to_safe() {
        assert_eq!(classify_clip(None, "recording_07.wav"), ClipLabel::Safe);
        assert_eq!(classify_clip(Some("sounds"), "birds.mp3"), ClipLabel::Safe);
    }

    #[test]
    fn audio_extension_matching_is_case_insensitive() {
        assert!(is_audio_file(Path::new("clip.WAV")));
        assert!(is_audio_file(Path::new("clip.Mp3")));
        assert!(!is_audio_file(Path::new("notes.txt")));
        assert!(!is_audio_file(Path::new("archive.zip")));
        assert!(!is_audio_file(Path::new("noext")));
    }

    #[test]
    fn collision_appends_source_mtime_to_stem() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.wav");
        std::fs::write(&source, b"x").unwrap();

        let free = resolve_destination(dir.path(), "clip.wav", &source);
        assert_eq!(free, dir.path().join("clip.wav"));

        std::fs::write(dir.path().join("clip.wav"), b"y").unwrap();
        let taken = resolve_destination(dir.path(), "clip.wav", &source);
        let name = taken.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("clip_"));
        assert!(name.ends_with(".wav"));
        assert_ne!(taken, dir.path().join("clip.wav"));
    }
}
