//! Cue asset resolution.
//!
//! Command payloads carry relative filenames; everything the player touches
//! must stay inside the configured media directories. The resolver strips
//! traversal components before joining, so a hostile name can never escape
//! the base directory.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::config::VideoConfig;

/// Which renderer an asset routes to, derived from its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Audio,
    Video,
}

/// A resolved, sandboxed media asset.
#[derive(Clone, Debug)]
pub struct CueAsset {
    pub name: String,
    pub path: PathBuf,
    pub kind: AssetKind,
}

/// Resolves command filenames into [`CueAsset`]s under the configured bases.
#[derive(Clone, Debug)]
pub struct AssetResolver {
    audio_base: PathBuf,
    video_base: PathBuf,
    video_extensions: Vec<String>,
}

impl AssetResolver {
    pub fn new(audio_base: PathBuf, video: &VideoConfig) -> Self {
        Self {
            audio_base,
            video_base: video.base_path.clone(),
            video_extensions: video.extensions.clone(),
        }
    }

    /// Resolve `name` to an existing file under the matching base directory.
    ///
    /// Fails when the sanitized name is empty or the file does not exist;
    /// callers log and treat the command as a no-op.
    pub fn resolve(&self, name: &str) -> Result<CueAsset> {
        let kind = if self.is_video_name(name) {
            AssetKind::Video
        } else {
            AssetKind::Audio
        };
        let base = match kind {
            AssetKind::Audio => &self.audio_base,
            AssetKind::Video => &self.video_base,
        };
        let path = resolve_under(base, name);
        if path == *base {
            bail!("empty asset name: {name:?}");
        }
        if !path.is_file() {
            bail!("file not found: {}", path.display());
        }
        Ok(CueAsset {
            name: name.trim().to_string(),
            path,
            kind,
        })
    }

    fn is_video_name(&self, name: &str) -> bool {
        let lower = name.trim().to_lowercase();
        let Some(ext) = Path::new(&lower).extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.video_extensions.iter().any(|v| v == ext)
    }
}

/// Join `name` under `base` after stripping leading separators and
/// parent-directory traversal sequences.
pub fn resolve_under(base: &Path, name: &str) -> PathBuf {
    let cleaned = name
        .trim()
        .trim_start_matches(['/', '\\'])
        .replace("..", "");
    base.join(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AssetResolver {
        AssetResolver {
            audio_base: PathBuf::from("/media/audio"),
            video_base: PathBuf::from("/media/video"),
            video_extensions: vec!["mp4".into(), "mkv".into()],
        }
    }

    #[test]
    fn resolve_under_rejects_absolute_names() {
        let out = resolve_under(Path::new("/media"), "/etc/passwd");
        assert!(out.starts_with("/media"));
        assert_eq!(out, PathBuf::from("/media/etc/passwd"));
    }

    #[test]
    fn resolve_under_strips_traversal() {
        let out = resolve_under(Path::new("/media"), "../../etc/passwd");
        assert!(out.starts_with("/media"));
        assert!(!out.to_string_lossy().contains(".."));
    }

    #[test]
    fn resolve_under_keeps_plain_names() {
        assert_eq!(
            resolve_under(Path::new("/media"), "intro.mp3"),
            PathBuf::from("/media/intro.mp3")
        );
        assert_eq!(
            resolve_under(Path::new("/media"), "  theme.ogg  "),
            PathBuf::from("/media/theme.ogg")
        );
    }

    #[test]
    fn video_detection_is_extension_based() {
        let r = resolver();
        assert!(r.is_video_name("clip.MP4"));
        assert!(r.is_video_name("dir/clip.mkv"));
        assert!(!r.is_video_name("song.mp3"));
        assert!(!r.is_video_name("noext"));
    }

    #[test]
    fn resolve_missing_file_fails() {
        let r = resolver();
        assert!(r.resolve("does-not-exist.mp3").is_err());
    }

    #[test]
    fn resolve_empty_name_fails() {
        let r = resolver();
        assert!(r.resolve("").is_err());
        assert!(r.resolve("/").is_err());
    }
}
