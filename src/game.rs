//! Game lifecycle.

use std::path::{Path, PathBuf};

use crate::persist;

/// An opened title.
///
/// Exclusively owned by the host: constructed on open, and its `Drop`
/// removes any scratch files created during archive extraction.
#[derive(Debug)]
pub struct Game {
    /// Original path the user (or launcher) requested.
    path: PathBuf,
    /// Human-readable name, derived from the file stem.
    name: String,
    /// Path to an `.m3u` playlist, for multi-disc titles.
    playlist: Option<PathBuf>,
    /// Scratch path left behind by archive extraction, removed on close.
    scratch: Option<PathBuf>,
    /// In-memory ROM blob, when the core was handed data instead of a path.
    blob: Option<Vec<u8>>,
    open: bool,
}

impl Game {
    /// Opens a title from `path`.
    ///
    /// Archive extraction and playlist discovery are external collaborator
    /// concerns (see crate docs); this only records whatever the caller
    /// already resolved.
    #[must_use]
    pub fn open(path: PathBuf, playlist: Option<PathBuf>, scratch: Option<PathBuf>, blob: Option<Vec<u8>>) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            playlist,
            scratch,
            blob,
            open: true,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn playlist(&self) -> Option<&Path> {
        self.playlist.as_deref()
    }

    #[must_use]
    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Closes the title, removing any extraction scratch file.
    pub fn close(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            if let Err(err) = persist::remove_if_present(&scratch) {
                log::warn!("failed to remove scratch file {}: {err}", scratch.display());
            }
        }
        self.open = false;
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        if self.open {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_derives_display_name_from_file_stem() {
        let game = Game::open(PathBuf::from("/roms/Chrono Trigger.sfc"), None, None, None);
        assert_eq!(game.name(), "Chrono Trigger");
        assert!(game.is_open());
    }

    #[test]
    fn close_removes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("extracted.bin");
        std::fs::write(&scratch, b"rom").unwrap();

        let mut game = Game::open(dir.path().join("game.zip"), None, Some(scratch.clone()), None);
        game.close();
        assert!(!scratch.exists());
        assert!(!game.is_open());
    }
}
