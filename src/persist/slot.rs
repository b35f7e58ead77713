//! Save-slot paths and the resume/disc-swap breadcrumb files left for a
//! parent launcher.

use std::fs;
use std::path::{Path, PathBuf};

use super::remove_if_present;
use crate::def::AUTO_RESUME_SLOT;

/// Path to a title's battery-RAM save file.
#[must_use]
pub fn sram_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(format!("{title}.sav"))
}

/// Path to a title's real-time-clock blob.
#[must_use]
pub fn rtc_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(format!("{title}.rtc"))
}

/// Path to a numbered save-state slot, `0..=9`. Slot 9 is the reserved
/// auto-resume slot and must never be targeted by a manual save.
#[must_use]
pub fn state_path(dir: &Path, title: &str, slot: u8) -> PathBuf {
    dir.join(format!("{title}.st{slot}"))
}

/// Path to the title's auto-resume state.
#[must_use]
pub fn resume_state_path(dir: &Path, title: &str) -> PathBuf {
    state_path(dir, title, AUTO_RESUME_SLOT)
}

/// Whether a manual save targeting `slot` would collide with the reserved
/// auto-resume slot.
#[must_use]
pub fn is_manual_slot_allowed(slot: u8) -> bool {
    slot != AUTO_RESUME_SLOT
}

/// Path to the resume-slot breadcrumb a parent launcher writes before
/// starting the frontend.
fn resume_breadcrumb_path(dir: &Path) -> PathBuf {
    dir.join("resume.slot")
}

/// Path to the last-disc breadcrumb written on a disc swap.
fn last_disc_breadcrumb_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(format!("{title}.disc"))
}

/// Reads and deletes the resume-slot breadcrumb, if present.
///
/// Deleting it immediately after reading prevents a crash loop from
/// repeatedly auto-loading the same slot on every subsequent launch.
pub fn take_resume_breadcrumb(dir: &Path) -> std::io::Result<Option<u8>> {
    let path = resume_breadcrumb_path(dir);
    let slot = match fs::read_to_string(&path) {
        Ok(body) => body.trim().parse::<u8>().ok(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    remove_if_present(&path)?;
    Ok(slot)
}

/// Writes the last-disc breadcrumb for multi-disc titles.
pub fn write_last_disc_breadcrumb(dir: &Path, title: &str, disc_index: u32) -> std::io::Result<()> {
    fs::write(last_disc_breadcrumb_path(dir, title), disc_index.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn auto_resume_slot_is_not_a_valid_manual_target() {
        assert!(!is_manual_slot_allowed(AUTO_RESUME_SLOT));
        assert!(is_manual_slot_allowed(0));
        assert!(is_manual_slot_allowed(8));
    }

    #[test]
    fn resume_breadcrumb_is_removed_after_reading() {
        let dir = tempdir().unwrap();
        let path = resume_breadcrumb_path(dir.path());
        fs::write(&path, "3\n").unwrap();

        let slot = take_resume_breadcrumb(dir.path()).unwrap();
        assert_eq!(slot, Some(3));
        assert!(!path.exists());
    }

    #[test]
    fn missing_resume_breadcrumb_yields_none() {
        let dir = tempdir().unwrap();
        assert_eq!(take_resume_breadcrumb(dir.path()).unwrap(), None);
    }
}
