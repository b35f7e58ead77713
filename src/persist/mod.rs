//! Memory and save-state persistence.
//!
//! Reads and writes battery RAM, real-time-clock blobs, and serialized
//! save states to disk, in the lifecycle order the main loop is
//! responsible for enforcing (see [`slot`] for the auto-resume
//! breadcrumb helpers).

pub mod slot;

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

/// The two memory kinds a core may expose, keyed the same way the core
/// plugin ABI tags them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryKind {
    /// Battery-backed save RAM.
    Sram = 0,
    /// Real-time-clock data.
    Rtc = 1,
}

/// Outcome of a persistence operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistResult {
    /// Completed successfully.
    Ok,
    /// The core does not expose this kind of memory or state at all.
    NoSupport,
    /// The file did not exist. Not an error: a fresh title has no save.
    FileNotFound,
    /// An I/O error occurred, or a write did not cover the expected size.
    FileError,
    /// The core reported a memory pointer of zero.
    NullPointer,
    /// A host-side buffer allocation failed.
    AllocError,
    /// The core rejected the data passed to `unserialize`.
    SerializeError,
    /// The data on disk disagreed with what the core expected.
    SizeMismatch,
}

/// The subset of the core plugin ABI persistence depends on.
///
/// Kept as a trait so this module does not need to know about
/// `libloading` symbol resolution; the core-host module provides the
/// implementation.
pub trait PersistableCore {
    /// Size in bytes of the memory region for `kind`, or `0` if the core
    /// does not expose it.
    fn memory_size(&self, kind: MemoryKind) -> usize;
    /// Mutable access to the memory region for `kind`, or `None` if the
    /// core reported a null pointer.
    fn memory_data(&mut self, kind: MemoryKind) -> Option<&mut [u8]>;
    /// Size in bytes required by [`serialize`](Self::serialize), or `0` if
    /// the core does not support state serialization.
    fn serialize_size(&self) -> usize;
    /// Serializes the core's full state into `buf`, which is exactly
    /// `serialize_size()` bytes. Returns whether it succeeded.
    fn serialize(&self, buf: &mut [u8]) -> bool;
    /// Restores the core's full state from `buf`. Returns whether it
    /// succeeded.
    fn unserialize(&mut self, buf: &[u8]) -> bool;
}

/// Reads `path` into the core's memory region for `kind`.
///
/// Short reads are tolerated and reported as [`PersistResult::Ok`]:
/// historical save files for a given title may be smaller than the
/// core's current declared size.
pub fn read_memory(core: &mut impl PersistableCore, path: &Path, kind: MemoryKind) -> PersistResult {
    let size = core.memory_size(kind);
    if size == 0 {
        return PersistResult::NoSupport;
    }

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return PersistResult::FileNotFound,
        Err(_) => return PersistResult::FileError,
    };

    let Some(dst) = core.memory_data(kind) else {
        return PersistResult::NullPointer;
    };

    match file.read(&mut dst[..size.min(dst.len())]) {
        Ok(n) if n > 0 => PersistResult::Ok,
        Ok(_) => PersistResult::FileError,
        Err(_) => PersistResult::FileError,
    }
}

/// Writes the core's memory region for `kind` to `path`.
///
/// Unlike [`read_memory`], a short write is an error: the host always
/// knows exactly how many bytes the core declared.
pub fn write_memory(core: &mut impl PersistableCore, path: &Path, kind: MemoryKind) -> PersistResult {
    let size = core.memory_size(kind);
    if size == 0 {
        return PersistResult::NoSupport;
    }

    let Some(src) = core.memory_data(kind) else {
        return PersistResult::NullPointer;
    };
    let src = &src[..size.min(src.len())];

    let mut file = match File::create(path) {
        Ok(file) => file,
        Err(_) => return PersistResult::FileError,
    };
    match file.write_all(src) {
        Ok(()) => {
            let _ = file.sync_all();
            PersistResult::Ok
        }
        Err(_) => PersistResult::FileError,
    }
}

/// Reads a save-state file at `path` into the core via `unserialize`.
pub fn read_state(core: &mut impl PersistableCore, path: &Path) -> PersistResult {
    let size = core.serialize_size();
    if size == 0 {
        return PersistResult::NoSupport;
    }

    let mut buf = vec![0u8; size];
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return PersistResult::FileNotFound,
        Err(_) => return PersistResult::FileError,
    };

    // Short reads are tolerated: some cores over-report `serialize_size`
    // on first call and expect a shorter payload on reload.
    let read = match file.read(&mut buf) {
        Ok(n) => n,
        Err(_) => return PersistResult::FileError,
    };
    buf.truncate(read);

    if core.unserialize(&buf) {
        PersistResult::Ok
    } else {
        PersistResult::SerializeError
    }
}

/// Serializes the core's state and writes it to `path`.
pub fn write_state(core: &impl PersistableCore, path: &Path) -> PersistResult {
    let size = core.serialize_size();
    if size == 0 {
        return PersistResult::NoSupport;
    }

    let mut buf = vec![0u8; size];
    if !core.serialize(&mut buf) {
        return PersistResult::SerializeError;
    }

    let mut file = match File::create(path) {
        Ok(file) => file,
        Err(_) => return PersistResult::FileError,
    };
    match file.write_all(&buf) {
        Ok(()) => {
            let _ = file.sync_all();
            PersistResult::Ok
        }
        Err(_) => PersistResult::FileError,
    }
}

/// Removes a scratch or breadcrumb file, ignoring a missing file.
pub(crate) fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FakeCore {
        sram: Vec<u8>,
        rtc: Vec<u8>,
        state: Vec<u8>,
        serialize_ok: bool,
        unserialize_ok: bool,
    }

    impl Default for FakeCore {
        fn default() -> Self {
            Self {
                sram: vec![0; 8192],
                rtc: vec![0; 64],
                state: vec![0xAB; 256],
                serialize_ok: true,
                unserialize_ok: true,
            }
        }
    }

    impl PersistableCore for FakeCore {
        fn memory_size(&self, kind: MemoryKind) -> usize {
            match kind {
                MemoryKind::Sram => self.sram.len(),
                MemoryKind::Rtc => self.rtc.len(),
            }
        }

        fn memory_data(&mut self, kind: MemoryKind) -> Option<&mut [u8]> {
            match kind {
                MemoryKind::Sram => Some(&mut self.sram),
                MemoryKind::Rtc => Some(&mut self.rtc),
            }
        }

        fn serialize_size(&self) -> usize {
            self.state.len()
        }

        fn serialize(&self, buf: &mut [u8]) -> bool {
            if !self.serialize_ok {
                return false;
            }
            buf.copy_from_slice(&self.state);
            true
        }

        fn unserialize(&mut self, buf: &[u8]) -> bool {
            if !self.unserialize_ok {
                return false;
            }
            self.state[..buf.len()].copy_from_slice(buf);
            true
        }
    }

    #[test]
    fn sram_roundtrip_preserves_pattern() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.sav");
        let mut core = FakeCore::default();
        for (i, b) in core.sram.iter_mut().enumerate() {
            *b = ((i as u8) ^ 0xAA) & 0xFF;
        }
        let written = core.sram.clone();

        assert_eq!(write_memory(&mut core, &path, MemoryKind::Sram), PersistResult::Ok);
        core.sram.fill(0);
        assert_eq!(read_memory(&mut core, &path, MemoryKind::Sram), PersistResult::Ok);
        assert_eq!(core.sram, written);
    }

    #[test]
    fn rtc_roundtrip_preserves_blob() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.rtc");
        let mut core = FakeCore::default();
        core.rtc.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        let written = core.rtc.clone();

        assert_eq!(write_memory(&mut core, &path, MemoryKind::Rtc), PersistResult::Ok);
        core.rtc.fill(0);
        assert_eq!(read_memory(&mut core, &path, MemoryKind::Rtc), PersistResult::Ok);
        assert_eq!(core.rtc, written);
    }

    #[test]
    fn state_roundtrip_preserves_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.st0");
        let mut core = FakeCore::default();
        let original = core.state.clone();

        assert_eq!(write_state(&core, &path), PersistResult::Ok);
        core.state.fill(0);
        assert_eq!(read_state(&mut core, &path), PersistResult::Ok);
        assert_eq!(core.state, original);
    }

    #[test]
    fn missing_resume_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.st9");
        let mut core = FakeCore::default();
        assert_eq!(read_state(&mut core, &path), PersistResult::FileNotFound);
    }

    #[test]
    fn tampered_state_size_is_tolerated_on_read_but_rejected_by_core() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.st1");
        fs::write(&path, vec![0u8; 4]).unwrap(); // far shorter than serialize_size()

        let mut core = FakeCore::default();
        core.unserialize_ok = false;
        assert_eq!(read_state(&mut core, &path), PersistResult::SerializeError);
    }

    #[test]
    fn no_support_when_core_reports_zero_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.sav");
        let mut core = FakeCore::default();
        core.sram = Vec::new();
        assert_eq!(write_memory(&mut core, &path, MemoryKind::Sram), PersistResult::NoSupport);
        assert_eq!(read_memory(&mut core, &path, MemoryKind::Sram), PersistResult::NoSupport);
    }
}
