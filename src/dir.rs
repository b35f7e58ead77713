//! Standard directories.
//!
//! Thin wrappers around the platform's base directories, used only to
//! answer the two environment-callback directory queries (system dir,
//! save dir); general path generation is handled upstream of this host.

use std::path::PathBuf;

use crate::def::NAME;

/// Convenience macro for creating standard directory definition functions.
macro_rules! path {
    ($($dir:tt)*) => {
        $(
            #[doc = concat!("Returns the path to the application's ", stringify!($dir), " directory.")]
            #[must_use]
            pub fn $dir() -> PathBuf {
                xdir::$dir().map(|path| path.join(NAME)).unwrap_or_default()
            }
        )*
    };
}

path! { config state }

/// Directory handed to the core in answer to `RETRO_ENVIRONMENT_GET_SYSTEM_DIRECTORY`.
///
/// Cores expect firmware/BIOS files alongside their data, so this is kept
/// separate from the frontend's own config directory.
#[must_use]
pub fn system() -> PathBuf {
    state().join("system")
}

/// Directory handed to the core in answer to `RETRO_ENVIRONMENT_GET_SAVE_DIRECTORY`.
#[must_use]
pub fn save() -> PathBuf {
    state().join("saves")
}
