//! Dynamic symbol resolution for a loaded core library.

use std::ops::Deref;
use std::path::Path;

use anyhow::{Context, Result};
use libloading::Library;
use libretro_sys::CoreAPI;

/// Stub used in place of `retro_load_game_special` when a core does not
/// export it. Subsystem loading is simply unavailable for that core.
unsafe extern "C" fn retro_load_game_special_unsupported(
    _game_type: libc::c_uint,
    _info: *const libretro_sys::GameInfo,
    _num_info: libc::size_t,
) -> bool {
    false
}

/// The sixteen-plus symbols a core library must (or may) export, resolved
/// once at load time.
pub struct Api {
    /// Keeps the library mapped for the lifetime of the resolved function
    /// pointers; never accessed directly after [`Api::load`].
    _library: Library,
    core_api: CoreAPI,
    /// Whether `retro_load_game_special` was actually found in the core,
    /// as opposed to being backed by the unsupported stub.
    load_game_special_available: bool,
}

impl Api {
    /// Loads `path` and resolves every required symbol.
    ///
    /// `retro_load_game_special` is the one optional symbol (per the
    /// multi-system subsystem extension); its absence disables that
    /// feature rather than failing the load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        unsafe {
            let library = Library::new(path.as_ref()).context("failed to load core library")?;

            let (retro_load_game_special, load_game_special_available) =
                match deref_symbol(&library, "retro_load_game_special") {
                    Ok(sym) => (sym, true),
                    Err(_) => (retro_load_game_special_unsupported as _, false),
                };

            let core_api = CoreAPI {
                retro_set_environment: deref_symbol(&library, "retro_set_environment")?,
                retro_set_video_refresh: deref_symbol(&library, "retro_set_video_refresh")?,
                retro_set_audio_sample: deref_symbol(&library, "retro_set_audio_sample")?,
                retro_set_audio_sample_batch: deref_symbol(&library, "retro_set_audio_sample_batch")?,
                retro_set_input_poll: deref_symbol(&library, "retro_set_input_poll")?,
                retro_set_input_state: deref_symbol(&library, "retro_set_input_state")?,

                retro_init: deref_symbol(&library, "retro_init")?,
                retro_deinit: deref_symbol(&library, "retro_deinit")?,

                retro_api_version: deref_symbol(&library, "retro_api_version")?,

                retro_get_system_info: deref_symbol(&library, "retro_get_system_info")?,
                retro_get_system_av_info: deref_symbol(&library, "retro_get_system_av_info")?,
                retro_set_controller_port_device: deref_symbol(&library, "retro_set_controller_port_device")?,

                retro_reset: deref_symbol(&library, "retro_reset")?,
                retro_run: deref_symbol(&library, "retro_run")?,

                retro_serialize_size: deref_symbol(&library, "retro_serialize_size")?,
                retro_serialize: deref_symbol(&library, "retro_serialize")?,
                retro_unserialize: deref_symbol(&library, "retro_unserialize")?,

                retro_cheat_reset: deref_symbol(&library, "retro_cheat_reset")?,
                retro_cheat_set: deref_symbol(&library, "retro_cheat_set")?,

                retro_load_game: deref_symbol(&library, "retro_load_game")?,
                retro_load_game_special,
                retro_unload_game: deref_symbol(&library, "retro_unload_game")?,

                retro_get_region: deref_symbol(&library, "retro_get_region")?,
                retro_get_memory_data: deref_symbol(&library, "retro_get_memory_data")?,
                retro_get_memory_size: deref_symbol(&library, "retro_get_memory_size")?,
            };

            Ok(Self {
                _library: library,
                core_api,
                load_game_special_available,
            })
        }
    }

    #[must_use]
    pub fn supports_load_game_special(&self) -> bool {
        self.load_game_special_available
    }
}

unsafe fn deref_symbol<T: Copy>(library: &Library, symbol: &str) -> Result<T> {
    let item = library
        .get::<T>(symbol.as_bytes())
        .with_context(|| format!("failed to resolve symbol `{symbol}` in core"))?;
    Ok(*item)
}

impl Deref for Api {
    type Target = CoreAPI;

    fn deref(&self) -> &Self::Target {
        &self.core_api
    }
}
