//! The loaded core: dynamic symbol resolution, lifecycle, and the
//! persistence/memory seam the rest of the frontend depends on.
//!
//! A libretro core is a singleton by construction — its ABI has no
//! user-data parameter, just a handful of global-looking `extern "C"`
//! entry points — so only one [`Core`] may be loaded at a time per
//! process. [`Core::load`] enforces that with the same guard style
//! [`callbacks::register`] already panics on.

mod api;
mod callbacks;
mod env;

use std::ffi::c_void;
use std::path::Path;
use std::ptr;

use anyhow::{bail, Context, Result};
use libretro_sys::GameInfo;

pub use callbacks::HostCallbacks;

use self::api::Api;
use crate::persist::{MemoryKind, PersistableCore};
use crate::sigsegv;

/// Must match `RETRO_API_VERSION`.
const EXPECTED_API_VERSION: u32 = 1;

/// Declared audio/video timing and frame geometry, as reported by
/// `retro_get_system_av_info`.
#[derive(Clone, Copy, Debug)]
pub struct SystemAvInfo {
    pub width: u32,
    pub height: u32,
    pub aspect: f64,
    pub fps: f64,
    pub sample_rate: f64,
}

/// A loaded, running core.
pub struct Core {
    api: Api,
    game_loaded: bool,
}

impl Core {
    /// Loads `path`, verifies its declared API version, wires up every
    /// callback, and calls `retro_init`.
    ///
    /// `callbacks` becomes the single global instance every `extern "C"`
    /// trampoline dispatches through for the lifetime of this `Core`; the
    /// caller retains ownership and must keep it alive (and outliving this
    /// `Core`) so it can keep driving it directly between core calls, e.g.
    /// to poll the window or tick the governor.
    pub fn load(path: &Path, callbacks: &mut dyn HostCallbacks) -> Result<Self> {
        let api = Api::load(path).with_context(|| format!("loading core library {}", path.display()))?;

        let version = unsafe { (api.retro_api_version)() };
        if version != EXPECTED_API_VERSION {
            bail!("core declares libretro API version {version}, expected {EXPECTED_API_VERSION}");
        }

        // Safety: the caller keeps `callbacks` alive at least until this
        // `Core` (and the global registration it owns) is dropped.
        unsafe { callbacks::register(callbacks) };

        unsafe {
            (api.retro_set_environment)(env::environment);
            (api.retro_set_video_refresh)(callbacks::video_refresh);
            (api.retro_set_audio_sample)(callbacks::audio_sample);
            (api.retro_set_audio_sample_batch)(callbacks::audio_sample_batch);
            (api.retro_set_input_poll)(callbacks::input_poll);
            (api.retro_set_input_state)(callbacks::input_state);
        }

        // The very first call into unfamiliar native code is the riskiest:
        // guard only `retro_init` and the first `load_game` against a
        // fatal SIGSEGV, surfacing it as a regular error instead of
        // crashing the whole frontend.
        let init_result = sigsegv::guard(|| unsafe { (api.retro_init)() });
        if init_result.is_err() {
            callbacks::unregister();
            bail!("core crashed during retro_init");
        }

        Ok(Self { api, game_loaded: false })
    }

    /// Loads game content, by path or in-memory blob.
    ///
    /// Guarded the same way as `retro_init`: a core's first real look at
    /// game data is the other place a malformed ROM tends to crash a
    /// naively-written core.
    pub fn load_game(&mut self, path: Option<&Path>, data: Option<&[u8]>) -> Result<()> {
        let path_cstr = path.map(|p| std::ffi::CString::new(p.to_string_lossy().into_owned())).transpose()?;
        let info = GameInfo {
            path: path_cstr.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            data: data.map_or(ptr::null(), |d| d.as_ptr().cast::<c_void>()),
            size: data.map_or(0, <[u8]>::len),
            meta: ptr::null(),
        };

        let api = &self.api;
        let result = sigsegv::guard(|| unsafe { (api.retro_load_game)(&info) });
        match result {
            Ok(true) => {
                self.game_loaded = true;
                Ok(())
            }
            Ok(false) => bail!("core rejected the game"),
            Err(()) => bail!("core crashed while loading the game"),
        }
    }

    pub fn unload_game(&mut self) {
        if self.game_loaded {
            unsafe { (self.api.retro_unload_game)() };
            self.game_loaded = false;
        }
    }

    pub fn reset(&mut self) {
        unsafe { (self.api.retro_reset)() };
    }

    pub fn run(&mut self) {
        unsafe { (self.api.retro_run)() };
    }

    #[must_use]
    pub fn region(&self) -> u32 {
        unsafe { (self.api.retro_get_region)() }
    }

    #[must_use]
    pub fn system_av_info(&self) -> SystemAvInfo {
        let mut info = libretro_sys::SystemAvInfo {
            geometry: libretro_sys::GameGeometry {
                base_width: 0,
                base_height: 0,
                max_width: 0,
                max_height: 0,
                aspect_ratio: 0.0,
            },
            timing: libretro_sys::SystemTiming { fps: 60.0, sample_rate: 44100.0 },
        };
        unsafe { (self.api.retro_get_system_av_info)(&mut info) };
        SystemAvInfo {
            width: info.geometry.base_width,
            height: info.geometry.base_height,
            aspect: f64::from(info.geometry.aspect_ratio),
            fps: info.timing.fps,
            sample_rate: info.timing.sample_rate,
        }
    }

    #[must_use]
    pub fn supports_load_game_special(&self) -> bool {
        self.api.supports_load_game_special()
    }

    /// Swaps to the next disc image in a multi-disc title's index, if the
    /// core registered a disk-control interface and reports more than one
    /// image. Ejects around the swap, per the disk-control ABI's contract
    /// that `set_image_index` is only valid while the virtual drive is
    /// open. Returns the new image index on success.
    #[must_use]
    pub fn swap_next_disc(&self) -> Option<u32> {
        callbacks::with_global(|_, env| {
            let iface = env.disk_control?;
            let num_images = (iface.get_num_images)();
            if num_images < 2 {
                return None;
            }
            let current = (iface.get_image_index)();
            let next = (current + 1) % num_images;
            (iface.set_eject_state)(true);
            let ok = (iface.set_image_index)(next);
            (iface.set_eject_state)(false);
            ok.then_some(next)
        })
        .flatten()
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.unload_game();
        unsafe { (self.api.retro_deinit)() };
        callbacks::unregister();
    }
}

fn memory_kind_tag(kind: MemoryKind) -> u32 {
    match kind {
        MemoryKind::Sram => libretro_sys::MEMORY_SAVE_RAM,
        MemoryKind::Rtc => libretro_sys::MEMORY_RTC,
    }
}

impl PersistableCore for Core {
    fn memory_size(&self, kind: MemoryKind) -> usize {
        unsafe { (self.api.retro_get_memory_size)(memory_kind_tag(kind)) }
    }

    fn memory_data(&mut self, kind: MemoryKind) -> Option<&mut [u8]> {
        let size = self.memory_size(kind);
        if size == 0 {
            return None;
        }
        let ptr = unsafe { (self.api.retro_get_memory_data)(memory_kind_tag(kind)) };
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), size) })
    }

    fn serialize_size(&self) -> usize {
        unsafe { (self.api.retro_serialize_size)() }
    }

    fn serialize(&self, buf: &mut [u8]) -> bool {
        unsafe { (self.api.retro_serialize)(buf.as_mut_ptr().cast::<c_void>(), buf.len()) }
    }

    fn unserialize(&mut self, buf: &[u8]) -> bool {
        unsafe { (self.api.retro_unserialize)(buf.as_ptr().cast::<c_void>(), buf.len()) }
    }
}
