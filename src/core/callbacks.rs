//! The host-side callback trait and the global state the core's
//! `extern "C"` trampolines dispatch through.
//!
//! Libretro cores call back into a single global instance (there is no
//! user-data pointer threaded through the ABI), so this mirrors the
//! single-core-at-a-time assumption already made by [`crate::core::Core`]
//! with a `parking_lot::Mutex`-guarded static, the same pattern the
//! persistence and governor modules use for their own shared state.

use std::ffi::{c_uint, c_void};
use std::path::PathBuf;

use libretro_sys::GameInfo;
use parking_lot::Mutex;

use crate::video::{PixelFormat, Quadrant};

/// Implemented by whatever owns the video pipeline, audio sink, pacer, and
/// config for the lifetime of a loaded core. The core module knows only
/// this trait, not the concrete aggregate that implements it.
pub trait HostCallbacks: Send {
    /// A `None` buffer means the core asked to dupe the previous frame.
    fn video_frame(&mut self, data: Option<&[u8]>, width: u32, height: u32, pitch: usize);
    fn audio_sample(&mut self, left: i16, right: i16);
    /// Returns the number of frames actually consumed.
    fn audio_sample_batch(&mut self, samples: &[i16]) -> usize;
    fn input_poll(&mut self);
    fn input_state(&mut self, port: u32, device: u32, index: u32, id: u32) -> i16;

    fn set_rotation(&mut self, rotation: Quadrant);
    fn set_pixel_format(&mut self, format: PixelFormat) -> bool;
    /// `pitch` is not included here: it is only ever known from an actual
    /// `video_frame` delivery, so callers merge it in separately.
    fn set_geometry(&mut self, width: u32, height: u32, aspect: f64);
    fn set_system_av_info(&mut self, width: u32, height: u32, aspect: f64, fps: f64, sample_rate: f64);
    fn set_input_descriptors(&mut self, described: Vec<(u32, u32, u32, u32)>);
    fn set_disk_control_available(&mut self);
    fn set_controller_info_noted(&mut self);

    fn log_message(&mut self, message: &str);
    fn system_dir(&self) -> PathBuf;
    fn save_dir(&self) -> PathBuf;

    fn is_fast_forwarding(&self) -> bool;
    fn fast_forward_speed(&self) -> f32;
    fn target_refresh_rate(&self) -> f64;
    /// `effect` is `0` for the strong motor, `1` for the weak motor, per
    /// `enum retro_rumble_effect`.
    fn rumble(&mut self, port: u32, effect: u32, strength: u16) -> bool;
}

/// A parsed `"description; opt1|opt2|..."` core-option entry. Per the
/// scoped-down tunables reader, only the default (first-listed) value is
/// retained; no catalog of the other options is exposed anywhere.
#[derive(Clone, Debug)]
pub(crate) struct Variable {
    pub value: std::ffi::CString,
}

impl Variable {
    pub fn parse(raw: &str) -> Option<Self> {
        let options = raw.split_once("; ").map_or(raw, |(_, opts)| opts);
        let default = options.split('|').next().unwrap_or_default();
        std::ffi::CString::new(default).ok().map(|value| Self { value })
    }
}

/// `struct retro_disk_control_callback`, captured from environment command
/// 13 (or its superset, 58) so a later disc swap can call back into the
/// core and report which image is current.
#[derive(Clone, Copy)]
pub(crate) struct DiskControlInterface {
    pub set_eject_state: extern "C" fn(bool) -> bool,
    pub get_eject_state: extern "C" fn() -> bool,
    pub get_image_index: extern "C" fn() -> c_uint,
    pub set_image_index: extern "C" fn(c_uint) -> bool,
    pub get_num_images: extern "C" fn() -> c_uint,
    pub replace_image_index: extern "C" fn(c_uint, *const GameInfo) -> bool,
    pub add_image_index: extern "C" fn() -> bool,
}

/// Ambient environment-command state that has nowhere else to live: it is
/// scoped to one loaded core, same as the callbacks themselves.
pub(crate) struct EnvState {
    pub variables: std::collections::HashMap<String, Variable>,
    pub variables_dirty: bool,
    pub disk_control_registered: bool,
    pub disk_control: Option<DiskControlInterface>,
    pub controller_info_noted: bool,
    pub frame_time_callback: Option<extern "C" fn(i64)>,
    pub frame_time_reference: i64,
    pub audio_buffer_status_callback: Option<extern "C" fn(bool, std::ffi::c_uint, bool)>,
    /// Cached so the pointer handed back to the core in answer to
    /// `GET_SYSTEM_DIRECTORY` stays valid for the lifetime of the core.
    pub system_dir: Option<std::ffi::CString>,
    pub save_dir: Option<std::ffi::CString>,
}

impl Default for EnvState {
    fn default() -> Self {
        Self {
            variables: std::collections::HashMap::new(),
            variables_dirty: false,
            disk_control_registered: false,
            disk_control: None,
            controller_info_noted: false,
            frame_time_callback: None,
            frame_time_reference: 0,
            audio_buffer_status_callback: None,
            system_dir: None,
            save_dir: None,
        }
    }
}

/// A borrowed, type-erased pointer to the registered [`HostCallbacks`]
/// implementation. Not an owning `Box`: the caller of [`register`] (the
/// main loop) keeps its `HostContext` on its own stack for the lifetime of
/// the loaded [`crate::core::Core`] and is responsible for calling
/// [`unregister`] before that value goes away. This is what lets the same
/// object serve both as the ABI callback target *and* as something the
/// main loop keeps driving directly (window polling, governor ticks)
/// between calls into the core.
struct Global(*mut dyn HostCallbacks);

// Safety: access is always serialized through `GLOBAL`'s mutex, and the
// core itself runs single-threaded from the main loop's perspective.
unsafe impl Send for Global {}

static GLOBAL: Mutex<Option<Global>> = Mutex::new(None);
static ENV: Mutex<Option<EnvState>> = Mutex::new(None);

/// Installs the callback implementation for the core about to be loaded.
/// Panics if a core is already registered; `Core::load` never calls this
/// twice without an intervening [`unregister`].
///
/// # Safety
///
/// `callbacks` must remain valid until [`unregister`] is called.
pub(crate) unsafe fn register(callbacks: &mut dyn HostCallbacks) {
    let mut guard = GLOBAL.lock();
    assert!(guard.is_none(), "a core is already registered");
    *guard = Some(Global(callbacks as *mut dyn HostCallbacks));
    *ENV.lock() = Some(EnvState::default());
}

pub(crate) fn unregister() {
    *GLOBAL.lock() = None;
    *ENV.lock() = None;
}

/// Runs `f` against the registered callbacks and environment state, if
/// any core is currently loaded.
pub(crate) fn with_global<R>(f: impl FnOnce(&mut dyn HostCallbacks, &mut EnvState) -> R) -> Option<R> {
    let guard = GLOBAL.lock();
    let global = guard.as_ref()?;
    // Safety: `register`'s caller guarantees the pointee outlives
    // registration, and `GLOBAL`'s mutex serializes every access.
    let callbacks = unsafe { &mut *global.0 };
    let mut env_guard = ENV.lock();
    let env = env_guard.as_mut()?;
    Some(f(callbacks, env))
}

pub(super) unsafe extern "C" fn video_refresh(data: *const c_void, width: c_uint, height: c_uint, pitch: usize) {
    with_global(|cb, _| {
        let frame = if data.is_null() {
            None
        } else {
            // Safety: the core guarantees `pitch * height` readable bytes
            // when `data` is non-null, per the libretro video refresh
            // contract.
            Some(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), pitch * height as usize) })
        };
        cb.video_frame(frame, width, height, pitch);
    });
}

pub(super) unsafe extern "C" fn audio_sample(left: i16, right: i16) {
    with_global(|cb, _| cb.audio_sample(left, right));
}

pub(super) unsafe extern "C" fn audio_sample_batch(data: *const i16, frames: usize) -> usize {
    if data.is_null() || frames == 0 {
        return frames;
    }
    // Safety: interleaved stereo, `2 * frames` samples, per the libretro
    // audio batch contract.
    let samples = unsafe { std::slice::from_raw_parts(data, frames * 2) };
    with_global(|cb, _| cb.audio_sample_batch(samples)).unwrap_or(frames)
}

pub(super) unsafe extern "C" fn input_poll() {
    with_global(|cb, _| cb.input_poll());
}

pub(super) unsafe extern "C" fn input_state(port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16 {
    with_global(|cb, _| cb.input_state(port, device, index, id)).unwrap_or(0)
}
