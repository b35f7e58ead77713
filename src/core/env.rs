//! The environment callback: a single dispatch function handling every
//! numbered command a core may issue via `retro_set_environment`.
//!
//! Unsupported commands return `false`, per the libretro convention that
//! lets a core probe for frontend feature support.

use std::ffi::{c_char, c_uint, c_void, CStr, CString};

use libretro_sys::GameGeometry;

use super::callbacks::{with_global, DiskControlInterface, Variable};

const RETRO_ENVIRONMENT_SET_ROTATION: c_uint = 1;
const RETRO_ENVIRONMENT_GET_OVERSCAN: c_uint = 2;
const RETRO_ENVIRONMENT_GET_CAN_DUPE: c_uint = 3;
const RETRO_ENVIRONMENT_SET_MESSAGE: c_uint = 6;
const RETRO_ENVIRONMENT_GET_SYSTEM_DIRECTORY: c_uint = 9;
const RETRO_ENVIRONMENT_SET_PIXEL_FORMAT: c_uint = 10;
const RETRO_ENVIRONMENT_SET_INPUT_DESCRIPTORS: c_uint = 11;
const RETRO_ENVIRONMENT_SET_DISK_CONTROL_INTERFACE: c_uint = 13;
const RETRO_ENVIRONMENT_GET_VARIABLE: c_uint = 15;
const RETRO_ENVIRONMENT_SET_VARIABLES: c_uint = 16;
const RETRO_ENVIRONMENT_GET_VARIABLE_UPDATE: c_uint = 17;
const RETRO_ENVIRONMENT_SET_FRAME_TIME_CALLBACK: c_uint = 21;
const RETRO_ENVIRONMENT_GET_RUMBLE_INTERFACE: c_uint = 23;
const RETRO_ENVIRONMENT_GET_LOG_INTERFACE: c_uint = 27;
const RETRO_ENVIRONMENT_GET_SAVE_DIRECTORY: c_uint = 31;
const RETRO_ENVIRONMENT_SET_SYSTEM_AV_INFO: c_uint = 32;
const RETRO_ENVIRONMENT_SET_CONTROLLER_INFO: c_uint = 35;
const RETRO_ENVIRONMENT_SET_GEOMETRY: c_uint = 37;
const RETRO_ENVIRONMENT_GET_FASTFORWARDING: c_uint = 49;
const RETRO_ENVIRONMENT_GET_TARGET_REFRESH_RATE: c_uint = 50;
const RETRO_ENVIRONMENT_GET_INPUT_BITMASKS: c_uint = 51;
const RETRO_ENVIRONMENT_SET_CORE_OPTIONS: c_uint = 53;
const RETRO_ENVIRONMENT_SET_CORE_OPTIONS_INTL: c_uint = 54;
const RETRO_ENVIRONMENT_SET_DISK_CONTROL_EXT_INTERFACE: c_uint = 58;
const RETRO_ENVIRONMENT_SET_AUDIO_BUFFER_STATUS_CALLBACK: c_uint = 62;
const RETRO_ENVIRONMENT_GET_THROTTLE_STATE: c_uint = 71;

/// `struct retro_message`: a transient on-screen message.
#[repr(C)]
struct RetroMessage {
    msg: *const c_char,
    frames: c_uint,
}

/// `struct retro_input_descriptor`, terminated by a zeroed `description`.
#[repr(C)]
struct RetroInputDescriptor {
    port: c_uint,
    device: c_uint,
    index: c_uint,
    id: c_uint,
    description: *const c_char,
}

/// `struct retro_variable`.
#[repr(C)]
struct RetroVariable {
    key: *const c_char,
    value: *const c_char,
}

/// `struct retro_disk_control_callback`. `retro_disk_control_ext_callback`
/// (command 58) only appends fields after these seven, so reading through
/// this layout is valid for either command.
#[repr(C)]
struct RetroDiskControlInterface {
    set_eject_state: extern "C" fn(bool) -> bool,
    get_eject_state: extern "C" fn() -> bool,
    get_image_index: extern "C" fn() -> c_uint,
    set_image_index: extern "C" fn(c_uint) -> bool,
    get_num_images: extern "C" fn() -> c_uint,
    replace_image_index: extern "C" fn(c_uint, *const libretro_sys::GameInfo) -> bool,
    add_image_index: extern "C" fn() -> bool,
}

/// `struct retro_frame_time_callback`.
#[repr(C)]
struct RetroFrameTimeCallback {
    callback: extern "C" fn(i64),
    reference: i64,
}

/// `struct retro_rumble_interface`.
#[repr(C)]
struct RetroRumbleInterface {
    set_rumble_state: extern "C" fn(port: c_uint, effect: c_uint, strength: u16) -> bool,
}

/// `struct retro_log_callback`, simplified to a fixed single-string
/// message: forwarding the full printf-style varargs contract would
/// require unstable C-variadic support, and every core this frontend
/// targets logs preformatted single strings.
#[repr(C)]
struct RetroLogCallback {
    log: extern "C" fn(level: c_uint, fmt: *const c_char),
}

/// `struct retro_audio_buffer_status_callback`.
#[repr(C)]
struct RetroAudioBufferStatusCallback {
    callback: extern "C" fn(active: bool, occupancy: c_uint, underrun: bool),
}

/// `struct retro_throttle_state`.
#[repr(C)]
struct RetroThrottleState {
    mode: c_uint,
    rate: f32,
}

const THROTTLE_NONE: c_uint = 0;
const THROTTLE_FAST_FORWARD: c_uint = 2;

fn raw_pixel_format(raw: c_uint) -> Option<crate::video::PixelFormat> {
    use crate::video::PixelFormat;
    match raw {
        0 => Some(PixelFormat::Rgb1555),
        1 => Some(PixelFormat::Xrgb8888),
        2 => Some(PixelFormat::Rgb565),
        _ => None,
    }
}

extern "C" fn rumble_set_state(port: c_uint, effect: c_uint, strength: u16) -> bool {
    with_global(|cb, _| cb.rumble(port, effect, strength)).unwrap_or(false)
}

extern "C" fn log_forward(level: c_uint, fmt: *const c_char) {
    if fmt.is_null() {
        return;
    }
    let message = unsafe { CStr::from_ptr(fmt) }.to_string_lossy();
    with_global(|cb, _| cb.log_message(&format!("[core:{level}] {message}")));
}

/// The `retro_environment_t` trampoline itself.
pub(super) unsafe extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    match cmd {
        RETRO_ENVIRONMENT_SET_ROTATION => {
            let Some(raw) = (data as *const c_uint).as_ref() else { return false };
            with_global(|cb, _| cb.set_rotation(crate::video::Quadrant::from_degrees(*raw * 90))).is_some()
        }
        RETRO_ENVIRONMENT_GET_OVERSCAN => {
            write_bool(data, true);
            true
        }
        RETRO_ENVIRONMENT_GET_CAN_DUPE => {
            write_bool(data, true);
            true
        }
        RETRO_ENVIRONMENT_SET_MESSAGE => {
            let Some(msg) = (data as *const RetroMessage).as_ref() else { return false };
            if !msg.msg.is_null() {
                let text = CStr::from_ptr(msg.msg).to_string_lossy();
                with_global(|cb, _| cb.log_message(&text));
            }
            true
        }
        RETRO_ENVIRONMENT_GET_SYSTEM_DIRECTORY => {
            with_global(|cb, env| {
                let cached = env
                    .system_dir
                    .get_or_insert_with(|| CString::new(cb.system_dir().to_string_lossy().into_owned()).unwrap_or_default());
                *(data as *mut *const c_char) = cached.as_ptr();
            });
            true
        }
        RETRO_ENVIRONMENT_SET_PIXEL_FORMAT => {
            let Some(raw) = (data as *const c_uint).as_ref() else { return false };
            let Some(format) = raw_pixel_format(*raw) else { return false };
            with_global(|cb, _| cb.set_pixel_format(format)).unwrap_or(false)
        }
        RETRO_ENVIRONMENT_SET_INPUT_DESCRIPTORS => {
            let mut described = Vec::new();
            let mut cursor = data as *const RetroInputDescriptor;
            while let Some(entry) = cursor.as_ref() {
                if entry.description.is_null() {
                    break;
                }
                described.push((entry.port, entry.device, entry.index, entry.id));
                cursor = cursor.add(1);
            }
            with_global(|cb, _| cb.set_input_descriptors(described));
            true
        }
        RETRO_ENVIRONMENT_SET_DISK_CONTROL_INTERFACE | RETRO_ENVIRONMENT_SET_DISK_CONTROL_EXT_INTERFACE => {
            let Some(iface) = (data as *const RetroDiskControlInterface).as_ref() else { return false };
            let stored = DiskControlInterface {
                set_eject_state: iface.set_eject_state,
                get_eject_state: iface.get_eject_state,
                get_image_index: iface.get_image_index,
                set_image_index: iface.set_image_index,
                get_num_images: iface.get_num_images,
                replace_image_index: iface.replace_image_index,
                add_image_index: iface.add_image_index,
            };
            with_global(|cb, env| {
                env.disk_control_registered = true;
                env.disk_control = Some(stored);
                cb.set_disk_control_available();
            });
            true
        }
        RETRO_ENVIRONMENT_GET_VARIABLE => {
            let Some(variable) = (data as *mut RetroVariable).as_mut() else { return false };
            let Some(key_ptr) = variable.key.as_ref() else { return false };
            let key = CStr::from_ptr(key_ptr).to_string_lossy();
            with_global(|_, env| {
                variable.value = env.variables.get(key.as_ref()).map_or(std::ptr::null(), |v| v.value.as_ptr());
            });
            true
        }
        RETRO_ENVIRONMENT_SET_VARIABLES => {
            let mut entries = Vec::new();
            let mut cursor = data as *const RetroVariable;
            while let Some(entry) = cursor.as_ref() {
                if entry.key.is_null() {
                    break;
                }
                if let (Some(key), Some(value)) = (entry.key.as_ref(), entry.value.as_ref()) {
                    let key = CStr::from_ptr(key).to_string_lossy().into_owned();
                    let value = CStr::from_ptr(value).to_string_lossy();
                    if let Some(variable) = Variable::parse(&value) {
                        entries.push((key, variable));
                    }
                }
                cursor = cursor.add(1);
            }
            with_global(|_, env| {
                for (key, variable) in entries {
                    env.variables.insert(key, variable);
                }
                env.variables_dirty = true;
            });
            true
        }
        RETRO_ENVIRONMENT_GET_VARIABLE_UPDATE => {
            let dirty = with_global(|_, env| {
                let was = env.variables_dirty;
                env.variables_dirty = false;
                was
            })
            .unwrap_or(false);
            write_bool(data, dirty);
            true
        }
        RETRO_ENVIRONMENT_SET_FRAME_TIME_CALLBACK => {
            let Some(cb_struct) = (data as *const RetroFrameTimeCallback).as_ref() else { return false };
            with_global(|_, env| {
                env.frame_time_callback = Some(cb_struct.callback);
                env.frame_time_reference = cb_struct.reference;
            });
            true
        }
        RETRO_ENVIRONMENT_GET_RUMBLE_INTERFACE => {
            if let Some(out) = (data as *mut RetroRumbleInterface).as_mut() {
                out.set_rumble_state = rumble_set_state;
            }
            true
        }
        RETRO_ENVIRONMENT_GET_LOG_INTERFACE => {
            if let Some(out) = (data as *mut RetroLogCallback).as_mut() {
                out.log = log_forward;
            }
            true
        }
        RETRO_ENVIRONMENT_GET_SAVE_DIRECTORY => {
            with_global(|cb, env| {
                let cached = env
                    .save_dir
                    .get_or_insert_with(|| CString::new(cb.save_dir().to_string_lossy().into_owned()).unwrap_or_default());
                *(data as *mut *const c_char) = cached.as_ptr();
            });
            true
        }
        RETRO_ENVIRONMENT_SET_SYSTEM_AV_INFO => {
            let Some(info) = (data as *const libretro_sys::SystemAvInfo).as_ref() else { return false };
            with_global(|cb, _| {
                cb.set_system_av_info(
                    info.geometry.base_width,
                    info.geometry.base_height,
                    f64::from(info.geometry.aspect_ratio),
                    info.timing.fps,
                    info.timing.sample_rate,
                );
            });
            true
        }
        RETRO_ENVIRONMENT_SET_CONTROLLER_INFO => {
            with_global(|cb, _| cb.set_controller_info_noted());
            false
        }
        RETRO_ENVIRONMENT_SET_GEOMETRY => {
            let Some(geometry) = (data as *const GameGeometry).as_ref() else { return false };
            with_global(|cb, _| cb.set_geometry(geometry.base_width, geometry.base_height, f64::from(geometry.aspect_ratio)));
            true
        }
        RETRO_ENVIRONMENT_GET_FASTFORWARDING => {
            let fast = with_global(|cb, _| cb.is_fast_forwarding()).unwrap_or(false);
            write_bool(data, fast);
            true
        }
        RETRO_ENVIRONMENT_GET_TARGET_REFRESH_RATE => {
            if let Some(out) = (data as *mut f32).as_mut() {
                *out = with_global(|cb, _| cb.target_refresh_rate()).unwrap_or(60.0) as f32;
            }
            true
        }
        RETRO_ENVIRONMENT_GET_INPUT_BITMASKS => true,
        // Replacing the option catalog wholesale is out of scope; the
        // core still gets a truthy acknowledgement so it doesn't fall
        // back to assuming no core-options support at all.
        RETRO_ENVIRONMENT_SET_CORE_OPTIONS | RETRO_ENVIRONMENT_SET_CORE_OPTIONS_INTL => true,
        RETRO_ENVIRONMENT_SET_AUDIO_BUFFER_STATUS_CALLBACK => {
            if let Some(cb_struct) = (data as *const RetroAudioBufferStatusCallback).as_ref() {
                with_global(|_, env| env.audio_buffer_status_callback = Some(cb_struct.callback));
            }
            true
        }
        RETRO_ENVIRONMENT_GET_THROTTLE_STATE => {
            if let Some(out) = (data as *mut RetroThrottleState).as_mut() {
                let (fast, speed) = with_global(|cb, _| (cb.is_fast_forwarding(), cb.fast_forward_speed())).unwrap_or((false, 1.0));
                out.mode = if fast { THROTTLE_FAST_FORWARD } else { THROTTLE_NONE };
                out.rate = speed;
            }
            true
        }
        _ => false,
    }
}

unsafe fn write_bool(data: *mut c_void, value: bool) {
    if let Some(out) = (data as *mut bool).as_mut() {
        *out = value;
    }
}
