//! Application-wide constants.

/// Name of this crate; used for directory names and window titles.
pub const NAME: &str = "corevex";

/// Reserved save-slot index used for the sleep/resume save, never exposed
/// as a manual slot choice.
pub const AUTO_RESUME_SLOT: u8 = 9;

/// Number of save-state slots, `0..=9`.
pub const SAVE_SLOTS: u8 = 10;

/// Device display width, in pixels.
pub const DEVICE_WIDTH: u32 = 640;

/// Device display height, in pixels.
pub const DEVICE_HEIGHT: u32 = 480;

/// Playback speed multiplier reported while fast-forwarding.
pub const FAST_FORWARD_SPEED: f32 = 2.0;
