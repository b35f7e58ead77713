//! Keyboard-to-joypad mapping.
//!
//! The host polls keys once per frame and answers every subsequent
//! `input_state` call from that single snapshot, satisfying the "poll
//! coalesces with idempotence guard" contract without re-reading the
//! keyboard mid-frame.

use std::ffi::c_uint;

use minifb::{Key, Window};

/// `RETRO_DEVICE_JOYPAD`.
pub const DEVICE_JOYPAD: c_uint = 1;
/// `RETRO_DEVICE_ID_JOYPAD_MASK`: `state()` returns the full button bitmask
/// instead of a single bit when `id` is this value.
pub const DEVICE_ID_JOYPAD_MASK: c_uint = 256;

/// One button per bit, positioned at its `DEVICE_ID_JOYPAD_*` value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot(u16);

impl Snapshot {
    /// Polls the window's currently held keys into a fresh snapshot.
    #[must_use]
    pub fn poll(window: &Window) -> Self {
        let mut mask = 0u16;
        for key in window.get_keys() {
            if let Some(id) = map_key(key) {
                mask |= 1 << id;
            }
        }
        Self(mask)
    }

    /// Answers a `RETRO_DEVICE_JOYPAD` `state()` query against this
    /// snapshot: the full bitmask when `id == DEVICE_ID_JOYPAD_MASK`,
    /// otherwise a single bit.
    #[must_use]
    pub fn joypad_state(self, id: c_uint) -> i16 {
        if id == DEVICE_ID_JOYPAD_MASK {
            self.0 as i16
        } else if id < 16 {
            i16::from((self.0 >> id) & 1)
        } else {
            0
        }
    }
}

/// Maps a keyboard key to a `DEVICE_ID_JOYPAD_*` value.
fn map_key(key: Key) -> Option<c_uint> {
    Some(match key {
        Key::Up => libretro_sys::DEVICE_ID_JOYPAD_UP,
        Key::Down => libretro_sys::DEVICE_ID_JOYPAD_DOWN,
        Key::Left => libretro_sys::DEVICE_ID_JOYPAD_LEFT,
        Key::Right => libretro_sys::DEVICE_ID_JOYPAD_RIGHT,
        Key::X => libretro_sys::DEVICE_ID_JOYPAD_A,
        Key::Z => libretro_sys::DEVICE_ID_JOYPAD_B,
        Key::S => libretro_sys::DEVICE_ID_JOYPAD_X,
        Key::A => libretro_sys::DEVICE_ID_JOYPAD_Y,
        Key::Enter => libretro_sys::DEVICE_ID_JOYPAD_START,
        Key::Space => libretro_sys::DEVICE_ID_JOYPAD_SELECT,
        Key::Q => libretro_sys::DEVICE_ID_JOYPAD_L,
        Key::W => libretro_sys::DEVICE_ID_JOYPAD_R,
        Key::Key1 => libretro_sys::DEVICE_ID_JOYPAD_L2,
        Key::Key2 => libretro_sys::DEVICE_ID_JOYPAD_R2,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_query_returns_every_held_bit() {
        let mut snap = Snapshot::default();
        snap.0 = (1 << libretro_sys::DEVICE_ID_JOYPAD_A) | (1 << libretro_sys::DEVICE_ID_JOYPAD_UP);
        assert_eq!(
            snap.joypad_state(DEVICE_ID_JOYPAD_MASK) as u16,
            (1 << libretro_sys::DEVICE_ID_JOYPAD_A) | (1 << libretro_sys::DEVICE_ID_JOYPAD_UP)
        );
    }

    #[test]
    fn single_id_query_returns_one_bit() {
        let mut snap = Snapshot::default();
        snap.0 = 1 << libretro_sys::DEVICE_ID_JOYPAD_B;
        assert_eq!(snap.joypad_state(libretro_sys::DEVICE_ID_JOYPAD_B), 1);
        assert_eq!(snap.joypad_state(libretro_sys::DEVICE_ID_JOYPAD_A), 0);
    }

    #[test]
    fn out_of_range_id_returns_zero() {
        let snap = Snapshot::default();
        assert_eq!(snap.joypad_state(99), 0);
    }
}
