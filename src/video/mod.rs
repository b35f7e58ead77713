//! Video transform pipeline.
//!
//! Per core-delivered frame: pixel-format conversion, software rotation,
//! then scaler selection and blit onto the device surface. Scratch buffers
//! are reallocated only when the required size grows.

mod convert;
mod overlay;
mod rotate;
mod scale;

use std::time::{Duration, Instant};

pub use convert::PixelFormat;
pub use overlay::OverlayText;
pub use rotate::Quadrant;
pub use scale::{Rect, ScalePolicy, Scaler, ScalerParams, ScalerResult, Sharpness};

/// Minimum interval between blits while fast-forwarding; blits closer
/// together than this are elided since they would be overwritten before
/// ever reaching the screen.
const FAST_FORWARD_BLIT_FLOOR: Duration = Duration::from_millis(10);

/// Declared source geometry, as reported by the core.
#[derive(Clone, Copy, Debug, Default)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    /// `<= 0.0` means "unset, derive from width/height".
    pub aspect: f64,
}

/// Video pipeline state and scratch buffers.
pub struct Pipeline {
    geometry: Geometry,
    pixel_format: PixelFormat,
    rotation: Quadrant,
    policy: ScalePolicy,
    sharpness: Sharpness,
    device_w: u32,
    device_h: u32,
    convert_buf: Vec<u8>,
    rotate_buf: Vec<u8>,
    /// Cached scaler result; invalidated (set to `None`) whenever any of
    /// the inputs it depends on changes (invariant I6).
    cached: Option<ScalerResult>,
    overlay_enabled: bool,
    last_blit: Option<Instant>,
}

impl Pipeline {
    #[must_use]
    pub fn new(device_w: u32, device_h: u32) -> Self {
        Self {
            geometry: Geometry::default(),
            pixel_format: PixelFormat::Rgb565,
            rotation: Quadrant::R0,
            policy: ScalePolicy::default(),
            sharpness: Sharpness::Sharp,
            device_w,
            device_h,
            convert_buf: Vec::new(),
            rotate_buf: Vec::new(),
            cached: None,
            overlay_enabled: false,
            last_blit: None,
        }
    }

    /// Updates declared source geometry (environment command 37 or 32).
    /// Invalidates the cached scaler result.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        self.cached = None;
    }

    /// Updates the declared pixel format (environment command 10).
    pub fn set_pixel_format(&mut self, format: PixelFormat) {
        self.pixel_format = format;
        self.cached = None;
    }

    /// Updates the rotation quadrant (environment command 1).
    pub fn set_rotation(&mut self, rotation: Quadrant) {
        self.rotation = rotation;
        self.cached = None;
    }

    /// Updates the user's scaling policy or sharpness preference.
    pub fn set_policy(&mut self, policy: ScalePolicy, sharpness: Sharpness) {
        self.policy = policy;
        self.sharpness = sharpness;
        self.cached = None;
    }

    pub fn set_overlay_enabled(&mut self, enabled: bool) {
        self.overlay_enabled = enabled;
    }

    /// Runs the full pipeline on one core-delivered frame: convert, rotate,
    /// (re)compute the scaler if invalidated, optionally draw the overlay,
    /// and report the destination rectangle the caller should blit into the
    /// platform surface.
    ///
    /// Returns `None` if the blit was suppressed (fast-forward throttling).
    pub fn present(
        &mut self,
        src: &[u8],
        fast_forward: bool,
        overlay: Option<&OverlayText>,
        now: Instant,
    ) -> Option<PresentedFrame<'_>> {
        if fast_forward {
            if let Some(last) = self.last_blit {
                if now.saturating_duration_since(last) < FAST_FORWARD_BLIT_FLOOR {
                    return None;
                }
            }
        }

        let Geometry { width, height, pitch, .. } = self.geometry;
        let dst_pitch = convert::convert(src, width, height, pitch, self.pixel_format, &mut self.convert_buf);
        let (rot_w, rot_h, rot_pitch) =
            rotate::rotate(&self.convert_buf[..(dst_pitch * height) as usize], width, height, self.rotation, &mut self.rotate_buf);

        if self.cached.is_none() {
            let ratio = scale::aspect_ratio(self.geometry.aspect, rot_w, rot_h);
            self.cached = Some(scale::compute(&ScalerParams {
                src_w: rot_w,
                src_h: rot_h,
                declared_aspect: ratio,
                policy: self.policy,
                sharpness: self.sharpness,
                device_w: self.device_w,
                device_h: self.device_h,
            }));
        }
        let result = self.cached.expect("populated above");

        if self.overlay_enabled {
            if let Some(text) = overlay {
                overlay::draw(&mut self.rotate_buf, rot_w, rot_h, rot_pitch, text);
            }
        }

        self.last_blit = Some(now);
        Some(PresentedFrame {
            buf: &self.rotate_buf[..(rot_pitch * rot_h) as usize],
            width: rot_w,
            height: rot_h,
            pitch: rot_pitch,
            scaler: result,
        })
    }
}

/// The fully processed frame, ready to hand to the platform surface.
pub struct PresentedFrame<'a> {
    pub buf: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub scaler: ScalerResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_change_invalidates_cached_scaler() {
        let mut pipeline = Pipeline::new(640, 480);
        pipeline.set_geometry(Geometry { width: 160, height: 144, pitch: 320, aspect: 0.0 });
        let src = vec![0u8; 320 * 144];
        let now = Instant::now();
        pipeline.present(&src, false, None, now).unwrap();
        assert!(pipeline.cached.is_some());

        pipeline.set_geometry(Geometry { width: 256, height: 224, pitch: 512, aspect: 0.0 });
        assert!(pipeline.cached.is_none());
    }

    #[test]
    fn fast_forward_suppresses_rapid_blits() {
        let mut pipeline = Pipeline::new(640, 480);
        pipeline.set_geometry(Geometry { width: 160, height: 144, pitch: 320, aspect: 0.0 });
        let src = vec![0u8; 320 * 144];
        let t0 = Instant::now();
        assert!(pipeline.present(&src, true, None, t0).is_some());
        let t1 = t0 + Duration::from_millis(5);
        assert!(pipeline.present(&src, true, None, t1).is_none());
        let t2 = t0 + Duration::from_millis(11);
        assert!(pipeline.present(&src, true, None, t2).is_some());
    }
}
