//! Scaler parameter computation: maps a source frame and a scaling policy
//! to concrete source/destination rectangles on the device surface.

/// How the source frame is mapped onto the device surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalePolicy {
    /// Largest integer scale that fits entirely within the device surface,
    /// centred; may letterbox on both axes.
    Native,
    /// Scale maintaining the declared (or computed) aspect ratio until one
    /// device dimension is filled; the other is letterboxed.
    Aspect,
    /// Stretch to fill the device surface exactly; pixels become
    /// non-square.
    Fullscreen,
    /// Integer scale until the device surface is filled; excess source is
    /// cropped symmetrically.
    Cropped,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self::Aspect
    }
}

/// Interpolation sharpness for non-integer scales.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sharpness {
    /// Nearest-neighbour, even at fractional scales.
    Sharp,
    /// Integer upscale followed by a linear pass.
    Crisp,
    /// Pure linear interpolation.
    Soft,
}

/// The kernel actually selected for a blit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scaler {
    Nearest,
    Bilinear,
}

/// An axis-aligned rectangle in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Inputs to a scaler computation.
#[derive(Clone, Copy, Debug)]
pub struct ScalerParams {
    pub src_w: u32,
    pub src_h: u32,
    /// Declared aspect ratio; `<= 0.0` means "use `src_w / src_h`".
    pub declared_aspect: f64,
    pub policy: ScalePolicy,
    pub sharpness: Sharpness,
    pub device_w: u32,
    pub device_h: u32,
}

/// Output of a scaler computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalerResult {
    pub src: Rect,
    pub dst: Rect,
    /// Integer scale factor; `-1` when the scale is not a whole number.
    pub scale_factor: i32,
    pub applied_aspect: f64,
    pub scaler: Scaler,
}

/// Resolves the declared-or-computed aspect ratio (§4.3: "Aspect-ratio
/// computation").
#[must_use]
pub fn aspect_ratio(declared: f64, src_w: u32, src_h: u32) -> f64 {
    if declared > 0.0 {
        declared
    } else if src_h > 0 {
        f64::from(src_w) / f64::from(src_h)
    } else {
        1.0
    }
}

/// Computes scaler parameters for the given policy.
#[must_use]
pub fn compute(params: &ScalerParams) -> ScalerResult {
    let ratio = aspect_ratio(params.declared_aspect, params.src_w, params.src_h);
    match params.policy {
        ScalePolicy::Native => native(params, ratio),
        ScalePolicy::Aspect => aspect(params, ratio),
        ScalePolicy::Fullscreen => fullscreen(params),
        ScalePolicy::Cropped => cropped(params, ratio),
    }
}

fn native(p: &ScalerParams, ratio: f64) -> ScalerResult {
    let scale_w = p.device_w / p.src_w.max(1);
    let scale_h = p.device_h / p.src_h.max(1);
    let scale = scale_w.min(scale_h).max(1);
    let dst_w = p.src_w * scale;
    let dst_h = p.src_h * scale;
    ScalerResult {
        src: Rect { x: 0, y: 0, w: p.src_w, h: p.src_h },
        dst: centered(dst_w, dst_h, p.device_w, p.device_h),
        scale_factor: scale as i32,
        applied_aspect: ratio,
        scaler: Scaler::Nearest,
    }
}

fn aspect(p: &ScalerParams, ratio: f64) -> ScalerResult {
    let by_width_h = (f64::from(p.device_w) / ratio).round() as u32;
    let (dst_w, dst_h) = if by_width_h <= p.device_h {
        (p.device_w, by_width_h)
    } else {
        let by_height_w = (f64::from(p.device_h) * ratio).round() as u32;
        (by_height_w, p.device_h)
    };
    ScalerResult {
        src: Rect { x: 0, y: 0, w: p.src_w, h: p.src_h },
        dst: centered(dst_w, dst_h, p.device_w, p.device_h),
        scale_factor: -1,
        applied_aspect: ratio,
        scaler: non_integer_scaler(p.sharpness),
    }
}

fn fullscreen(p: &ScalerParams) -> ScalerResult {
    ScalerResult {
        src: Rect { x: 0, y: 0, w: p.src_w, h: p.src_h },
        dst: Rect { x: 0, y: 0, w: p.device_w, h: p.device_h },
        scale_factor: -1,
        applied_aspect: f64::from(p.device_w) / f64::from(p.device_h.max(1)),
        scaler: non_integer_scaler(p.sharpness),
    }
}

fn cropped(p: &ScalerParams, ratio: f64) -> ScalerResult {
    let scale_w = (f64::from(p.device_w) / f64::from(p.src_w.max(1))).ceil() as u32;
    let scale_h = (f64::from(p.device_h) / f64::from(p.src_h.max(1))).ceil() as u32;
    let scale = scale_w.max(scale_h).max(1);

    let visible_w = (p.device_w / scale).min(p.src_w);
    let visible_h = (p.device_h / scale).min(p.src_h);
    let crop_x = (p.src_w - visible_w) / 2;
    let crop_y = (p.src_h - visible_h) / 2;

    ScalerResult {
        src: Rect { x: crop_x, y: crop_y, w: visible_w, h: visible_h },
        dst: Rect { x: 0, y: 0, w: p.device_w, h: p.device_h },
        scale_factor: scale as i32,
        applied_aspect: ratio,
        scaler: Scaler::Nearest,
    }
}

fn non_integer_scaler(sharpness: Sharpness) -> Scaler {
    match sharpness {
        Sharpness::Sharp => Scaler::Nearest,
        Sharpness::Crisp | Sharpness::Soft => Scaler::Bilinear,
    }
}

fn centered(w: u32, h: u32, device_w: u32, device_h: u32) -> Rect {
    Rect {
        x: (device_w.saturating_sub(w)) / 2,
        y: (device_h.saturating_sub(h)) / 2,
        w,
        h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(policy: ScalePolicy) -> ScalerParams {
        ScalerParams {
            src_w: 160,
            src_h: 144,
            declared_aspect: 0.0,
            policy,
            sharpness: Sharpness::Sharp,
            device_w: 640,
            device_h: 480,
        }
    }

    #[test]
    fn native_picks_largest_integer_scale_and_centers() {
        let result = compute(&base(ScalePolicy::Native));
        assert_eq!(result.scale_factor, 3); // min(640/160, 480/144) = min(4,3) = 3
        assert_eq!(result.dst, Rect { x: 80, y: 24, w: 480, h: 432 });
        assert_eq!(result.scaler, Scaler::Nearest);
    }

    #[test]
    fn cropped_fills_device_exactly() {
        let result = compute(&base(ScalePolicy::Cropped));
        assert_eq!(result.dst, Rect { x: 0, y: 0, w: 640, h: 480 });
        assert!(result.src.w <= 160 && result.src.h <= 144);
    }

    #[test]
    fn fullscreen_stretches_to_device() {
        let result = compute(&base(ScalePolicy::Fullscreen));
        assert_eq!(result.dst, Rect { x: 0, y: 0, w: 640, h: 480 });
        assert_eq!(result.scale_factor, -1);
    }

    #[test]
    fn aspect_letterboxes_on_the_tall_axis() {
        let result = compute(&base(ScalePolicy::Aspect));
        // 160/144 aspect against a 640x480 device: fitting by width gives
        // height 576 > 480, so fit by height instead.
        assert_eq!(result.dst.h, 480);
        assert!(result.dst.w < 640);
    }

    #[test]
    fn integer_scales_always_use_nearest_regardless_of_sharpness() {
        let mut params = base(ScalePolicy::Native);
        params.sharpness = Sharpness::Soft;
        assert_eq!(compute(&params).scaler, Scaler::Nearest);
        let mut params = base(ScalePolicy::Cropped);
        params.sharpness = Sharpness::Soft;
        assert_eq!(compute(&params).scaler, Scaler::Nearest);
    }
}
