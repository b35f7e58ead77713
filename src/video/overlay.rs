//! Debug overlay: four corners of bitmap-font text drawn directly into the
//! source buffer, after conversion and rotation, so it rides along with
//! the emulated picture rather than a raw scanout.

/// Text for each corner of the overlay.
#[derive(Clone, Debug, Default)]
pub struct OverlayText {
    pub top_left: String,
    pub top_right: String,
    pub bottom_left: String,
    pub bottom_right: String,
}

impl OverlayText {
    /// Builds the standard four-corner readout.
    #[must_use]
    pub fn build(
        fps_pct: f64,
        cpu_pct: f64,
        src_w: u32,
        src_h: u32,
        scale: i32,
        freq_or_level: &str,
        util_pct: u32,
        buf_fill_pct: u32,
        dst_w: u32,
        dst_h: u32,
    ) -> Self {
        Self {
            top_left: format!("{fps_pct:.0}% {cpu_pct:.0}%"),
            top_right: format!("{src_w}x{src_h} {scale}x"),
            bottom_left: format!("{freq_or_level} {util_pct}% buf:{buf_fill_pct}%"),
            bottom_right: format!("{dst_w}x{dst_h}"),
        }
    }
}

/// 5x7 bitmap glyph width/height, in device pixels, at 1x overlay scale.
const GLYPH_W: u32 = 6;
const GLYPH_H: u32 = 8;

/// Draws `text` into a tightly packed RGB565 buffer at `(x, y)`, one
/// solid-block glyph cell per character (a full bitmap font is a platform
/// concern; this host only needs legible, testable corner text).
pub fn draw_text(buf: &mut [u8], width: u32, pitch: u32, x: u32, y: u32, text: &str) {
    for (i, ch) in text.chars().enumerate() {
        if ch == ' ' {
            continue;
        }
        let gx = x + i as u32 * GLYPH_W;
        if gx + GLYPH_W > width {
            break;
        }
        for row in 0..GLYPH_H {
            let off = ((y + row) * pitch + gx * 2) as usize;
            if off + (GLYPH_W * 2) as usize > buf.len() {
                break;
            }
            for col in 0..GLYPH_W {
                let px_off = off + (col * 2) as usize;
                buf[px_off..px_off + 2].copy_from_slice(&0xFFFFu16.to_le_bytes());
            }
        }
    }
}

/// Draws all four corners of `text` onto a converted-and-rotated frame.
pub fn draw(buf: &mut [u8], width: u32, height: u32, pitch: u32, text: &OverlayText) {
    draw_text(buf, width, pitch, 0, 0, &text.top_left);
    let right_x = width.saturating_sub(text.top_right.len() as u32 * GLYPH_W);
    draw_text(buf, width, pitch, right_x, 0, &text.top_right);
    let bottom_y = height.saturating_sub(GLYPH_H);
    draw_text(buf, width, pitch, 0, bottom_y, &text.bottom_left);
    let bottom_right_x = width.saturating_sub(text.bottom_right.len() as u32 * GLYPH_W);
    draw_text(buf, width, pitch, bottom_right_x, bottom_y, &text.bottom_right);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_text_paints_non_space_glyph_cells() {
        let width = 32;
        let height = 16;
        let pitch = width * 2;
        let mut buf = vec![0u8; (pitch * height) as usize];
        draw_text(&mut buf, width, pitch, 0, 0, "A");
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn draw_skips_blank_space_characters() {
        let width = 32;
        let height = 16;
        let pitch = width * 2;
        let mut buf = vec![0u8; (pitch * height) as usize];
        draw_text(&mut buf, width, pitch, 0, 0, " ");
        assert!(buf.iter().all(|&b| b == 0));
    }
}
