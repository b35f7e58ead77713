//! The aggregate that owns every ambient subsystem for the lifetime of one
//! loaded core: window, video pipeline, pacer, governor, audio, and config.
//!
//! [`HostContext`] implements [`HostCallbacks`], so it is what the core's
//! `extern "C"` trampolines dispatch into; it also stays on the main loop's
//! stack (see [`crate::core::Core::load`]) so the loop can keep driving it
//! directly between calls into the core.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::cfg::Config;
use crate::core::{Core, HostCallbacks};
use crate::def;
use crate::dir;
use crate::game::Game;
use crate::governor::{Decision, FrequencySetter, Governor, Worker};
use crate::input::{self, Snapshot};
use crate::pacer::Pacer;
use crate::persist::{self, slot, MemoryKind, PersistResult};
use crate::audio;
use crate::video::{Geometry, OverlayText, Pipeline, PixelFormat, PresentedFrame, Quadrant, Rect, Scaler, ScalerResult};

/// Applies governor frequency decisions. No concrete platform backend is
/// wired up here (cpufreq/sysfs access is device-specific and out of
/// scope); this only logs so the governor's decision loop still has
/// somewhere to report to.
struct LoggingFrequencySetter;

impl FrequencySetter for LoggingFrequencySetter {
    fn set_freq_khz(&mut self, khz: u32) -> bool {
        log::trace!("governor requested {khz} kHz");
        true
    }
}

/// Reads the device's available CPU frequencies from the standard cpufreq
/// sysfs listing. Returns an empty list (and the governor falls back to its
/// three-preset mode) on any device that doesn't expose one.
fn detect_cpu_frequencies() -> Vec<u32> {
    let raw = match fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/scaling_available_frequencies") {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    raw.split_whitespace().filter_map(|tok| tok.parse().ok()).collect()
}

pub struct HostContext {
    window: Window,
    pipeline: Pipeline,
    pacer: Pacer,
    governor: Governor,
    worker: Worker,
    game: Option<Game>,
    input: Snapshot,
    geometry: Geometry,
    game_fps: f64,
    last_frame_micros: u32,
    fast_forward: bool,
    overlay_enabled: bool,
    device_w: u32,
    device_h: u32,
    present_buf: Vec<u32>,
    last_scaler: Option<ScalerResult>,
    audio_device: Option<Box<dyn tinyaudio::BaseAudioOutputDevice>>,
}

impl HostContext {
    /// Opens the display window and constructs every subsystem it owns.
    ///
    /// # Errors
    ///
    /// Returns an error if the display window could not be opened.
    pub fn new(config: Config, device_w: u32, device_h: u32) -> Result<Self> {
        let window = Window::new(
            def::NAME,
            device_w as usize,
            device_h as usize,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|err| anyhow::anyhow!("failed to open display window: {err}"))?;

        let mut pipeline = Pipeline::new(device_w, device_h);
        pipeline.set_policy(config.scale_policy(), config.sharpness());
        let overlay_enabled = config.overlay_enabled();
        pipeline.set_overlay_enabled(overlay_enabled);

        let game_fps = 60.0;
        let pacer = Pacer::new(game_fps, 60.0);
        let governor = Governor::new(detect_cpu_frequencies(), game_fps, config.governor_config());
        let worker = governor.spawn_worker(LoggingFrequencySetter);

        Ok(Self {
            window,
            pipeline,
            pacer,
            governor,
            worker,
            game: None,
            input: Snapshot::default(),
            geometry: Geometry::default(),
            game_fps,
            last_frame_micros: 0,
            fast_forward: false,
            overlay_enabled,
            device_w,
            device_h,
            present_buf: vec![0xFF00_0000; (device_w * device_h) as usize],
            last_scaler: None,
            audio_device: None,
        })
    }

    /// Records the title now open, for the duration of this process.
    pub fn set_game(&mut self, game: Game) {
        self.game = Some(game);
    }

    /// Reads battery RAM, then RTC, then the core's declared AV info (the
    /// mandatory lifecycle order after a successful `load_game`), and
    /// finally, if a resume breadcrumb is present, the auto-resume save
    /// state into the freshly loaded core.
    pub fn restore_on_load(&mut self, core: &mut Core, title: &str) {
        let dir = dir::save();
        log_persist("sram load", persist::read_memory(core, &slot::sram_path(&dir, title), MemoryKind::Sram));
        log_persist("rtc load", persist::read_memory(core, &slot::rtc_path(&dir, title), MemoryKind::Rtc));

        let av = core.system_av_info();
        self.apply_av_info(av.width, av.height, av.aspect, av.fps, av.sample_rate);

        match slot::take_resume_breadcrumb(&dir) {
            Ok(Some(requested)) => {
                let path = slot::state_path(&dir, title, requested);
                let result = persist::read_state(core, &path);
                log_persist("auto-resume", result);
                if result == PersistResult::Ok {
                    self.pacer.reset();
                }
            }
            Ok(None) => {}
            Err(err) => log::warn!("failed to read resume breadcrumb: {err}"),
        }
    }

    /// Writes battery RAM, RTC, and the auto-resume save state before the
    /// core is unloaded.
    pub fn persist_on_close(&self, core: &mut Core, title: &str) {
        let dir = dir::save();
        log_persist("sram save", persist::write_memory(core, &slot::sram_path(&dir, title), MemoryKind::Sram));
        log_persist("rtc save", persist::write_memory(core, &slot::rtc_path(&dir, title), MemoryKind::Rtc));
        log_persist("auto-resume save", persist::write_state(core, &slot::resume_state_path(&dir, title)));
    }

    /// Saves to a numbered manual slot, `0..=8`.
    pub fn save_slot(&self, core: &Core, title: &str, requested_slot: u8) -> PersistResult {
        if !slot::is_manual_slot_allowed(requested_slot) {
            return PersistResult::NoSupport;
        }
        persist::write_state(core, &slot::state_path(&dir::save(), title, requested_slot))
    }

    /// Loads from a numbered manual slot, `0..=8`.
    pub fn load_slot(&mut self, core: &mut Core, title: &str, requested_slot: u8) -> PersistResult {
        if !slot::is_manual_slot_allowed(requested_slot) {
            return PersistResult::NoSupport;
        }
        let result = persist::read_state(core, &slot::state_path(&dir::save(), title, requested_slot));
        if result == PersistResult::Ok {
            self.pacer.reset();
        }
        result
    }

    /// Runs the main loop until the window is closed, Escape is pressed, or
    /// `quit` is set (e.g. by a Ctrl-C handler).
    ///
    /// # Errors
    ///
    /// Returns an error if presenting a frame to the window fails.
    pub fn run(&mut self, core: &mut Core, quit: &Arc<AtomicBool>) -> Result<()> {
        while self.window.is_open() && !self.window.is_key_down(Key::Escape) && !quit.load(Ordering::Relaxed) {
            self.fast_forward = self.window.is_key_down(Key::Tab);
            if self.window.is_key_pressed(Key::F1, KeyRepeat::No) {
                self.swap_disc(core);
            }

            if self.pacer.step() {
                let start = Instant::now();
                core.run();
                self.last_frame_micros = start.elapsed().as_micros().min(u128::from(u32::MAX)) as u32;
                self.governor.record_frame_time(self.last_frame_micros);
            }

            self.window
                .update_with_buffer(&self.present_buf, self.device_w as usize, self.device_h as usize)
                .context("presenting frame to the display window")?;

            let now = Instant::now();
            self.pacer.record_vsync(now);

            let decision = self.governor.update(self.fast_forward, false, audio::underrun_count());
            match decision {
                Decision::Boost => log::debug!("governor boosted to {} kHz", self.governor.current_freq_khz()),
                Decision::Reduce => log::debug!("governor reduced to {} kHz", self.governor.current_freq_khz()),
                Decision::Panic => log::warn!("governor panicked to {} kHz after an audio underrun", self.governor.current_freq_khz()),
                Decision::Skip | Decision::None => {}
            }
        }
        Ok(())
    }

    /// Applies declared AV info (geometry, aspect, fps, sample rate) from
    /// either the host's own `get_system_av_info` query on load or a core's
    /// later `SET_SYSTEM_AV_INFO` environment call: rebuilds the pacer
    /// against the new fps, reinitializes the audio device, and
    /// invalidates the scaler.
    fn apply_av_info(&mut self, width: u32, height: u32, aspect: f64, fps: f64, sample_rate: f64) {
        self.geometry.width = width;
        self.geometry.height = height;
        self.geometry.aspect = aspect;
        self.pipeline.set_geometry(self.geometry);

        self.game_fps = fps;
        self.governor.set_game_fps(fps);
        let display_hz = if self.pacer.is_measurement_stable() { self.pacer.get_measured_hz() } else { 60.0 };
        self.pacer = Pacer::new(fps, display_hz);

        audio::reset(sample_rate as u32);
        self.audio_device = None;
        match audio::open_device(sample_rate as u32) {
            Ok(device) => self.audio_device = Some(device),
            Err(err) => log::warn!("failed to open audio device: {err}"),
        }
    }

    /// Swaps to the next disc image for the open multi-disc title and
    /// writes the last-disc breadcrumb a parent launcher reads back. A
    /// no-op if the core never registered a disk-control interface or only
    /// has one image.
    fn swap_disc(&self, core: &Core) {
        let Some(game) = &self.game else { return };
        if let Some(index) = core.swap_next_disc() {
            log::info!("swapped to disc {index}");
            if let Err(err) = slot::write_last_disc_breadcrumb(&dir::save(), game.name(), index) {
                log::warn!("failed to write last-disc breadcrumb: {err}");
            }
        }
    }

    fn overlay_text(&self) -> Option<OverlayText> {
        if !self.overlay_enabled {
            return None;
        }
        let budget_us = if self.game_fps > 0.0 { 1_000_000.0 / self.game_fps } else { 16_667.0 };
        let cpu_pct = f64::from(self.last_frame_micros) / budget_us * 100.0;
        let fps_pct = if self.pacer.is_measurement_stable() && self.game_fps > 0.0 {
            self.pacer.get_measured_hz() / self.game_fps * 100.0
        } else {
            100.0
        };
        let scale_factor = self.last_scaler.map_or(1, |s| s.scale_factor);
        let freq_or_level = if self.governor.is_granular() {
            format!("{}kHz", self.governor.current_freq_khz())
        } else {
            format!("L{}", self.governor.current_freq_khz())
        };
        Some(OverlayText::build(
            fps_pct,
            cpu_pct,
            self.geometry.width,
            self.geometry.height,
            scale_factor,
            &freq_or_level,
            cpu_pct.min(200.0) as u32,
            (audio::occupancy() * 100.0) as u32,
            self.device_w,
            self.device_h,
        ))
    }

}

impl HostCallbacks for HostContext {
    fn video_frame(&mut self, data: Option<&[u8]>, width: u32, height: u32, pitch: usize) {
        let pitch = pitch as u32;
        if self.geometry.width != width || self.geometry.height != height || self.geometry.pitch != pitch {
            self.geometry.width = width;
            self.geometry.height = height;
            self.geometry.pitch = pitch;
            self.pipeline.set_geometry(self.geometry);
        }

        let Some(data) = data else {
            // The core asked to dupe the previous frame: leave the
            // presented buffer untouched.
            return;
        };

        let now = Instant::now();
        let overlay = self.overlay_text();
        if let Some(frame) = self.pipeline.present(data, self.fast_forward, overlay.as_ref(), now) {
            self.last_scaler = Some(frame.scaler);
            blit(&frame, frame.scaler, &mut self.present_buf, self.device_w, self.device_h);
        }
    }

    fn audio_sample(&mut self, left: i16, right: i16) {
        if self.fast_forward {
            return;
        }
        audio::push(left, right);
    }

    fn audio_sample_batch(&mut self, samples: &[i16]) -> usize {
        if self.fast_forward {
            return samples.len() / 2;
        }
        audio::push_batch(samples)
    }

    fn input_poll(&mut self) {
        self.input = Snapshot::poll(&self.window);
    }

    fn input_state(&mut self, port: u32, device: u32, _index: u32, id: u32) -> i16 {
        if port != 0 || device != input::DEVICE_JOYPAD {
            return 0;
        }
        self.input.joypad_state(id)
    }

    fn set_rotation(&mut self, rotation: Quadrant) {
        self.pipeline.set_rotation(rotation);
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> bool {
        self.pipeline.set_pixel_format(format);
        true
    }

    fn set_geometry(&mut self, width: u32, height: u32, aspect: f64) {
        if self.geometry.width != width || self.geometry.height != height || self.geometry.aspect != aspect {
            self.geometry.width = width;
            self.geometry.height = height;
            self.geometry.aspect = aspect;
            self.pipeline.set_geometry(self.geometry);
        }
    }

    fn set_system_av_info(&mut self, width: u32, height: u32, aspect: f64, fps: f64, sample_rate: f64) {
        self.apply_av_info(width, height, aspect, fps, sample_rate);
    }

    fn set_input_descriptors(&mut self, described: Vec<(u32, u32, u32, u32)>) {
        log::debug!("core registered {} input descriptor(s)", described.len());
    }

    fn set_disk_control_available(&mut self) {
        log::debug!("core registered a disk control interface");
    }

    fn set_controller_info_noted(&mut self) {
        log::debug!("core reported controller info");
    }

    fn log_message(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn system_dir(&self) -> PathBuf {
        dir::system()
    }

    fn save_dir(&self) -> PathBuf {
        dir::save()
    }

    fn is_fast_forwarding(&self) -> bool {
        self.fast_forward
    }

    fn fast_forward_speed(&self) -> f32 {
        def::FAST_FORWARD_SPEED
    }

    fn target_refresh_rate(&self) -> f64 {
        if self.pacer.is_measurement_stable() {
            self.pacer.get_measured_hz()
        } else {
            60.0
        }
    }

    fn rumble(&mut self, port: u32, effect: u32, strength: u16) -> bool {
        log::trace!("rumble request: port={port} effect={effect} strength={strength} (no haptics backend)");
        false
    }
}

fn log_persist(what: &str, result: PersistResult) {
    match result {
        PersistResult::Ok | PersistResult::NoSupport | PersistResult::FileNotFound => {
            log::debug!("{what}: {result:?}");
        }
        other => log::warn!("{what} failed: {other:?}"),
    }
}

/// Scales `frame`'s source rectangle into `dst`'s destination rectangle,
/// per the kernel `result.scaler` selected.
fn blit(frame: &PresentedFrame<'_>, result: ScalerResult, dst: &mut [u32], dst_w: u32, dst_h: u32) {
    dst.fill(0xFF00_0000);

    let Rect { x: sx0, y: sy0, w: sw, h: sh } = result.src;
    let Rect { x: dx0, y: dy0, w: dw, h: dh } = result.dst;
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
        return;
    }

    let x_ratio = f64::from(sw) / f64::from(dw);
    let y_ratio = f64::from(sh) / f64::from(dh);

    for row in 0..dh {
        let dst_y = dy0 + row;
        if dst_y >= dst_h {
            break;
        }
        let src_yf = f64::from(sy0) + f64::from(row) * y_ratio;
        for col in 0..dw {
            let dst_x = dx0 + col;
            if dst_x >= dst_w {
                break;
            }
            let src_xf = f64::from(sx0) + f64::from(col) * x_ratio;
            let argb = match result.scaler {
                Scaler::Nearest => sample_nearest(frame, src_xf, src_yf),
                Scaler::Bilinear => sample_bilinear(frame, src_xf, src_yf),
            };
            dst[(dst_y * dst_w + dst_x) as usize] = argb;
        }
    }
}

fn read_rgb565(frame: &PresentedFrame<'_>, x: u32, y: u32) -> u16 {
    let x = x.min(frame.width.saturating_sub(1));
    let y = y.min(frame.height.saturating_sub(1));
    let off = (y * frame.pitch + x * 2) as usize;
    u16::from_le_bytes([frame.buf[off], frame.buf[off + 1]])
}

fn rgb565_to_argb(px: u16) -> u32 {
    let r5 = u32::from((px >> 11) & 0x1F);
    let g6 = u32::from((px >> 5) & 0x3F);
    let b5 = u32::from(px & 0x1F);
    let r8 = (r5 << 3) | (r5 >> 2);
    let g8 = (g6 << 2) | (g6 >> 4);
    let b8 = (b5 << 3) | (b5 >> 2);
    0xFF00_0000 | (r8 << 16) | (g8 << 8) | b8
}

fn sample_nearest(frame: &PresentedFrame<'_>, xf: f64, yf: f64) -> u32 {
    rgb565_to_argb(read_rgb565(frame, xf.round() as u32, yf.round() as u32))
}

fn sample_bilinear(frame: &PresentedFrame<'_>, xf: f64, yf: f64) -> u32 {
    let x0 = xf.floor().max(0.0) as u32;
    let y0 = yf.floor().max(0.0) as u32;
    let tx = xf - f64::from(x0);
    let ty = yf - f64::from(y0);

    let channels = |x: u32, y: u32| -> (f64, f64, f64) {
        let argb = rgb565_to_argb(read_rgb565(frame, x, y));
        (
            f64::from((argb >> 16) & 0xFF),
            f64::from((argb >> 8) & 0xFF),
            f64::from(argb & 0xFF),
        )
    };

    let (r00, g00, b00) = channels(x0, y0);
    let (r10, g10, b10) = channels(x0 + 1, y0);
    let (r01, g01, b01) = channels(x0, y0 + 1);
    let (r11, g11, b11) = channels(x0 + 1, y0 + 1);

    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
    let r = lerp(lerp(r00, r10, tx), lerp(r01, r11, tx), ty) as u32;
    let g = lerp(lerp(g00, g10, tx), lerp(g01, g11, tx), ty) as u32;
    let b = lerp(lerp(b00, b10, tx), lerp(b01, b11, tx), ty) as u32;

    0xFF00_0000 | (r << 16) | (g << 8) | b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(color: u16, width: u32, height: u32) -> Vec<u8> {
        let mut buf = vec![0u8; (width * height * 2) as usize];
        for px in buf.chunks_exact_mut(2) {
            px.copy_from_slice(&color.to_le_bytes());
        }
        buf
    }

    #[test]
    fn rgb565_roundtrip_preserves_pure_channels() {
        let white = rgb565_to_argb(0xFFFF);
        assert_eq!(white, 0xFFFF_FFFF);
        let black = rgb565_to_argb(0x0000);
        assert_eq!(black, 0xFF00_0000);
    }

    #[test]
    fn nearest_blit_fills_destination_rect_with_source_color() {
        let buf = solid_frame(0xF800, 4, 4); // pure red at full RGB565 red bits
        let frame = PresentedFrame {
            buf: &buf,
            width: 4,
            height: 4,
            pitch: 8,
            scaler: ScalerResult {
                src: Rect { x: 0, y: 0, w: 4, h: 4 },
                dst: Rect { x: 2, y: 2, w: 8, h: 8 },
                scale_factor: 2,
                applied_aspect: 1.0,
                scaler: Scaler::Nearest,
            },
        };
        let mut dst = vec![0xFF00_0000u32; 16 * 16];
        blit(&frame, frame.scaler, &mut dst, 16, 16);

        let red = rgb565_to_argb(0xF800);
        assert_eq!(dst[2 * 16 + 2], red);
        assert_eq!(dst[9 * 16 + 9], red);
        assert_eq!(dst[0], 0xFF00_0000); // outside dst rect stays cleared
    }
}
