//! Audio output.
//!
//! Interleaved stereo samples delivered through the core's audio
//! callbacks are buffered in a fixed-size ring and drained by a
//! `tinyaudio` output device running on its own thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

/// Output stream target latency.
const LATENCY_MS: usize = 100;

static RING: OnceLock<Mutex<HeapRb<i16>>> = OnceLock::new();
static CAPACITY: OnceLock<usize> = OnceLock::new();
static UNDERRUNS: AtomicU64 = AtomicU64::new(0);

/// Initializes the audio ring for `sample_rate`. A second call before
/// [`reset`] is a no-op: only one core's audio stream is ever live.
pub fn init(sample_rate: u32) {
    let frames = (sample_rate as usize * LATENCY_MS / 1000).max(1);
    let capacity = frames * 2; // stereo
    CAPACITY.get_or_init(|| capacity);
    RING.get_or_init(|| Mutex::new(HeapRb::new(capacity)));
}

/// Drops the ring so a subsequent [`init`] (e.g. after `SET_SYSTEM_AV_INFO`
/// changes the sample rate) starts from an empty buffer.
pub fn reset(sample_rate: u32) {
    let frames = (sample_rate as usize * LATENCY_MS / 1000).max(1);
    let capacity = frames * 2;
    if let Some(ring) = RING.get() {
        *ring.lock() = HeapRb::new(capacity);
    } else {
        let _ = RING.get_or_init(|| Mutex::new(HeapRb::new(capacity)));
    }
}

/// Pushes one interleaved stereo sample, dropping it silently if the
/// ring is full.
pub fn push(left: i16, right: i16) {
    if let Some(ring) = RING.get() {
        let mut ring = ring.lock();
        let _ = ring.try_push(left);
        let _ = ring.try_push(right);
    }
}

/// Pushes a batch of interleaved stereo samples, returning the number of
/// stereo frames accepted. Per the libretro batch contract, a caller who
/// wants to report every frame consumed regardless (fast-forward) should
/// ignore this return value.
pub fn push_batch(samples: &[i16]) -> usize {
    let Some(ring) = RING.get() else { return 0 };
    let mut ring = ring.lock();
    let mut frames = 0;
    for pair in samples.chunks_exact(2) {
        if ring.vacant_len() < 2 {
            break;
        }
        let _ = ring.try_push(pair[0]);
        let _ = ring.try_push(pair[1]);
        frames += 1;
    }
    frames
}

/// Pulls one sample in device-native `f32` form. Records an underrun and
/// returns silence if the ring is empty.
fn pull() -> f32 {
    let Some(ring) = RING.get() else { return 0.0 };
    match ring.lock().try_pop() {
        Some(raw) => f32::from(raw) / f32::from(i16::MAX),
        None => {
            UNDERRUNS.fetch_add(1, Ordering::Relaxed);
            0.0
        }
    }
}

/// Monotonic count of device pulls that found nothing buffered. The CPU
/// governor's panic path watches this counter for an increase.
#[must_use]
pub fn underrun_count() -> u64 {
    UNDERRUNS.load(Ordering::Relaxed)
}

/// Occupied fraction of the ring, `0.0..=1.0`.
#[must_use]
pub fn occupancy() -> f32 {
    match (RING.get(), CAPACITY.get()) {
        (Some(ring), Some(&capacity)) if capacity > 0 => {
            let occupied = ring.lock().occupied_len();
            occupied as f32 / capacity as f32
        }
        _ => 0.0,
    }
}

/// Opens the output device and starts pulling from the ring. The
/// returned handle must be kept alive for the duration of playback;
/// dropping it (or calling `close` on it) stops the stream.
pub fn open_device(sample_rate: u32) -> anyhow::Result<Box<dyn tinyaudio::BaseAudioOutputDevice>> {
    let channel_sample_count = (sample_rate as usize * LATENCY_MS / 1000).max(1);
    let params = tinyaudio::OutputDeviceParameters {
        channels_count: 2,
        sample_rate: sample_rate as usize,
        channel_sample_count,
    };

    tinyaudio::run_output_device(params, move |data| {
        for sample in data.iter_mut() {
            *sample = pull();
        }
    })
    .map_err(|err| anyhow::anyhow!("failed to open audio output device: {err}"))
}
