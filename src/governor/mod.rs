//! Adaptive CPU governor.
//!
//! Keeps the 90th-percentile per-frame execution time near a target
//! fraction of the frame budget, preferring the lowest frequency that
//! still sustains real-time emulation. A distinct emergency path
//! preempts normal scheduling when the audio sink reports an underrun.

mod worker;

pub use worker::{FrequencySetter, Worker};

use std::sync::Arc;

use parking_lot::Mutex;

/// Frame-execution-time samples retained for percentile calculation.
const RING_SLOTS: usize = 64;

/// Tunables for the decision algorithm. See module docs for the defaults
/// applied by [`GovernorConfig::default`].
#[derive(Clone, Copy, Debug)]
pub struct GovernorConfig {
    /// Frames per decision window.
    pub window_frames: u32,
    /// Utilization percent above which the governor considers boosting.
    pub util_high: u32,
    /// Utilization percent below which the governor considers reducing.
    pub util_low: u32,
    /// Utilization percent targeted by a boost or reduce prediction.
    pub target_util: u32,
    /// Consecutive high-utilization windows required before boosting.
    pub boost_windows: u32,
    /// Consecutive low-utilization windows required before reducing.
    pub reduce_windows: u32,
    /// Frames to hold off decisions after a fresh game load.
    pub startup_grace: u32,
    /// Frequencies below this value (kHz) are filtered out entirely.
    pub min_freq_khz: u32,
    /// Maximum number of indices a single reduce decision may drop.
    pub max_step_down: usize,
    /// Indices added to the current index on a panic.
    pub panic_step_up: usize,
    /// Panics accumulated at an index before it is blocked from reduction.
    pub panic_block_threshold: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            window_frames: 30,
            util_high: 85,
            util_low: 55,
            target_util: 70,
            boost_windows: 2,
            reduce_windows: 4,
            startup_grace: 300,
            min_freq_khz: 0,
            max_step_down: 1,
            panic_step_up: 2,
            panic_block_threshold: 3,
        }
    }
}

/// Outcome of a single [`Governor::update`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Fast-forwarding, menu open, or still within the startup grace period.
    Skip,
    /// Window not yet complete, or utilization sits between the thresholds.
    None,
    /// Frequency raised due to sustained high utilization.
    Boost,
    /// Frequency lowered due to sustained low utilization.
    Reduce,
    /// Frequency raised in response to an audio underrun.
    Panic,
}

/// How the governor maps decisions to a CPU frequency.
#[derive(Clone, Debug)]
enum Mode {
    /// At least two frequencies survived filtering; decisions move through
    /// the sorted frequency array directly.
    Granular { frequencies: Vec<u32> },
    /// Fewer than two frequencies were available; decisions step through
    /// three presets derived from the maximum detected frequency.
    Fallback { presets: [u32; 3] },
}

impl Mode {
    fn len(&self) -> usize {
        match self {
            Self::Granular { frequencies } => frequencies.len(),
            Self::Fallback { .. } => 3,
        }
    }

    fn max_index(&self) -> usize {
        self.len() - 1
    }

    fn freq_khz(&self, index: usize) -> u32 {
        match self {
            Self::Granular { frequencies } => frequencies[index],
            Self::Fallback { presets } => presets[index],
        }
    }

    fn is_granular(&self) -> bool {
        matches!(self, Self::Granular { .. })
    }
}

/// Index of the frequency table entry nearest to `target_khz`, restricted
/// to `lo..=hi`. Ties resolve to the smaller index.
fn nearest_index(frequencies: &[u32], target_khz: u32, lo: usize, hi: usize) -> usize {
    let mut best = lo;
    let mut best_diff = u32::MAX;
    for (i, &freq) in frequencies.iter().enumerate().take(hi + 1).skip(lo) {
        let diff = freq.abs_diff(target_khz);
        if diff < best_diff {
            best_diff = diff;
            best = i;
        }
    }
    best
}

/// Filters and sorts detected frequencies, dropping anything below
/// `min_freq_khz`.
fn detect_frequencies(mut frequencies: Vec<u32>, min_freq_khz: u32) -> Vec<u32> {
    frequencies.retain(|&f| f >= min_freq_khz);
    frequencies.sort_unstable();
    frequencies
}

/// Derives the three fallback presets (powersave/normal/performance) from
/// the full, unfiltered frequency table.
fn fallback_presets(detected: &[u32]) -> [u32; 3] {
    let max = detected.iter().copied().max().unwrap_or(0);
    let mut sorted = detected.to_vec();
    sorted.sort_unstable();
    let nearest_to = |fraction: f64| -> u32 {
        if sorted.is_empty() {
            0
        } else {
            let target = (f64::from(max) * fraction) as u32;
            sorted[nearest_index(&sorted, target, 0, sorted.len() - 1)]
        }
    };
    [nearest_to(0.55), nearest_to(0.80), max]
}

/// Current/target indices shared with the [`Worker`] thread.
#[derive(Debug, Default)]
struct Shared {
    current_index: usize,
    target_index: usize,
}

/// The adaptive CPU governor.
pub struct Governor {
    mode: Mode,
    config: GovernorConfig,
    shared: Arc<Mutex<Shared>>,
    ring: [u32; RING_SLOTS],
    ring_cursor: usize,
    frame_time_count: u64,
    high_windows: u32,
    low_windows: u32,
    startup_frames: u32,
    panic_cooldown: u32,
    last_underrun: u64,
    panic_histogram: Vec<u32>,
    frame_count: u32,
    frame_budget_us: u32,
}

impl Governor {
    /// Constructs a governor from the device's detected CPU frequencies
    /// (kHz, any order) and the game's declared frame rate.
    #[must_use]
    pub fn new(detected_khz: Vec<u32>, game_fps: f64, config: GovernorConfig) -> Self {
        let filtered = detect_frequencies(detected_khz.clone(), config.min_freq_khz);
        let mode = if filtered.len() >= 2 {
            Mode::Granular {
                frequencies: filtered,
            }
        } else {
            Mode::Fallback {
                presets: fallback_presets(&detected_khz),
            }
        };
        let max_index = mode.max_index();
        let frame_budget_us = frame_budget_us(game_fps);

        let mut governor = Self {
            mode,
            config,
            shared: Arc::new(Mutex::new(Shared::default())),
            ring: [0; RING_SLOTS],
            ring_cursor: 0,
            frame_time_count: 0,
            high_windows: 0,
            low_windows: 0,
            startup_frames: 0,
            panic_cooldown: 0,
            last_underrun: 0,
            panic_histogram: vec![0; max_index + 1],
            frame_count: 0,
            frame_budget_us,
        };
        // Apply the performance preset immediately: scaling down over the
        // first windows costs less than stuttering at startup.
        let mut shared = governor.shared.lock();
        shared.current_index = max_index;
        shared.target_index = max_index;
        drop(shared);
        governor
    }

    /// Places the governor directly at a known index, bypassing the
    /// startup preset. Used in tests to reach a specific steady state.
    #[cfg(test)]
    fn with_index(mut self, index: usize) -> Self {
        let mut shared = self.shared.lock();
        shared.current_index = index;
        shared.target_index = index;
        drop(shared);
        self.startup_frames = self.config.startup_grace;
        self
    }

    /// Spawns the worker thread that applies frequency changes.
    #[must_use]
    pub fn spawn_worker(&self, setter: impl FrequencySetter + Send + 'static) -> Worker {
        Worker::spawn(Arc::clone(&self.shared), self.mode_frequencies(), setter)
    }

    fn mode_frequencies(&self) -> Vec<u32> {
        match &self.mode {
            Mode::Granular { frequencies } => frequencies.clone(),
            Mode::Fallback { presets } => presets.to_vec(),
        }
    }

    /// Updates the frame budget when the core reports a new frame rate.
    pub fn set_game_fps(&mut self, game_fps: f64) {
        self.frame_budget_us = frame_budget_us(game_fps);
    }

    /// Records the execution time of the most recent `run` call, in
    /// microseconds.
    pub fn record_frame_time(&mut self, micros: u32) {
        self.ring[self.ring_cursor] = micros;
        self.ring_cursor = (self.ring_cursor + 1) % RING_SLOTS;
        self.frame_time_count += 1;
    }

    /// Number of valid samples currently held in the ring buffer.
    fn sample_count(&self) -> usize {
        self.frame_time_count.min(RING_SLOTS as u64) as usize
    }

    /// 90th-percentile of the samples currently in the ring buffer.
    fn percentile90(&self) -> u32 {
        let n = self.sample_count();
        let mut samples: Vec<u32> = self.ring[..n].to_vec();
        samples.sort_unstable();
        let idx = (n * 90 / 100).min(n.saturating_sub(1));
        samples[idx]
    }

    fn current_index(&self) -> usize {
        self.shared.lock().current_index
    }

    fn set_target(&self, index: usize) {
        self.shared.lock().target_index = index;
    }

    /// Runs one decision cycle. Call exactly once per frame.
    pub fn update(&mut self, fast_forward: bool, show_menu: bool, current_underruns: u64) -> Decision {
        if fast_forward || show_menu {
            return Decision::Skip;
        }
        if self.startup_frames < self.config.startup_grace {
            self.startup_frames += 1;
            return Decision::Skip;
        }

        let current_index = self.current_index();
        let max_index = self.mode.max_index();

        if current_underruns > self.last_underrun {
            if current_index != max_index {
                self.panic_histogram[current_index] =
                    self.panic_histogram[current_index].saturating_add(1);
                if self.panic_histogram[current_index] >= self.config.panic_block_threshold {
                    for slot in &mut self.panic_histogram[..=current_index] {
                        *slot = (*slot).max(self.config.panic_block_threshold);
                    }
                }
                let target = (current_index + self.config.panic_step_up).min(max_index);
                self.set_target(target);
                self.high_windows = 0;
                self.low_windows = 0;
                self.panic_cooldown = 8;
                self.last_underrun = current_underruns;
                return Decision::Panic;
            }
            self.last_underrun = current_underruns;
        }

        self.frame_count += 1;
        if self.frame_count < self.config.window_frames {
            return Decision::None;
        }

        let samples = self.sample_count();
        if samples < 5 {
            self.frame_count = 0;
            return Decision::None;
        }

        let p90_us = self.percentile90();
        let util = (u64::from(p90_us) * 100 / u64::from(self.frame_budget_us)).min(200) as u32;

        let decision = if util > self.config.util_high {
            self.high_windows += 1;
            self.low_windows = 0;
            if self.high_windows >= self.config.boost_windows && current_index != max_index {
                let new_index = self.boost_target(current_index, max_index, util);
                self.set_target(new_index);
                self.high_windows = 0;
                Some(Decision::Boost)
            } else {
                None
            }
        } else if util < self.config.util_low {
            self.low_windows += 1;
            self.high_windows = 0;
            if self.low_windows >= self.config.reduce_windows
                && self.panic_cooldown == 0
                && current_index > 0
            {
                self.reduce_target(current_index, util).map(|new_index| {
                    self.set_target(new_index);
                    self.low_windows = 0;
                    Decision::Reduce
                })
            } else {
                None
            }
        } else {
            self.high_windows = 0;
            self.low_windows = 0;
            None
        };

        if self.panic_cooldown > 0 {
            self.panic_cooldown -= 1;
        }
        self.frame_count = 0;
        decision.unwrap_or(Decision::None)
    }

    fn boost_target(&self, current_index: usize, max_index: usize, util: u32) -> usize {
        match &self.mode {
            Mode::Granular { frequencies } => {
                let current_freq = frequencies[current_index];
                let needed = current_freq as u64 * u64::from(util) / u64::from(self.config.target_util);
                nearest_index(frequencies, needed as u32, current_index + 1, max_index)
            }
            Mode::Fallback { .. } => (current_index + 1).min(max_index),
        }
    }

    fn reduce_target(&self, current_index: usize, util: u32) -> Option<usize> {
        let step_floor = current_index.saturating_sub(self.config.max_step_down.max(1));
        let proposed = match &self.mode {
            Mode::Granular { frequencies } => {
                let current_freq = frequencies[current_index];
                let needed = current_freq as u64 * u64::from(util) / u64::from(self.config.target_util);
                nearest_index(frequencies, needed as u32, 0, current_index - 1).max(step_floor)
            }
            Mode::Fallback { .. } => step_floor,
        };

        let mut new_index = proposed;
        while new_index < current_index && self.panic_histogram[new_index] >= self.config.panic_block_threshold {
            new_index += 1;
        }
        (new_index < current_index).then_some(new_index)
    }

    /// Returns the frequency (kHz) the governor currently reports as
    /// applied. Used for the debug overlay.
    #[must_use]
    pub fn current_freq_khz(&self) -> u32 {
        self.mode.freq_khz(self.current_index())
    }

    /// Returns whether the governor is operating in granular mode (as
    /// opposed to the 3-level fallback).
    #[must_use]
    pub fn is_granular(&self) -> bool {
        self.mode.is_granular()
    }
}

/// Frame budget in microseconds for a declared frame rate.
fn frame_budget_us(game_fps: f64) -> u32 {
    if game_fps <= 0.0 {
        16_667
    } else {
        (1_000_000.0 / game_fps) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granular(config: GovernorConfig) -> Governor {
        Governor::new(vec![400_000, 600_000, 800_000, 1_000_000], 60.0, config)
    }

    #[test]
    fn frequency_filter_drops_below_minimum() {
        let filtered = detect_frequencies(vec![200_000, 400_000, 600_000], 400_000);
        assert!(filtered.iter().all(|&f| f >= 400_000));
        assert_eq!(filtered, vec![400_000, 600_000]);
    }

    #[test]
    fn nearest_index_ties_favor_lower() {
        let freqs = [400_000, 600_000, 800_000, 1_000_000];
        // 500_000 is equidistant from 400_000 and 600_000.
        assert_eq!(nearest_index(&freqs, 500_000, 0, 3), 0);
        assert_eq!(nearest_index(&freqs, 1_000_000, 0, 3), 3);
    }

    #[test]
    fn percentile_is_ninth_of_ten_sorted() {
        let mut gov = granular(GovernorConfig::default());
        let values: [u32; 10] = [5, 1, 9, 3, 7, 2, 8, 4, 6, 10];
        for v in values {
            gov.record_frame_time(v);
        }
        assert_eq!(gov.percentile90(), 10);
    }

    #[test]
    fn panic_path_boosts_and_sets_cooldown() {
        let config = GovernorConfig::default();
        let gov = granular(config).with_index(1);
        let mut gov = gov;
        let decision = gov.update(false, false, 1);
        assert_eq!(decision, Decision::Panic);
        assert_eq!(gov.current_index(), 1); // current unchanged; worker applies target
        assert_eq!(gov.shared.lock().target_index, 3);
        assert_eq!(gov.panic_cooldown, 8);
    }

    #[test]
    fn panic_blocking_prevents_future_reduction_at_or_below_index() {
        let config = GovernorConfig {
            panic_block_threshold: 1,
            ..GovernorConfig::default()
        };
        let mut gov = granular(config).with_index(1);
        let decision = gov.update(false, false, 1);
        assert_eq!(decision, Decision::Panic);
        assert!(gov.panic_histogram[0] >= 1);
        assert!(gov.panic_histogram[1] >= 1);
        // Index 0 and 1 are now blocked; a reduce targeting them must be
        // abandoned rather than selecting a blocked index.
        assert_eq!(gov.reduce_target(2, 10), None);
    }

    #[test]
    fn granular_boost_fires_at_high_utilization() {
        let config = GovernorConfig {
            boost_windows: 2,
            ..GovernorConfig::default()
        };
        let mut gov = granular(config).with_index(1);
        gov.high_windows = 1;
        gov.frame_count = config.window_frames - 1;
        for _ in 0..30 {
            gov.record_frame_time(15_000);
        }
        let decision = gov.update(false, false, 0);
        assert_eq!(decision, Decision::Boost);
        assert!(gov.shared.lock().target_index > 1);
    }
}
