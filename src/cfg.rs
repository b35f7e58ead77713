//! Application configuration.
//!
//! Reads the handful of tunables that parameterize the core subsystems
//! (pacing, governing, scaling) from a line-oriented `key = value` format.
//! A key prefixed with `-` is *locked*: present so the frontend can report
//! it, but not overridable by anything downstream of this load (e.g. a
//! future in-game menu, which is out of scope here).

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind::NotFound;
use std::path::Path;

use thiserror::Error;

use crate::governor::GovernorConfig;
use crate::video::{ScalePolicy, Sharpness};

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error caused by loading or parsing the configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading the configuration file failed.
    #[error("reading configuration failed")]
    Read(#[from] std::io::Error),
    /// A line could not be parsed as `key = value`.
    #[error("malformed configuration line: {0:?}")]
    Parse(String),
}

/// A loaded configuration entry.
#[derive(Clone, Debug)]
struct Entry {
    value: String,
    locked: bool,
}

/// Application configuration.
///
/// Values are resolved lazily by name rather than through a larger
/// serde-driven schema, since the option set this frontend actually reads
/// is small and fixed.
#[derive(Clone, Debug, Default)]
pub struct Config {
    entries: HashMap<String, Entry>,
}

impl Config {
    /// Loads configuration from a file.
    ///
    /// A missing file is not an error; it yields an empty configuration, so
    /// every tunable falls back to its default.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but could not be read, or if a
    /// non-blank, non-comment line does not match `[-]key = value`.
    pub fn load(path: &Path) -> Result<Self> {
        let body = match fs::read_to_string(path) {
            Ok(body) => body,
            Err(err) if err.kind() == NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        Self::parse(&body)
    }

    /// Parses configuration from its textual representation.
    fn parse(body: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::Parse(line.to_string()))?;
            let key = key.trim();
            let (key, locked) = match key.strip_prefix('-') {
                Some(key) => (key, true),
                None => (key, false),
            };
            if key.is_empty() {
                return Err(Error::Parse(line.to_string()));
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.trim().to_string(),
                    locked,
                },
            );
        }
        Ok(Self { entries })
    }

    /// Serializes the configuration back to the `key = value` format.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut lines: Vec<_> = self
            .entries
            .iter()
            .map(|(key, entry)| {
                let prefix = if entry.locked { "-" } else { "" };
                format!("{prefix}{key} = {value}", value = entry.value)
            })
            .collect();
        lines.sort();
        lines.join("\n")
    }

    /// Returns whether `key` is locked against override.
    #[must_use]
    pub fn is_locked(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.locked)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.value.as_str())
    }

    /// Reads the configured scaling policy, defaulting to [`ScalePolicy::Aspect`].
    #[must_use]
    pub fn scale_policy(&self) -> ScalePolicy {
        match self.get("video.scale") {
            Some("native") => ScalePolicy::Native,
            Some("fullscreen") => ScalePolicy::Fullscreen,
            Some("cropped") => ScalePolicy::Cropped,
            _ => ScalePolicy::Aspect,
        }
    }

    /// Reads the configured interpolation sharpness, defaulting to
    /// [`Sharpness::Sharp`].
    #[must_use]
    pub fn sharpness(&self) -> Sharpness {
        match self.get("video.sharpness") {
            Some("crisp") => Sharpness::Crisp,
            Some("soft") => Sharpness::Soft,
            _ => Sharpness::Sharp,
        }
    }

    /// Whether the debug overlay should be drawn, defaulting to `false`.
    #[must_use]
    pub fn overlay_enabled(&self) -> bool {
        self.get("video.overlay") == Some("true")
    }

    /// Reads the configured minimum CPU frequency in kHz, if any.
    #[must_use]
    pub fn min_freq_khz(&self) -> Option<u32> {
        self.get("cpu.min_freq_khz").and_then(|v| v.parse().ok())
    }

    /// Applies configured overrides onto a default [`GovernorConfig`].
    #[must_use]
    pub fn governor_config(&self) -> GovernorConfig {
        let mut cfg = GovernorConfig::default();
        if let Some(min) = self.min_freq_khz() {
            cfg.min_freq_khz = min;
        }
        if let Some(util) = self.get("cpu.target_util").and_then(|v| v.parse().ok()) {
            cfg.target_util = util;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let cfg = Config::parse("video.scale = cropped\n-cpu.min_freq_khz = 200000\n").unwrap();
        assert_eq!(cfg.get("video.scale"), Some("cropped"));
        assert_eq!(cfg.min_freq_khz(), Some(200_000));
        assert!(cfg.is_locked("cpu.min_freq_khz"));
        assert!(!cfg.is_locked("video.scale"));
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        let cfg = Config::parse("\n# a comment\n\nvideo.scale = native\n").unwrap();
        assert_eq!(cfg.get("video.scale"), Some("native"));
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(Config::parse("not a valid line").is_err());
    }

    #[test]
    fn missing_file_yields_default() {
        let cfg = Config::load(Path::new("/nonexistent/path/to/corevex.cfg")).unwrap();
        assert_eq!(cfg.scale_policy(), ScalePolicy::Aspect);
    }

    #[test]
    fn sharpness_and_overlay_default_and_parse() {
        let cfg = Config::default();
        assert_eq!(cfg.sharpness(), Sharpness::Sharp);
        assert!(!cfg.overlay_enabled());

        let cfg = Config::parse("video.sharpness = soft\nvideo.overlay = true\n").unwrap();
        assert_eq!(cfg.sharpness(), Sharpness::Soft);
        assert!(cfg.overlay_enabled());
    }
}
