//! Render settings loaded from TOML.
//!
//! ```toml
//! [output]
//! sample_rate = 44100
//! channels = 2
//! bits = 16
//! oversampling = 1
//! format = "wav"
//!
//! [dither]
//! kind = "triangular"
//!
//! [metering]          # optional; omit to disable auto-mute
//! window_seconds = 1.0
//! mute_threshold = 0.99
//!
//! [io]
//! buffer_budget_bytes = 65536
//! device_queue_chunks = 16
//! critical_fraction = 0.25
//! drain_timeout_ms = 5000
//!
//! [progress]
//! tick_ms = 100
//! ```
//!
//! Every section and key is optional and falls back to the values above.
//! Raw values are only turned into `bounce-core` types through the
//! validating accessors ([`RenderConfig::sample_spec`] and friends).

use crate::{ConfigError, paths};
use bounce_core::{
    BitDepth, Channels, DitherKind, FileFormat, MAX_WINDOW_SECONDS, PeakWindow, SampleSpec,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on the oversampling factor.
pub const MAX_OVERSAMPLING: usize = 64;

/// Upper bound on the output sample rate in Hz.
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Complete render settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output format.
    pub output: OutputSettings,
    /// Dither selection.
    pub dither: DitherSettings,
    /// Optional auto-mute metering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metering: Option<MeteringSettings>,
    /// Destination tunables.
    pub io: IoSettings,
    /// Progress polling.
    pub progress: ProgressSettings,
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// 1 or 2.
    pub channels: u16,
    /// 8, 16 or 24.
    pub bits: u16,
    /// Generator rate multiple.
    pub oversampling: usize,
    /// `"wav"` or `"aiff"`.
    pub format: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bits: 16,
            oversampling: 1,
            format: "wav".to_string(),
        }
    }
}

/// `[dither]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DitherSettings {
    /// `none`, `rectangular`, `triangular` or `noise-shaped`.
    pub kind: String,
}

impl Default for DitherSettings {
    fn default() -> Self {
        Self {
            kind: DitherKind::default().name().to_string(),
        }
    }
}

/// `[metering]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringSettings {
    /// Sliding window length in seconds.
    pub window_seconds: f32,
    /// Mute while the window peak exceeds this level.
    pub mute_threshold: f32,
}

impl Default for MeteringSettings {
    fn default() -> Self {
        Self {
            window_seconds: 1.0,
            mute_threshold: 0.99,
        }
    }
}

/// `[io]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoSettings {
    /// Bytes buffered per file write.
    pub buffer_budget_bytes: usize,
    /// Device queue capacity in chunks.
    pub device_queue_chunks: usize,
    /// Device queue fraction treated as critical.
    pub critical_fraction: f32,
    /// Device drain timeout on normal finish.
    pub drain_timeout_ms: u64,
}

impl Default for IoSettings {
    fn default() -> Self {
        Self {
            buffer_budget_bytes: 64 * 1024,
            device_queue_chunks: 16,
            critical_fraction: 0.25,
            drain_timeout_ms: 5000,
        }
    }
}

impl IoSettings {
    /// Drain timeout as a duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// `[progress]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// Polling interval in milliseconds.
    pub tick_ms: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self { tick_ms: 100 }
    }
}

impl ProgressSettings {
    /// Polling interval as a duration.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl RenderConfig {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load the user's settings file, or defaults when it does not exist.
    pub fn load_user() -> Result<Self, ConfigError> {
        let path = paths::user_config_path();
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Output format as a validated [`SampleSpec`].
    pub fn sample_spec(&self) -> Result<SampleSpec, ConfigError> {
        let out = &self.output;
        let channels = Channels::from_count(out.channels).ok_or_else(|| {
            ConfigError::invalid("output.channels", format!("must be 1 or 2, got {}", out.channels))
        })?;
        let bits = BitDepth::from_bits(out.bits).ok_or_else(|| {
            ConfigError::invalid("output.bits", format!("must be 8, 16 or 24, got {}", out.bits))
        })?;
        if out.sample_rate == 0 || out.sample_rate > MAX_SAMPLE_RATE {
            return Err(ConfigError::invalid(
                "output.sample_rate",
                format!("must be in 1..={MAX_SAMPLE_RATE}, got {}", out.sample_rate),
            ));
        }
        Ok(SampleSpec::new(channels, bits, out.sample_rate))
    }

    /// Validated oversampling factor.
    pub fn oversampling(&self) -> Result<usize, ConfigError> {
        match self.output.oversampling {
            f @ 1..=MAX_OVERSAMPLING => Ok(f),
            f => Err(ConfigError::invalid(
                "output.oversampling",
                format!("must be in 1..={MAX_OVERSAMPLING}, got {f}"),
            )),
        }
    }

    /// Validated container format.
    pub fn file_format(&self) -> Result<FileFormat, ConfigError> {
        FileFormat::from_extension(&self.output.format).ok_or_else(|| {
            ConfigError::invalid(
                "output.format",
                format!("expected \"wav\" or \"aiff\", got {:?}", self.output.format),
            )
        })
    }

    /// Validated dither kind.
    pub fn dither_kind(&self) -> Result<DitherKind, ConfigError> {
        DitherKind::from_name(&self.dither.kind).ok_or_else(|| {
            ConfigError::invalid("dither.kind", format!("unknown kind {:?}", self.dither.kind))
        })
    }

    /// Check every setting, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sample_spec()?;
        self.oversampling()?;
        self.file_format()?;
        self.dither_kind()?;

        let out_rate = self.output.sample_rate;
        if let Some(metering) = &self.metering {
            let window_len = PeakWindow::duration_len(out_rate, metering.window_seconds);
            if window_len.is_none() {
                return Err(ConfigError::invalid(
                    "metering.window_seconds",
                    format!(
                        "must be in (0, {MAX_WINDOW_SECONDS}], got {}",
                        metering.window_seconds
                    ),
                ));
            }
            if !(metering.mute_threshold.is_finite() && metering.mute_threshold > 0.0) {
                return Err(ConfigError::invalid(
                    "metering.mute_threshold",
                    format!("must be a positive number, got {}", metering.mute_threshold),
                ));
            }
        }

        if self.io.buffer_budget_bytes == 0 {
            return Err(ConfigError::invalid("io.buffer_budget_bytes", "must be positive"));
        }
        if self.io.device_queue_chunks == 0 {
            return Err(ConfigError::invalid("io.device_queue_chunks", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.io.critical_fraction) {
            return Err(ConfigError::invalid(
                "io.critical_fraction",
                format!("must be in [0, 1], got {}", self.io.critical_fraction),
            ));
        }
        if self.progress.tick_ms == 0 {
            return Err(ConfigError::invalid("progress.tick_ms", "must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RenderConfig::default();
        config.validate().unwrap();
        let spec = config.sample_spec().unwrap();
        assert_eq!(spec.channels, Channels::Stereo);
        assert_eq!(spec.bits, BitDepth::Sixteen);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(config.file_format().unwrap(), FileFormat::Wav);
        assert_eq!(config.dither_kind().unwrap(), DitherKind::Triangular);
        assert!(config.metering.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = RenderConfig::from_toml(
            r#"
            [output]
            bits = 24
            format = "aiff"

            [metering]
            window_seconds = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.output.bits, 24);
        assert_eq!(config.output.sample_rate, 44100);
        assert_eq!(config.file_format().unwrap(), FileFormat::Aiff);
        let metering = config.metering.unwrap();
        assert_eq!(metering.window_seconds, 0.5);
        assert_eq!(metering.mute_threshold, 0.99);
    }

    #[test]
    fn rejects_unsupported_output() {
        let mut config = RenderConfig::default();
        config.output.bits = 32;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "output.bits", .. })
        ));

        let mut config = RenderConfig::default();
        config.output.channels = 6;
        assert!(matches!(
            config.sample_spec(),
            Err(ConfigError::Invalid { field: "output.channels", .. })
        ));

        let mut config = RenderConfig::default();
        config.output.oversampling = 0;
        assert!(config.oversampling().is_err());
        config.output.oversampling = MAX_OVERSAMPLING + 1;
        assert!(config.oversampling().is_err());
    }

    #[test]
    fn rejects_bad_names_and_ranges() {
        let mut config = RenderConfig::default();
        config.output.format = "flac".into();
        assert!(config.file_format().is_err());

        let mut config = RenderConfig::default();
        config.dither.kind = "blue".into();
        assert!(config.dither_kind().is_err());

        let mut config = RenderConfig::default();
        config.io.critical_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.metering = Some(MeteringSettings {
            window_seconds: 0.0,
            mute_threshold: 0.9,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "metering.window_seconds", .. })
        ));
    }

    #[test]
    fn rejects_unbounded_rates_and_windows() {
        let mut config = RenderConfig::default();
        config.output.sample_rate = u32::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "output.sample_rate", .. })
        ));

        let mut config = RenderConfig::default();
        config.output.sample_rate = MAX_SAMPLE_RATE;
        config.output.oversampling = MAX_OVERSAMPLING;
        config.validate().unwrap();

        let mut config = RenderConfig::default();
        config.metering = Some(MeteringSettings {
            window_seconds: 1.0e9,
            mute_threshold: 0.9,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "metering.window_seconds", .. })
        ));
    }

    #[test]
    fn unknown_types_fail_to_parse() {
        let err = RenderConfig::from_toml("[output]\nsample_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = RenderConfig::default();
        config.output.channels = 1;
        config.metering = Some(MeteringSettings::default());
        let text = config.to_toml().unwrap();
        assert!(text.contains("[metering]"));
        assert_eq!(RenderConfig::from_toml(&text).unwrap(), config);
    }
}
