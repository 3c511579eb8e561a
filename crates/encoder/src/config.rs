use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::engine::{Encoding, PixelFormat};
use crate::render::{bar_width_for, FALLBACK_BAR_WIDTH};

/// Configuration for the Iris slide encoder front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoder executable driven by the process engine
    pub encoder_bin: PathBuf,
    /// Program (and arguments) the encoder is started through, e.g. `["nice", "-n", "10"]`
    pub launcher: Vec<String>,
    /// Flag used to pass the pixel format to the executable (not passed when unset)
    pub pixel_format_arg: Option<String>,
    /// Milliseconds between progress samples
    pub poll_interval_ms: u64,
    /// Fixed progress bar width; detected from the terminal when unset
    pub bar_width: Option<usize>,
    /// Progress bar width when the terminal width is unknown
    pub fallback_bar_width: usize,
    /// Tile encoding when none is given on the command line
    pub default_encoding: Encoding,
    /// Pixel format when none is given on the command line
    pub default_pixel_format: PixelFormat,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl EncoderConfig {
    pub fn default_config() -> Self {
        Self {
            encoder_bin: PathBuf::from("IrisCodecEncoder"),
            launcher: Vec::new(),
            pixel_format_arg: None,
            poll_interval_ms: 1000,
            bar_width: None,
            fallback_bar_width: FALLBACK_BAR_WIDTH,
            default_encoding: Encoding::default(),
            default_pixel_format: PixelFormat::default(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Supervisor settings for a terminal `columns` wide (None if unknown)
    pub fn supervisor_config(&self, columns: Option<u16>) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            bar_width: self
                .bar_width
                .unwrap_or_else(|| bar_width_for(columns, self.fallback_bar_width)),
        }
    }
}

/// Runtime knobs of the job supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub bar_width: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            bar_width: FALLBACK_BAR_WIDTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EncoderConfig::load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg, EncoderConfig::default_config());
        assert_eq!(EncoderConfig::load_config(None).unwrap(), EncoderConfig::default_config());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irisenc.toml");
        std::fs::write(
            &path,
            "poll_interval_ms = 250\ndefault_encoding = \"AVIF\"\ndefault_pixel_format = \"B8G8R8A8\"\n",
        )
        .unwrap();
        let cfg = EncoderConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.poll_interval_ms, 250);
        assert_eq!(cfg.default_encoding, Encoding::Avif);
        assert_eq!(cfg.default_pixel_format, PixelFormat::B8G8R8A8);
        assert_eq!(cfg.fallback_bar_width, FALLBACK_BAR_WIDTH);
        assert_eq!(cfg.encoder_bin, PathBuf::from("IrisCodecEncoder"));
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irisenc.json");
        std::fs::write(&path, r#"{"encoder_bin": "/opt/iris/bin/enc", "bar_width": 30}"#).unwrap();
        let cfg = EncoderConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.encoder_bin, PathBuf::from("/opt/iris/bin/enc"));
        assert_eq!(cfg.bar_width, Some(30));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irisenc.toml");
        std::fs::write(&path, "poll_interval_ms = \"soon\"").unwrap();
        let err = EncoderConfig::load_config(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_bar_width_resolution_order() {
        let mut cfg = EncoderConfig::default_config();
        assert_eq!(cfg.supervisor_config(None).bar_width, 40);
        assert_eq!(cfg.supervisor_config(Some(100)).bar_width, 50);
        cfg.bar_width = Some(12);
        assert_eq!(cfg.supervisor_config(Some(100)).bar_width, 12);
        assert_eq!(cfg.supervisor_config(None).poll_interval, Duration::from_secs(1));
    }
}
