use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::crop::CropRequest;
use crate::error::Result;
use crate::memory::IoMethod;
use crate::trigger::Trigger;
use crate::FourCC;

/// Prefix of environment variables overriding file settings, e.g. `CAPTURE_BUFFER_COUNT=8`
pub const ENV_PREFIX: &str = "CAPTURE";

/// Settings for opening and initializing a capture engine
///
/// ```toml
/// device = "/dev/video0"
/// io_method = "mmap"
/// buffer_count = 4
/// pixel_formats = ["YUYV", "RGB3"]
///
/// [crop]
/// width = 640
/// height = 480
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device node
    pub device: PathBuf,
    /// Buffer exchange method
    pub io_method: IoMethod,
    /// Desired number of buffers; the driver may grant fewer
    pub buffer_count: u32,
    /// Acceptable pixel formats, most preferred first
    pub pixel_formats: Vec<FourCC>,
    /// Region of interest
    pub crop: Option<CropRequest>,
    /// Triggered acquisition, if the camera supports it
    pub trigger: Option<Trigger>,
    /// Upper bound of a single readiness wait of the acquisition loop
    pub wait_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            device: PathBuf::from("/dev/video0"),
            io_method: IoMethod::Mmap,
            buffer_count: 4,
            pixel_formats: vec![
                FourCC::new(b"YUYV"),
                FourCC::new(b"UYVY"),
                FourCC::new(b"RGB3"),
                FourCC::new(b"BGR3"),
                FourCC::new(b"GREY"),
            ],
            crop: None,
            trigger: None,
            wait_timeout_ms: 1000,
        }
    }
}

impl CaptureConfig {
    /// Loads a configuration file, layered with `CAPTURE_*` environment variables
    ///
    /// Missing keys fall back to the defaults. `CAPTURE_PIXEL_FORMATS` takes a comma separated
    /// list.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(
            File::from(path.as_ref()).format(FileFormat::Toml),
            Self::environment(),
        )
    }

    /// Parses a configuration from TOML text
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::CaptureConfig;
    ///
    /// let config = CaptureConfig::from_toml("buffer_count = 8").unwrap();
    /// assert_eq!(config.buffer_count, 8);
    /// ```
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: CaptureConfig = config::Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("pixel_formats")
    }

    fn build<S>(file: S, env: Environment) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: CaptureConfig = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(ConfigError::Message("buffer_count must be at least 1".into()).into());
        }
        if self.pixel_formats.is_empty() {
            return Err(ConfigError::Message("pixel_formats must not be empty".into()).into());
        }
        if self.wait_timeout_ms == 0 {
            return Err(ConfigError::Message("wait_timeout_ms must be positive".into()).into());
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{Activation, Source};
    use crate::Error;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CaptureConfig::from_toml("").unwrap();
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.wait_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn full_document() {
        let config = CaptureConfig::from_toml(
            r#"
            device = "/dev/video2"
            io_method = "userptr"
            buffer_count = 6
            pixel_formats = ["RGB3", "YUYV"]
            wait_timeout_ms = 250

            [crop]
            left = 16
            width = 320

            [trigger]
            source = "line2"
            activation = "level_high"
            "#,
        )
        .unwrap();

        assert_eq!(config.device, PathBuf::from("/dev/video2"));
        assert_eq!(config.io_method, IoMethod::UserPtr);
        assert_eq!(config.buffer_count, 6);
        assert_eq!(
            config.pixel_formats,
            vec![FourCC::new(b"RGB3"), FourCC::new(b"YUYV")]
        );
        assert_eq!(config.crop, Some(CropRequest::new(16, -1, 320, -1)));
        assert_eq!(
            config.trigger,
            Some(Trigger {
                source: Source::Line2,
                activation: Activation::LevelHigh,
            })
        );
    }

    #[test]
    fn environment_overrides_file() {
        let env = Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("pixel_formats")
            .source(Some(
                [
                    ("CAPTURE_BUFFER_COUNT".to_string(), "8".to_string()),
                    ("CAPTURE_PIXEL_FORMATS".to_string(), "MJPG,GREY".to_string()),
                ]
                .into_iter()
                .collect(),
            ));
        let config = CaptureConfig::build(
            File::from_str("buffer_count = 2", FileFormat::Toml),
            env,
        )
        .unwrap();

        assert_eq!(config.buffer_count, 8);
        assert_eq!(
            config.pixel_formats,
            vec![FourCC::new(b"MJPG"), FourCC::new(b"GREY")]
        );
    }

    #[test]
    fn rejects_invalid_settings() {
        for text in [
            "buffer_count = 0",
            "pixel_formats = []",
            "wait_timeout_ms = 0",
            "pixel_formats = [\"RGB24\"]",
        ] {
            match CaptureConfig::from_toml(text) {
                Err(Error::Config(_)) => {}
                other => panic!("{:?} accepted: {:?}", text, other),
            }
        }
    }
}
