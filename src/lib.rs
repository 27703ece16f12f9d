pub mod capture;
pub mod context;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod transform;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use capture::{Frame, PixelFormat};
pub use context::PipelineContext;
pub use error::ConfigError;
pub use server::ServerConfig;
pub use transform::{EdgeThresholds, ProcessingMode};

/// Environment variables with this prefix override file settings,
/// e.g. `FRAMECAST__SERVER__PORT=9002`
pub const ENV_PREFIX: &str = "FRAMECAST";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Render loop cadence when no vsync source drives it
    pub refresh_hz: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub initial_mode: ProcessingMode,
    /// Canny hysteresis thresholds on the L1 gradient magnitude
    pub edge_low: u16,
    pub edge_high: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            refresh_hz: 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_mode: ProcessingMode::EdgeDetect,
            edge_low: 50,
            edge_high: 150,
        }
    }
}

impl PipelineConfig {
    pub fn thresholds(&self) -> EdgeThresholds {
        EdgeThresholds {
            low: self.edge_low.min(self.edge_high),
            high: self.edge_high.max(self.edge_low),
        }
    }
}

impl Config {
    /// Built-in defaults, then the optional TOML file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Config>()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the capture and render paths cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let CaptureConfig { width, height, fps } = self.capture;

        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(ConfigError::Invalid(format!(
                "capture size must be non-zero and even, got {width}x{height}"
            )));
        }
        if fps == 0 {
            return Err(ConfigError::Invalid("capture fps must be non-zero".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("framecast-{}-{name}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!((config.capture.width, config.capture.height), (640, 480));
        assert_eq!(config.pipeline.initial_mode, ProcessingMode::EdgeDetect);
        assert_eq!(config.pipeline.thresholds(), EdgeThresholds { low: 50, high: 150 });
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.jpeg_quality, 50);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();

        assert_eq!(config.display.refresh_hz, 60);
        assert_eq!(config.server.queue_depth, 4);
    }

    #[test]
    fn test_load_partial_file() {
        let path = write_toml(
            "partial",
            r#"
                [pipeline]
                initial_mode = "passthrough"

                [server]
                queue_depth = 8
                bind_ip = "127.0.0.1"
            "#,
        );

        let config = Config::load(Some(&path)).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.pipeline.initial_mode, ProcessingMode::Passthrough);
        assert_eq!(config.pipeline.edge_high, 150);
        assert_eq!(config.server.queue_depth, 8);
        assert_eq!(config.server.bind_ip.to_string(), "127.0.0.1");
        assert_eq!(config.server.port, 9001);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = std::env::temp_dir().join("framecast-does-not-exist.toml");

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_rejects_odd_capture_size() {
        let path = write_toml("odd", "[capture]\nwidth = 641\n");

        let result = Config::load(Some(&path));
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_rejects_zero_capture_size() {
        let path = write_toml("zero", "[capture]\nheight = 0\n");

        let result = Config::load(Some(&path));
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_fps() {
        let mut config = Config::default();
        config.capture.fps = 0;

        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_swapped_thresholds_are_ordered() {
        let pipeline = PipelineConfig {
            edge_low: 200,
            edge_high: 20,
            ..PipelineConfig::default()
        };

        assert_eq!(pipeline.thresholds(), EdgeThresholds { low: 20, high: 200 });
    }
}
