//! Acquisition configuration: camera streams plus staging/output directories.
//!
//! The config is a JSON file, by default at `~/.config/waggle/config.json`.
//! A missing file yields the built-in default configuration; a present but
//! malformed file is an error (silent fallback would hide operator typos).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config has no camera streams")]
    NoStreams,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Trigger mode for frame capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Hardware,
    Software,
}

/// Frame trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub frames_per_second: u32,
    pub source: u32,
}

/// Low-level capture parameters passed through to the recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureParams {
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
    pub trigger: TriggerConfig,
    pub bitrate: u64,
    pub rcmode: u32,
    pub qp: u32,
    pub brightness: i32,
    pub shutter: u32,
    pub gain: u32,
    pub exposure: u32,
    pub whitebalance: u32,
}

/// Physical camera description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub backend: String,
    pub serial: String,
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
    pub params: CaptureParams,
}

/// One camera stream: the camera plus segmentation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub camera: CameraConfig,
    pub frames_per_second: u32,
    pub frames_per_file: u32,
}

impl StreamConfig {
    /// Seconds a full segment spans at the configured rate.
    pub fn segment_seconds(&self) -> f64 {
        f64::from(self.frames_per_file) / f64::from(self.frames_per_second)
    }
}

/// Root acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub tmp_dir: PathBuf,
    pub out_dir: PathBuf,
    pub streams: BTreeMap<String, StreamConfig>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let mut streams = BTreeMap::new();
        streams.insert(
            "cam-0".to_string(),
            StreamConfig {
                camera: CameraConfig {
                    backend: "basler".to_string(),
                    serial: "40562710".to_string(),
                    offset_x: 0,
                    offset_y: 0,
                    width: 5312,
                    height: 4608,
                    params: CaptureParams {
                        offset_x: 0,
                        offset_y: 0,
                        width: 5312,
                        height: 4608,
                        trigger: TriggerConfig {
                            trigger_type: TriggerType::Software,
                            frames_per_second: 6,
                            source: 1,
                        },
                        bitrate: 1_000_000,
                        rcmode: 0,
                        qp: 24,
                        brightness: 0,
                        shutter: 3,
                        gain: 22,
                        exposure: 20_000,
                        whitebalance: 0,
                    },
                },
                frames_per_second: 6,
                frames_per_file: 360,
            },
        );

        Self {
            tmp_dir: PathBuf::from("data/tmp"),
            out_dir: PathBuf::from("data/out"),
            streams,
        }
    }
}

impl AcquisitionConfig {
    /// Name and config of the primary camera stream (first by name).
    pub fn primary_stream(&self) -> Result<(&str, &StreamConfig)> {
        self.streams
            .iter()
            .next()
            .map(|(name, stream)| (name.as_str(), stream))
            .ok_or(ConfigError::NoStreams)
    }
}

/// Default config location: `~/.config/waggle/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waggle")
        .join("config.json")
}

/// Load the config, falling back to the built-in default when the file does
/// not exist yet.
pub fn load_config(path: &Path) -> Result<AcquisitionConfig> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            debug!("Loaded config from {}", path.display());
            Ok(config)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(
                "No config at {}, using built-in default",
                path.display()
            );
            Ok(AcquisitionConfig::default())
        }
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persist the config atomically (temp file + rename).
pub fn save_config(config: &AcquisitionConfig, path: &Path) -> Result<()> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let text = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, text).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;

    info!("Saved config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.tmp_dir, PathBuf::from("data/tmp"));
        let (name, stream) = config.primary_stream().unwrap();
        assert_eq!(name, "cam-0");
        assert_eq!(stream.frames_per_file, 360);
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AcquisitionConfig::default();
        config.tmp_dir = PathBuf::from("/data/staging");
        config
            .streams
            .get_mut("cam-0")
            .unwrap()
            .camera
            .params
            .gain = 30;

        save_config(&config, &path).unwrap();
        let reloaded = load_config(&path).unwrap();

        assert_eq!(reloaded.tmp_dir, PathBuf::from("/data/staging"));
        assert_eq!(
            reloaded.streams["cam-0"].camera.params.gain,
            30
        );
        // temp file must not linger after the rename
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn trigger_type_serializes_lowercase() {
        let json = serde_json::to_string(&TriggerType::Software).unwrap();
        assert_eq!(json, "\"software\"");
    }

    #[test]
    fn segment_seconds_from_rate() {
        let config = AcquisitionConfig::default();
        let (_, stream) = config.primary_stream().unwrap();
        assert!((stream.segment_seconds() - 60.0).abs() < f64::EPSILON);
    }
}
