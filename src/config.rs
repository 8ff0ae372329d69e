use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::detect::{CoordinateSpace, KNOWN_BACKENDS, MODEL_PATH};
use crate::frame::PixelOrder;
use crate::server::WEB_PORT;

const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_WIDTH: u32 = 720;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "tract";

/// visiond: camera capture with optional object detection and a live
/// annotated preview over HTTP.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "visiond", version, disable_help_flag = true)]
pub struct Cli {
    /// Print help.
    #[arg(short = 'h', long, short_alias = '?', action = clap::ArgAction::Help)]
    pub help: Option<bool>,
    /// Enable object detection (model at ./model/yolov5.onnx).
    #[arg(short = 'y', long)]
    pub yolo: bool,
    /// Enable the live web preview.
    #[arg(short = 'w', long)]
    pub web: bool,
    /// JSON config file.
    #[arg(short = 'c', long, env = "VISIOND_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VisiondConfigFile {
    camera: Option<CameraConfigFile>,
    detect: Option<DetectConfigFile>,
    web: Option<WebConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pixel_order: Option<PixelOrder>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectConfigFile {
    enabled: Option<bool>,
    backend: Option<String>,
    box_space: Option<CoordinateSpace>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WebConfigFile {
    enabled: Option<bool>,
    addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VisiondConfig {
    pub camera: CameraSettings,
    pub detect: DetectSettings,
    pub web: WebSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub pixel_order: PixelOrder,
}

#[derive(Debug, Clone)]
pub struct DetectSettings {
    pub enabled: bool,
    pub backend: String,
    pub box_space: Option<CoordinateSpace>,
    pub model_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WebSettings {
    pub enabled: bool,
    pub addr: String,
}

impl Default for VisiondConfig {
    fn default() -> Self {
        Self::from_file(VisiondConfigFile::default())
    }
}

impl VisiondConfig {
    /// Resolve the effective configuration: file, then env, then CLI flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_cfg = match cli.config.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env();
        cfg.apply_cli(cli);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VisiondConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detect = file.detect.unwrap_or_default();
        let web = file.web.unwrap_or_default();
        Self {
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_HEIGHT),
                pixel_order: camera.pixel_order.unwrap_or(PixelOrder::Rgb),
            },
            detect: DetectSettings {
                enabled: detect.enabled.unwrap_or(false),
                backend: detect
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                box_space: detect.box_space,
                model_path: PathBuf::from(MODEL_PATH),
            },
            web: WebSettings {
                enabled: web.enabled.unwrap_or(false),
                addr: web.addr.unwrap_or_else(|| format!("0.0.0.0:{WEB_PORT}")),
            },
        }
    }

    fn apply_env(&mut self) {
        if let Ok(device) = std::env::var("VISIOND_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(addr) = std::env::var("VISIOND_WEB_ADDR") {
            if !addr.trim().is_empty() {
                self.web.addr = addr;
            }
        }
        if let Ok(backend) = std::env::var("VISIOND_DETECT_BACKEND") {
            if !backend.trim().is_empty() {
                self.detect.backend = backend.trim().to_lowercase();
            }
        }
    }

    /// Flags only switch features on; they never turn off what the file enabled.
    fn apply_cli(&mut self, cli: &Cli) {
        self.detect.enabled |= cli.yolo;
        self.web.enabled |= cli.web;
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera dimensions must be nonzero (got {}x{})",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        self.web
            .addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("invalid web address '{}': {}", self.web.addr, e))?;
        if !KNOWN_BACKENDS.contains(&self.detect.backend.as_str()) {
            return Err(anyhow!(
                "unknown detection backend '{}'; expected one of {:?}",
                self.detect.backend,
                KNOWN_BACKENDS
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<VisiondConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
