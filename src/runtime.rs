//! Start-up ordering and the feature error policy.
//!
//! Web preview first, then the model, then the camera. The preview and
//! detection are optional: if either cannot start it is logged and left off.
//! The camera is not optional; failing to open it aborts start-up.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::VisiondConfig;
use crate::detect::{load_adapter, ClassNames, CocoClasses};
use crate::ingest::{open_source, VideoSource};
use crate::pipeline::{CapturePipeline, DetectionStage, PipelineSettings, PipelineStats};
use crate::server::{SnapshotHandle, SnapshotServer, SnapshotServerConfig};
use crate::shared::SharedFrameState;
use crate::shutdown::Shutdown;

pub struct Runtime {
    pub pipeline: CapturePipeline,
    pub web: Option<SnapshotHandle>,
    pub shared: Option<Arc<SharedFrameState>>,
    pub shutdown: Shutdown,
}

/// Launch against the device named in the configuration.
pub fn launch(cfg: &VisiondConfig) -> Result<Runtime> {
    launch_with_source(cfg, || open_source(&cfg.camera.device))
}

/// Launch with a caller-supplied video source.
///
/// The source is only opened after the optional features have been tried,
/// matching the order used for a real device.
pub fn launch_with_source<F>(cfg: &VisiondConfig, open: F) -> Result<Runtime>
where
    F: FnOnce() -> Result<Box<dyn VideoSource>>,
{
    let shutdown = Shutdown::new();
    let classes: Arc<dyn ClassNames> = Arc::new(CocoClasses);

    let (web, shared) = if cfg.web.enabled {
        start_web(cfg, classes.clone())
    } else {
        (None, None)
    };

    let detection = if cfg.detect.enabled {
        match load_adapter(&cfg.detect.backend, &cfg.detect.model_path) {
            Ok(adapter) => {
                log::info!(
                    "detection enabled: backend={} input={:?}",
                    adapter.name(),
                    adapter.input_size()
                );
                Some(DetectionStage {
                    adapter,
                    classes: classes.clone(),
                })
            }
            Err(err) => {
                log::error!("model load failed, detection disabled: {:#}", err);
                None
            }
        }
    } else {
        None
    };

    let settings = PipelineSettings {
        width: cfg.camera.width,
        height: cfg.camera.height,
        order: cfg.camera.pixel_order,
        box_space: cfg.detect.box_space,
    };

    let started = open()
        .with_context(|| format!("open camera {}", cfg.camera.device))
        .and_then(|source| {
            CapturePipeline::start(source, settings, detection, shared.clone(), shutdown.clone())
        });
    let pipeline = match started {
        Ok(pipeline) => pipeline,
        Err(err) => {
            if let Some(handle) = web {
                if let Err(stop_err) = handle.stop() {
                    log::warn!("snapshot server stop failed: {:#}", stop_err);
                }
            }
            return Err(err);
        }
    };

    Ok(Runtime {
        pipeline,
        web,
        shared,
        shutdown,
    })
}

fn start_web(
    cfg: &VisiondConfig,
    classes: Arc<dyn ClassNames>,
) -> (Option<SnapshotHandle>, Option<Arc<SharedFrameState>>) {
    let shared = Arc::new(SharedFrameState::new());
    let server_cfg = SnapshotServerConfig {
        addr: cfg.web.addr.clone(),
        placeholder_width: cfg.camera.width,
        placeholder_height: cfg.camera.height,
        ..SnapshotServerConfig::default()
    };
    match SnapshotServer::new(server_cfg, shared.clone(), classes).spawn() {
        Ok(handle) => {
            log::info!("web preview at http://{}/", handle.addr);
            (Some(handle), Some(shared))
        }
        Err(err) => {
            log::error!("web preview disabled: {:#}", err);
            (None, None)
        }
    }
}

impl Runtime {
    /// Run the capture loop until shutdown, then stop the web preview.
    pub fn run(mut self) -> Result<PipelineStats> {
        let stats = self.pipeline.run();
        if let Some(web) = self.web.take() {
            web.stop()?;
        }
        Ok(stats)
    }
}
