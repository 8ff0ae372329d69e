//! Camera sources.
//!
//! - Synthetic source (`stub://...` devices)
//! - V4L2 devices (feature: ingest-v4l2)
//!
//! Sources hand out `SensorFrame`s in the sensor's native layout;
//! `normalize` turns them into packed frames at the working resolution.

pub mod normalize;
mod source;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

pub use normalize::{normalize_sensor_frame, resize_to};
pub use source::{FrameWait, VideoSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Open the source named by a device string.
///
/// `stub://...` selects the synthetic camera; anything else is treated as a
/// V4L2 device path.
pub fn open_source(device: &str) -> Result<Box<dyn VideoSource>> {
    if device.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            device: device.to_string(),
            ..SyntheticConfig::default()
        })));
    }
    open_device(device)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(device: &str) -> Result<Box<dyn VideoSource>> {
    Ok(Box::new(V4l2Source::new(device)))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(device: &str) -> Result<Box<dyn VideoSource>> {
    Err(anyhow::anyhow!(
        "cannot open camera '{}': built without the ingest-v4l2 feature",
        device
    ))
}
