use std::time::Duration;

use anyhow::Result;

use crate::frame::SensorFrame;

/// How long `get_frame` may wait for the next buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameWait {
    /// Block until a frame is available.
    Forever,
    /// Give up with an error after the duration.
    Timeout(Duration),
}

/// Camera subsystem as seen by the capture loop.
///
/// Call order: `init_device`, then `init_channel`, then any number of
/// `get_frame`/`release_frame` pairs. Every frame returned by `get_frame`
/// must be passed back to `release_frame` on the same source.
pub trait VideoSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Open and configure the capture device.
    fn init_device(&mut self) -> Result<()>;

    /// Configure the capture channel at the requested resolution.
    fn init_channel(&mut self, width: u32, height: u32) -> Result<()>;

    /// Acquire the next frame.
    fn get_frame(&mut self, wait: FrameWait) -> Result<SensorFrame>;

    /// Hand a frame back to the source.
    fn release_frame(&mut self, frame: SensorFrame) -> Result<()>;
}
