//! V4L2 camera source.
//!
//! Opens a local device node (e.g. /dev/video0), negotiates NV12 at the
//! channel resolution (falling back to packed RGB when the driver refuses)
//! and captures through a memory-mapped stream.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::source::{FrameWait, VideoSource};
use crate::frame::{SensorFormat, SensorFrame};

const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Source {
    path: String,
    device: Option<v4l::Device>,
    state: Option<V4l2StreamState>,
    format: SensorFormat,
    width: u32,
    height: u32,
    sequence: u64,
    outstanding: Option<u64>,
}

#[self_referencing]
struct V4l2StreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            device: None,
            state: None,
            format: SensorFormat::Nv12,
            width: 0,
            height: 0,
            sequence: 0,
            outstanding: None,
        }
    }

    fn expected_len(&self) -> usize {
        let pixels = self.width as usize * self.height as usize;
        match self.format {
            SensorFormat::Nv12 => pixels + pixels / 2,
            SensorFormat::Rgb24 => pixels * 3,
        }
    }
}

impl VideoSource for V4l2Source {
    fn name(&self) -> &str {
        &self.path
    }

    fn init_device(&mut self) -> Result<()> {
        let device = v4l::Device::with_path(&self.path)
            .with_context(|| format!("open v4l2 device {}", self.path))?;
        self.device = Some(device);
        log::info!("V4l2Source: opened {}", self.path);
        Ok(())
    }

    fn init_channel(&mut self, width: u32, height: u32) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = self
            .device
            .take()
            .ok_or_else(|| anyhow!("{}: channel initialised before device", self.path))?;

        let mut format = device.format().context("read v4l2 format")?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"NV12");

        let mut active = match device.set_format(&format) {
            Ok(active) => active,
            Err(err) => {
                log::warn!("V4l2Source: failed to set NV12 on {}: {}", self.path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        if active.fourcc != v4l::FourCC::new(b"NV12") {
            format.fourcc = v4l::FourCC::new(b"RGB3");
            active = device
                .set_format(&format)
                .with_context(|| format!("{}: neither NV12 nor RGB3 accepted", self.path))?;
        }

        self.format = if active.fourcc == v4l::FourCC::new(b"NV12") {
            SensorFormat::Nv12
        } else if active.fourcc == v4l::FourCC::new(b"RGB3") {
            SensorFormat::Rgb24
        } else {
            return Err(anyhow!(
                "{}: unsupported pixel format {}",
                self.path,
                active.fourcc
            ));
        };
        self.width = active.width;
        self.height = active.height;

        let state = V4l2StreamStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: streaming {} at {}x{} ({:?})",
            self.path,
            self.width,
            self.height,
            self.format
        );
        Ok(())
    }

    fn get_frame(&mut self, wait: FrameWait) -> Result<SensorFrame> {
        use v4l::io::traits::CaptureStream;

        if let FrameWait::Timeout(limit) = wait {
            log::debug!(
                "V4l2Source: {:?} wait requested; device reads block until the driver delivers",
                limit
            );
        }
        let expected = self.expected_len();
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("{}: channel not initialised", self.path))?;
        let data = state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map(|(buf, _meta)| buf.get(..expected).map(|b| b.to_vec()))
        });
        let data = data
            .context("capture v4l2 frame")?
            .ok_or_else(|| anyhow!("{}: short buffer from driver", self.path))?;

        self.sequence += 1;
        self.outstanding = Some(self.sequence);
        Ok(SensorFrame::new(
            self.width,
            self.height,
            self.format,
            self.sequence,
            data,
        ))
    }

    fn release_frame(&mut self, frame: SensorFrame) -> Result<()> {
        // The mmap stream re-queues its buffer on the next dequeue; the
        // frame we handed out is a copy.
        if self.outstanding.take() != Some(frame.sequence) {
            return Err(anyhow!(
                "{}: frame {} was not the outstanding capture",
                self.path,
                frame.sequence
            ));
        }
        Ok(())
    }
}
