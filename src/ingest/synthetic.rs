//! Synthetic camera for `stub://` devices.
//!
//! Produces NV12 frames with a slowly moving luma gradient, paced to a target
//! frame rate. Used for tests and for running the daemon without hardware.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use super::source::{FrameWait, VideoSource};
use crate::frame::{SensorFormat, SensorFrame};

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub device: String,
    /// Frames per second; 0 disables pacing.
    pub target_fps: u32,
    /// Fail every n-th acquisition (1-based); `None` never fails.
    pub fail_every: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            target_fps: 30,
            fail_every: None,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    device_ready: bool,
    channel: Option<(u32, u32)>,
    attempts: u64,
    sequence: u64,
    outstanding: HashSet<u64>,
    next_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            device_ready: false,
            channel: None,
            attempts: 0,
            sequence: 0,
            outstanding: HashSet::new(),
            next_frame_at: None,
        }
    }

    /// Frames handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn frames_produced(&self) -> u64 {
        self.sequence
    }

    fn frame_interval(&self) -> Option<Duration> {
        (self.config.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / self.config.target_fps as f64))
    }

    fn wait_for_slot(&mut self, wait: FrameWait) -> Result<()> {
        let Some(interval) = self.frame_interval() else {
            return Ok(());
        };
        let now = Instant::now();
        let due = self.next_frame_at.unwrap_or(now);
        let delay = due.saturating_duration_since(now);
        if let FrameWait::Timeout(limit) = wait {
            if delay > limit {
                return Err(anyhow!(
                    "{}: no frame within {:?}",
                    self.config.device,
                    limit
                ));
            }
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.next_frame_at = Some(due.max(now) + interval);
        Ok(())
    }

    fn generate_nv12(&self, width: u32, height: u32) -> Vec<u8> {
        let w = width as usize;
        let h = height as usize;
        let shift = self.sequence as usize;
        let mut pixels = Vec::with_capacity(w * h * 3 / 2);
        for y in 0..h {
            for x in 0..w {
                pixels.push(((x + y + shift) % 256) as u8);
            }
        }
        for _ in 0..(w * h / 4) {
            pixels.push(128);
            pixels.push(128);
        }
        pixels
    }
}

impl VideoSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn init_device(&mut self) -> Result<()> {
        self.device_ready = true;
        log::info!("SyntheticSource: device {} ready", self.config.device);
        Ok(())
    }

    fn init_channel(&mut self, width: u32, height: u32) -> Result<()> {
        if !self.device_ready {
            return Err(anyhow!(
                "{}: channel initialised before device",
                self.config.device
            ));
        }
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(anyhow!(
                "{}: NV12 channel needs even, nonzero dimensions, got {}x{}",
                self.config.device,
                width,
                height
            ));
        }
        self.channel = Some((width, height));
        log::info!(
            "SyntheticSource: channel {}x{} on {}",
            width,
            height,
            self.config.device
        );
        Ok(())
    }

    fn get_frame(&mut self, wait: FrameWait) -> Result<SensorFrame> {
        let (width, height) = self
            .channel
            .ok_or_else(|| anyhow!("{}: channel not initialised", self.config.device))?;

        self.attempts += 1;
        if let Some(every) = self.config.fail_every {
            if every > 0 && self.attempts % every == 0 {
                return Err(anyhow!(
                    "{}: simulated acquisition failure #{}",
                    self.config.device,
                    self.attempts
                ));
            }
        }

        self.wait_for_slot(wait)?;
        self.sequence += 1;
        let data = self.generate_nv12(width, height);
        self.outstanding.insert(self.sequence);
        Ok(SensorFrame::new(
            width,
            height,
            SensorFormat::Nv12,
            self.sequence,
            data,
        ))
    }

    fn release_frame(&mut self, frame: SensorFrame) -> Result<()> {
        if !self.outstanding.remove(&frame.sequence) {
            return Err(anyhow!(
                "{}: frame {} was not acquired from this source",
                self.config.device,
                frame.sequence
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpaced() -> SyntheticConfig {
        SyntheticConfig {
            target_fps: 0,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn synthetic_source_produces_nv12_frames() -> Result<()> {
        let mut source = SyntheticSource::new(unpaced());
        source.init_device()?;
        source.init_channel(8, 4)?;

        let frame = source.get_frame(FrameWait::Forever)?;
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.format, SensorFormat::Nv12);
        assert_eq!(frame.data().len(), 8 * 4 * 3 / 2);
        assert_eq!(source.outstanding(), 1);

        source.release_frame(frame)?;
        assert_eq!(source.outstanding(), 0);
        Ok(())
    }

    #[test]
    fn channel_requires_device() {
        let mut source = SyntheticSource::new(unpaced());
        assert!(source.init_channel(8, 4).is_err());
        assert!(source.get_frame(FrameWait::Forever).is_err());
    }

    #[test]
    fn double_release_is_rejected() -> Result<()> {
        let mut source = SyntheticSource::new(unpaced());
        source.init_device()?;
        source.init_channel(2, 2)?;
        let frame = source.get_frame(FrameWait::Forever)?;
        let forged = SensorFrame::new(2, 2, SensorFormat::Nv12, frame.sequence, vec![]);
        source.release_frame(frame)?;
        assert!(source.release_frame(forged).is_err());
        Ok(())
    }

    #[test]
    fn scripted_failures() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            fail_every: Some(2),
            ..unpaced()
        });
        source.init_device()?;
        source.init_channel(2, 2)?;
        let first = source.get_frame(FrameWait::Forever)?;
        assert!(source.get_frame(FrameWait::Forever).is_err());
        source.release_frame(first)?;
        Ok(())
    }

    #[test]
    fn short_timeout_fails_when_paced() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            target_fps: 1,
            ..unpaced()
        });
        source.init_device()?;
        source.init_channel(2, 2)?;
        let first = source.get_frame(FrameWait::Timeout(Duration::from_millis(10)))?;
        source.release_frame(first)?;
        assert!(source
            .get_frame(FrameWait::Timeout(Duration::from_millis(10)))
            .is_err());
        Ok(())
    }
}
