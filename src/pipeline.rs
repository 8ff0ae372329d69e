//! Capture/inference loop.
//!
//! Each iteration acquires one sensor frame, normalizes it to the working
//! resolution, optionally letterboxes and runs inference, publishes the frame
//! together with its detections, and hands the sensor frame back. Capture and
//! inference run in the same iteration, so slow inference slows capture.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::detect::{ClassNames, CoordinateSpace, Detection, InferenceAdapter};
use crate::frame::{Frame, PixelOrder, SensorFrame};
use crate::ingest::{normalize_sensor_frame, resize_to, FrameWait, VideoSource};
use crate::letterbox::{letterbox, LetterboxGeometry};
use crate::shared::SharedFrameState;
use crate::shutdown::Shutdown;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Working (display) resolution.
    pub width: u32,
    pub height: u32,
    pub order: PixelOrder,
    /// Overrides the adapter's declared output space when set.
    pub box_space: Option<CoordinateSpace>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            width: 720,
            height: 480,
            order: PixelOrder::Rgb,
            box_space: None,
        }
    }
}

/// Detection stage: an adapter plus the label table used for logging.
pub struct DetectionStage {
    pub adapter: Box<dyn InferenceAdapter>,
    pub classes: Arc<dyn ClassNames>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_captured: u64,
    pub acquire_failures: u64,
    pub release_failures: u64,
    pub convert_failures: u64,
    pub inference_failures: u64,
    pub frames_published: u64,
}

/// Outcome of one loop iteration.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Acquisition failed; nothing else happened.
    Skipped,
    /// Shutdown was raised while waiting; the frame was released unprocessed.
    Stopped { sequence: u64 },
    /// A frame was processed.
    Processed {
        sequence: u64,
        detections: Vec<Detection>,
        generation: Option<u64>,
    },
}

pub struct CapturePipeline {
    source: Box<dyn VideoSource>,
    detection: Option<DetectionStage>,
    shared: Option<Arc<SharedFrameState>>,
    settings: PipelineSettings,
    shutdown: Shutdown,
    stats: PipelineStats,
    last_health_log: Instant,
}

impl CapturePipeline {
    /// Initialise the camera and build the loop.
    ///
    /// Device or channel failures are returned as errors; there is no
    /// degraded mode without a camera.
    pub fn start(
        mut source: Box<dyn VideoSource>,
        settings: PipelineSettings,
        detection: Option<DetectionStage>,
        shared: Option<Arc<SharedFrameState>>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        source
            .init_device()
            .with_context(|| format!("initialise video device {}", source.name()))?;
        source
            .init_channel(settings.width, settings.height)
            .with_context(|| {
                format!(
                    "initialise video channel {}x{} on {}",
                    settings.width,
                    settings.height,
                    source.name()
                )
            })?;
        log::info!(
            "camera {} ready at {}x{}; detection={} preview={}",
            source.name(),
            settings.width,
            settings.height,
            detection.is_some(),
            shared.is_some()
        );
        Ok(Self {
            source,
            detection,
            shared,
            settings,
            shutdown,
            stats: PipelineStats::default(),
            last_health_log: Instant::now(),
        })
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn detection_enabled(&self) -> bool {
        self.detection.is_some()
    }

    /// Run until the shutdown signal is raised.
    pub fn run(&mut self) -> PipelineStats {
        while !self.shutdown.is_triggered() {
            self.step();
            if self.last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "capture health: frames={} published={} acquire_failures={} inference_failures={}",
                    self.stats.frames_captured,
                    self.stats.frames_published,
                    self.stats.acquire_failures,
                    self.stats.inference_failures
                );
                self.last_health_log = Instant::now();
            }
        }
        log::info!("capture loop stopped after {} frames", self.stats.frames_captured);
        self.stats
    }

    /// One iteration: acquire, process, publish, release.
    pub fn step(&mut self) -> Step {
        let sensor = match self.source.get_frame(FrameWait::Forever) {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.acquire_failures += 1;
                log::warn!("frame acquisition failed: {:#}", err);
                return Step::Skipped;
            }
        };
        self.stats.frames_captured += 1;
        let sequence = sensor.sequence;

        if self.shutdown.is_triggered() {
            self.release(sensor);
            return Step::Stopped { sequence };
        }

        let step = match self.process(&sensor) {
            Ok((detections, generation)) => Step::Processed {
                sequence,
                detections,
                generation,
            },
            Err(err) => {
                self.stats.convert_failures += 1;
                log::warn!("frame {} dropped: {:#}", sequence, err);
                Step::Processed {
                    sequence,
                    detections: Vec::new(),
                    generation: None,
                }
            }
        };

        self.release(sensor);
        step
    }

    fn release(&mut self, sensor: SensorFrame) {
        let sequence = sensor.sequence;
        if let Err(err) = self.source.release_frame(sensor) {
            self.stats.release_failures += 1;
            log::error!("frame {} release failed: {:#}", sequence, err);
        }
    }

    fn process(&mut self, sensor: &SensorFrame) -> Result<(Vec<Detection>, Option<u64>)> {
        let packed = normalize_sensor_frame(sensor, self.settings.order)?;
        let frame = resize_to(packed, self.settings.width, self.settings.height)?;

        let detections = match self.detection.as_mut() {
            Some(stage) => match run_detection(stage, &frame, self.settings.box_space) {
                Ok(dets) => dets,
                Err(err) => {
                    self.stats.inference_failures += 1;
                    log::warn!("inference on frame {} failed: {:#}", sensor.sequence, err);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let generation = match &self.shared {
            Some(shared) => {
                // The frame is this iteration's own buffer; readers get
                // copies from `snapshot`.
                let generation = shared.publish(frame, detections.clone());
                self.stats.frames_published += 1;
                Some(generation)
            }
            None => None,
        };

        Ok((detections, generation))
    }
}

fn run_detection(
    stage: &mut DetectionStage,
    frame: &Frame,
    box_space: Option<CoordinateSpace>,
) -> Result<Vec<Detection>> {
    let (input_w, input_h) = stage.adapter.input_size();
    let boxed = letterbox(frame, input_w, input_h)?;
    let canvas = boxed.canvas.into_order(stage.adapter.input_order());
    let raw = stage.adapter.infer(canvas.data())?;
    let max = stage.adapter.max_detections();
    let space = box_space.unwrap_or_else(|| stage.adapter.output_space());

    for det in raw.iter().take(max) {
        log::info!(
            "{} @ ({} {} {} {}) {:.3}",
            stage.classes.name(det.class_id),
            det.bbox.left,
            det.bbox.top,
            det.bbox.right,
            det.bbox.bottom,
            det.confidence
        );
    }

    Ok(raw
        .into_iter()
        .take(max)
        .map(|det| to_display(det, space, &boxed.geometry))
        .collect())
}

/// Bring a detection into display space.
///
/// `space` is the space the adapter's boxes are interpreted in; model-input
/// boxes go through the inverse letterbox.
pub fn to_display(
    det: Detection,
    space: CoordinateSpace,
    geometry: &LetterboxGeometry,
) -> Detection {
    let bbox = match space {
        CoordinateSpace::ModelInput => geometry.to_source(det.bbox),
        CoordinateSpace::Display => det.bbox,
    };
    Detection {
        bbox,
        space: CoordinateSpace::Display,
        ..det
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, CocoClasses, StubAdapter};
    use crate::frame::SensorFormat;
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    fn synthetic(fail_every: Option<u64>) -> Box<dyn VideoSource> {
        Box::new(SyntheticSource::new(SyntheticConfig {
            device: "stub://test".to_string(),
            target_fps: 0,
            fail_every,
        }))
    }

    fn settings(width: u32, height: u32) -> PipelineSettings {
        PipelineSettings {
            width,
            height,
            ..PipelineSettings::default()
        }
    }

    fn stage(adapter: StubAdapter) -> DetectionStage {
        DetectionStage {
            adapter: Box::new(adapter),
            classes: Arc::new(CocoClasses),
        }
    }

    #[test]
    fn publishes_one_generation_per_frame() -> Result<()> {
        let shared = Arc::new(SharedFrameState::new());
        let mut pipeline = CapturePipeline::start(
            synthetic(None),
            settings(64, 48),
            None,
            Some(shared.clone()),
            Shutdown::new(),
        )?;
        for expected in 1..=3 {
            match pipeline.step() {
                Step::Processed { generation, .. } => assert_eq!(generation, Some(expected)),
                other => panic!("unexpected step {:?}", other),
            }
        }
        let snap = shared.snapshot().expect("published frame");
        assert_eq!((snap.frame.width(), snap.frame.height()), (64, 48));
        assert!(snap.detections.is_empty());
        assert_eq!(pipeline.stats().frames_published, 3);
        Ok(())
    }

    #[test]
    fn acquisition_failures_are_skipped() -> Result<()> {
        let mut pipeline = CapturePipeline::start(
            synthetic(Some(2)),
            settings(16, 16),
            None,
            None,
            Shutdown::new(),
        )?;
        let steps: Vec<Step> = (0..4).map(|_| pipeline.step()).collect();
        assert!(matches!(steps[0], Step::Processed { generation: None, .. }));
        assert_eq!(steps[1], Step::Skipped);
        assert!(matches!(steps[2], Step::Processed { .. }));
        assert_eq!(steps[3], Step::Skipped);
        let stats = pipeline.stats();
        assert_eq!(stats.acquire_failures, 2);
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.release_failures, 0);
        Ok(())
    }

    #[test]
    fn model_space_boxes_are_remapped_before_publish() -> Result<()> {
        // 720x480 -> 640x640: scale 8/9, top padding 107.
        let canvas_box = BoundingBox::new(80, 107 + 80, 160, 107 + 160);
        let adapter = StubAdapter::new(640, 640).with_detections(vec![Detection::new(
            0,
            0.95,
            canvas_box,
            CoordinateSpace::ModelInput,
        )]);
        let shared = Arc::new(SharedFrameState::new());
        let mut pipeline = CapturePipeline::start(
            synthetic(None),
            settings(720, 480),
            Some(stage(adapter)),
            Some(shared.clone()),
            Shutdown::new(),
        )?;
        pipeline.step();

        let snap = shared.snapshot().expect("snapshot");
        assert_eq!(snap.detections.len(), 1);
        let det = &snap.detections[0];
        assert_eq!(det.space, CoordinateSpace::Display);
        assert_eq!(det.bbox, BoundingBox::new(90, 90, 180, 180));
        Ok(())
    }

    #[test]
    fn display_override_keeps_boxes_verbatim() -> Result<()> {
        let bbox = BoundingBox::new(10, 10, 100, 100);
        let adapter = StubAdapter::new(640, 640).with_detections(vec![Detection::new(
            0,
            0.95,
            bbox,
            CoordinateSpace::ModelInput,
        )]);
        let shared = Arc::new(SharedFrameState::new());
        let mut pipeline = CapturePipeline::start(
            synthetic(None),
            PipelineSettings {
                box_space: Some(CoordinateSpace::Display),
                ..settings(720, 480)
            },
            Some(stage(adapter)),
            Some(shared.clone()),
            Shutdown::new(),
        )?;
        pipeline.step();

        let snap = shared.snapshot().expect("snapshot");
        assert_eq!(snap.detections[0].bbox, bbox);
        assert_eq!(snap.detections[0].space, CoordinateSpace::Display);
        Ok(())
    }

    #[test]
    fn inference_failure_still_publishes_and_releases() -> Result<()> {
        // Wrong input size makes the stub reject every canvas.
        let adapter = StubAdapter::new(32, 32);
        let shared = Arc::new(SharedFrameState::new());
        let mut pipeline = CapturePipeline::start(
            synthetic(None),
            settings(64, 64),
            Some(DetectionStage {
                adapter: Box::new(BadInput(adapter)),
                classes: Arc::new(CocoClasses),
            }),
            Some(shared.clone()),
            Shutdown::new(),
        )?;
        pipeline.step();
        let stats = pipeline.stats();
        assert_eq!(stats.inference_failures, 1);
        assert_eq!(stats.frames_published, 1);
        assert_eq!(stats.release_failures, 0);
        Ok(())
    }

    #[test]
    fn run_stops_on_shutdown() -> Result<()> {
        let shutdown = Shutdown::new();
        let mut pipeline = CapturePipeline::start(
            synthetic(None),
            settings(16, 16),
            None,
            None,
            shutdown.clone(),
        )?;
        shutdown.trigger();
        let stats = pipeline.run();
        assert_eq!(stats.frames_captured, 0);
        Ok(())
    }

    #[test]
    fn channel_failure_is_fatal() {
        let result = CapturePipeline::start(
            synthetic(None),
            settings(15, 16),
            None,
            None,
            Shutdown::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn adapter_receives_its_own_channel_order() -> Result<()> {
        // Camera BGR, model RGB: the canvas must arrive as RGB.
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = CapturePipeline::start(
            Box::new(SolidSource::new([200, 50, 10])),
            PipelineSettings {
                order: PixelOrder::Bgr,
                ..settings(64, 48)
            },
            Some(recording_stage(PixelOrder::Rgb, received.clone())),
            None,
            Shutdown::new(),
        )?;
        pipeline.step();
        assert_eq!(canvas_centre(&received), [200, 50, 10]);

        // Camera RGB, model BGR.
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = CapturePipeline::start(
            Box::new(SolidSource::new([200, 50, 10])),
            settings(64, 48),
            Some(recording_stage(PixelOrder::Bgr, received.clone())),
            None,
            Shutdown::new(),
        )?;
        pipeline.step();
        assert_eq!(canvas_centre(&received), [10, 50, 200]);
        Ok(())
    }

    #[test]
    fn frame_acquired_after_shutdown_is_released_unprocessed() -> Result<()> {
        let shutdown = Shutdown::new();
        let source = SolidSource::new([1, 2, 3]).trigger_on_acquire(shutdown.clone());
        let released = source.released.clone();
        let received = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::new(SharedFrameState::new());
        let mut pipeline = CapturePipeline::start(
            Box::new(source),
            settings(64, 48),
            Some(recording_stage(PixelOrder::Rgb, received.clone())),
            Some(shared.clone()),
            shutdown,
        )?;

        assert_eq!(pipeline.step(), Step::Stopped { sequence: 1 });
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(received.lock().unwrap().is_empty());
        assert!(shared.snapshot().is_none());
        assert_eq!(pipeline.stats().frames_published, 0);
        Ok(())
    }

    fn recording_stage(order: PixelOrder, received: Arc<Mutex<Vec<u8>>>) -> DetectionStage {
        DetectionStage {
            adapter: Box::new(Recording { order, received }),
            classes: Arc::new(CocoClasses),
        }
    }

    /// Pixel (32, 32) of the last 64x64 canvas handed to the adapter.
    fn canvas_centre(received: &Mutex<Vec<u8>>) -> [u8; 3] {
        let bytes = received.lock().unwrap();
        assert_eq!(bytes.len(), 64 * 64 * 3);
        let idx = (32 * 64 + 32) * 3;
        [bytes[idx], bytes[idx + 1], bytes[idx + 2]]
    }

    /// 64x64 adapter that keeps a copy of its last input.
    struct Recording {
        order: PixelOrder,
        received: Arc<Mutex<Vec<u8>>>,
    }

    impl InferenceAdapter for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn input_size(&self) -> (u32, u32) {
            (64, 64)
        }

        fn max_detections(&self) -> usize {
            0
        }

        fn input_order(&self) -> PixelOrder {
            self.order
        }

        fn infer(&mut self, input: &[u8]) -> Result<Vec<Detection>> {
            *self.received.lock().unwrap() = input.to_vec();
            Ok(Vec::new())
        }
    }

    /// Packed RGB camera filled with one colour.
    struct SolidSource {
        color: [u8; 3],
        size: (u32, u32),
        sequence: u64,
        released: Arc<AtomicU64>,
        trigger: Option<Shutdown>,
    }

    impl SolidSource {
        fn new(color: [u8; 3]) -> Self {
            Self {
                color,
                size: (0, 0),
                sequence: 0,
                released: Arc::new(AtomicU64::new(0)),
                trigger: None,
            }
        }

        /// Raise `shutdown` while a frame is being acquired.
        fn trigger_on_acquire(mut self, shutdown: Shutdown) -> Self {
            self.trigger = Some(shutdown);
            self
        }
    }

    impl VideoSource for SolidSource {
        fn name(&self) -> &str {
            "solid"
        }

        fn init_device(&mut self) -> Result<()> {
            Ok(())
        }

        fn init_channel(&mut self, width: u32, height: u32) -> Result<()> {
            self.size = (width, height);
            Ok(())
        }

        fn get_frame(&mut self, _wait: FrameWait) -> Result<SensorFrame> {
            if let Some(shutdown) = &self.trigger {
                shutdown.trigger();
            }
            self.sequence += 1;
            let (w, h) = self.size;
            let data = self.color.repeat((w * h) as usize);
            Ok(SensorFrame::new(w, h, SensorFormat::Rgb24, self.sequence, data))
        }

        fn release_frame(&mut self, _frame: SensorFrame) -> Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Declares 64x64 input while the inner stub expects 32x32.
    struct BadInput(StubAdapter);

    impl InferenceAdapter for BadInput {
        fn name(&self) -> &'static str {
            "bad-input"
        }

        fn input_size(&self) -> (u32, u32) {
            (64, 64)
        }

        fn max_detections(&self) -> usize {
            self.0.max_detections()
        }

        fn infer(&mut self, input: &[u8]) -> Result<Vec<Detection>> {
            self.0.infer(input)
        }
    }
}
