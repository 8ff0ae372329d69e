//! Vision relay
//!
//! Embedded vision pipeline: a capture loop pulls frames from a camera,
//! optionally runs object detection on a letterboxed copy, and publishes the
//! latest frame with its detections for a small HTTP preview server.
//!
//! # Module Structure
//!
//! - `frame`: packed frames and sensor frame handles
//! - `ingest`: camera sources (synthetic, V4L2) and pixel normalization
//! - `letterbox`: aspect-preserving resize onto the model canvas
//! - `detect`: inference adapters, detection results, class names
//! - `shared`: latest frame + detections, shared with readers
//! - `pipeline`: the capture/inference loop
//! - `annotate`: box and label drawing, JPEG encoding
//! - `server`: live snapshot HTTP server
//! - `config`, `runtime`: daemon configuration and start-up

pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod letterbox;
pub mod pipeline;
pub mod runtime;
pub mod server;
pub mod shared;
pub mod shutdown;

pub use detect::{
    BoundingBox, ClassNames, CocoClasses, CoordinateSpace, Detection, InferenceAdapter,
    StubAdapter,
};
pub use frame::{Frame, PixelOrder, SensorFormat, SensorFrame};
pub use ingest::{FrameWait, SyntheticConfig, SyntheticSource, VideoSource};
pub use letterbox::{letterbox, LetterboxGeometry, Letterboxed};
pub use pipeline::{CapturePipeline, DetectionStage, PipelineSettings, PipelineStats, Step};
pub use server::{SnapshotHandle, SnapshotServer, SnapshotServerConfig};
pub use shared::{SharedFrameState, Snapshot};
pub use shutdown::Shutdown;
