pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod tract;
pub(crate) mod yolo;

pub use stub::StubAdapter;

#[cfg(feature = "backend-tract")]
pub use tract::TractAdapter;

/// Detection cap per frame, matching the YOLOv5 post-process.
pub const MAX_DETECTIONS: usize = 64;
