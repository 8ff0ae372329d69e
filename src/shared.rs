//! Latest frame and detections, shared between the capture loop and readers.
//!
//! One writer, any number of readers, one lock. The lock only ever covers a
//! field swap (`publish`) or a field copy (`snapshot`); drawing, encoding and
//! network I/O happen on the reader's own copy after the lock is released.
//! Frame and detections are replaced together in one critical section, so a
//! snapshot always pairs a frame with the detections computed for it.

use std::sync::{Mutex, MutexGuard};

use crate::detect::Detection;
use crate::frame::Frame;

/// A consistent copy of one published generation.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub generation: u64,
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

#[derive(Default)]
struct Published {
    generation: u64,
    frame: Option<Frame>,
    detections: Vec<Detection>,
}

#[derive(Default)]
pub struct SharedFrameState {
    inner: Mutex<Published>,
}

impl SharedFrameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace frame and detections together. Returns the new generation.
    ///
    /// Callers hand over their own copies; nothing is cloned under the lock.
    pub fn publish(&self, frame: Frame, detections: Vec<Detection>) -> u64 {
        let (old_frame, old_detections, generation) = {
            let mut guard = self.lock();
            guard.generation += 1;
            let old_frame = guard.frame.replace(frame);
            let old_detections = std::mem::replace(&mut guard.detections, detections);
            (old_frame, old_detections, guard.generation)
        };
        // Previous buffers are freed outside the critical section.
        drop(old_frame);
        drop(old_detections);
        generation
    }

    /// Copy out the latest generation, or `None` before the first publish.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let guard = self.lock();
        let frame = guard.frame.clone()?;
        Some(Snapshot {
            generation: guard.generation,
            frame,
            detections: guard.detections.clone(),
        })
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn lock(&self) -> MutexGuard<'_, Published> {
        // Every mutation is a complete swap, so a panicking holder cannot
        // leave a half-written pair behind.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
