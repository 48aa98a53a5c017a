//! Hand landmark data and the boundary to the external landmark detector.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;

use crate::iter::zip_exact;

/// Number of landmark points the detector reports per hand.
pub const NUM_LANDMARKS: usize = 21;

/// Width of the flattened feature vector derived from one hand.
pub const FEATURE_LEN: usize = NUM_LANDMARKS * 3;

/// Names for the hand landmarks, in the order the detector reports them.
///
/// This order also fixes the layout of the feature vector: landmark `i` occupies
/// positions `3*i..3*i+3` (x, y, z).
///
/// # Terminology
///
/// - **CMC**: Carpometacarpal joint, the lowest joint of the thumb, located near the wrist.
/// - **MCP**: Metacarpophalangeal joint, the lower joint forming the knuckles near the palm.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: placed on the tip of the finger, above the DIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// 3D positions of the [`NUM_LANDMARKS`] landmarks of a single detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    positions: [[f32; 3]; NUM_LANDMARKS],
}

impl HandLandmarks {
    /// Creates landmarks from the points of one detected hand.
    ///
    /// Detectors may report more than [`NUM_LANDMARKS`] points per hand; the extra points
    /// are ignored. Fewer points are a configuration error.
    pub fn from_points(points: &[[f32; 3]]) -> anyhow::Result<Self> {
        if points.len() < NUM_LANDMARKS {
            bail!(
                "hand detection has {} landmarks, need at least {}",
                points.len(),
                NUM_LANDMARKS
            );
        }
        let mut positions = [[0.0; 3]; NUM_LANDMARKS];
        positions.copy_from_slice(&points[..NUM_LANDMARKS]);
        Ok(Self { positions })
    }

    /// Returns the position of a landmark.
    pub fn position(&self, index: LandmarkIdx) -> [f32; 3] {
        self.positions[index as usize]
    }

    /// Returns all landmark positions in detector order.
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    /// Flattens the landmarks into a classifier feature vector.
    ///
    /// The layout is `x0, y0, z0, x1, y1, z1, ...` in landmark order. `out` must have
    /// exactly [`FEATURE_LEN`] entries.
    pub fn write_features(&self, out: &mut [f32]) -> anyhow::Result<()> {
        if out.len() != FEATURE_LEN {
            bail!(
                "feature buffer has {} entries, landmarks produce {}",
                out.len(),
                FEATURE_LEN
            );
        }
        for (chunk, pos) in zip_exact(out.chunks_exact_mut(3), self.positions.iter()) {
            chunk.copy_from_slice(pos);
        }
        Ok(())
    }
}

/// Landmark detection outcome for one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// No hand was found in the frame.
    NoHand,
    /// One entry per detected hand, in detector confidence order.
    Hands(Vec<HandLandmarks>),
}

/// Boundary to the external hand landmark detector.
///
/// Detection may run asynchronously relative to frame submission: [`submit`] hands a
/// frame to the detector and [`latest`] takes a non-blocking snapshot of the most recent
/// outcome, which may still describe an earlier frame.
///
/// [`submit`]: LandmarkSource::submit
/// [`latest`]: LandmarkSource::latest
pub trait LandmarkSource {
    /// The pixel data type the detector consumes.
    type Frame;

    /// Submits `frame` to the detector, stamped with `timestamp`.
    fn submit(&mut self, frame: &Self::Frame, timestamp: Duration) -> anyhow::Result<()>;

    /// Returns the most recent detection outcome without blocking.
    fn latest(&self) -> Detection;
}

/// Single-slot cell holding the most recent detection outcome.
///
/// A callback-driven detector publishes each result through a [`SlotWriter`]; readers
/// take point-in-time snapshots. Only the newest result is kept.
#[derive(Clone, Default)]
pub struct LatestSlot {
    inner: Arc<Mutex<Option<Detection>>>,
}

impl LatestSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle the detector callback uses to publish results.
    pub fn writer(&self) -> SlotWriter {
        SlotWriter {
            inner: self.inner.clone(),
        }
    }

    /// Returns the most recently published outcome.
    ///
    /// A slot nothing has been published to reads as [`Detection::NoHand`]. This means a
    /// snapshot taken right after submitting a frame can race the detector and miss a
    /// hand that is still being processed; the next frame picks it up. Callers get the
    /// point-in-time view, not a guarantee about the frame they just submitted.
    pub fn snapshot(&self) -> Detection {
        self.inner
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Detection::NoHand)
    }
}

/// Write half of a [`LatestSlot`].
#[derive(Clone)]
pub struct SlotWriter {
    inner: Arc<Mutex<Option<Detection>>>,
}

impl SlotWriter {
    /// Publishes a detection outcome, replacing any previous one.
    pub fn publish(&self, detection: Detection) {
        *self.inner.lock().unwrap() = Some(detection);
    }
}
