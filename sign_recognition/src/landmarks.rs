//! Hand landmark types in the 21-point MediaPipe hand topology.

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 21;
pub const COORDINATES: usize = 3;
/// Length of a flattened landmark set.
pub const FEATURE_COUNT: usize = LANDMARK_COUNT * COORDINATES;

pub mod index {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_MCP: usize = 5;
    pub const INDEX_FINGER_PIP: usize = 6;
    pub const INDEX_FINGER_DIP: usize = 7;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_MCP: usize = 9;
    pub const MIDDLE_FINGER_PIP: usize = 10;
    pub const MIDDLE_FINGER_DIP: usize = 11;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_MCP: usize = 13;
    pub const RING_FINGER_PIP: usize = 14;
    pub const RING_FINGER_DIP: usize = 15;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

/// Skeleton edges drawn when annotating a hand.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = {
    use index::*;
    [
        (WRIST, THUMB_CMC),
        (THUMB_CMC, THUMB_MCP),
        (THUMB_MCP, THUMB_IP),
        (THUMB_IP, THUMB_TIP),
        (WRIST, INDEX_FINGER_MCP),
        (INDEX_FINGER_MCP, INDEX_FINGER_PIP),
        (INDEX_FINGER_PIP, INDEX_FINGER_DIP),
        (INDEX_FINGER_DIP, INDEX_FINGER_TIP),
        (INDEX_FINGER_MCP, MIDDLE_FINGER_MCP),
        (MIDDLE_FINGER_MCP, MIDDLE_FINGER_PIP),
        (MIDDLE_FINGER_PIP, MIDDLE_FINGER_DIP),
        (MIDDLE_FINGER_DIP, MIDDLE_FINGER_TIP),
        (MIDDLE_FINGER_MCP, RING_FINGER_MCP),
        (RING_FINGER_MCP, RING_FINGER_PIP),
        (RING_FINGER_PIP, RING_FINGER_DIP),
        (RING_FINGER_DIP, RING_FINGER_TIP),
        (RING_FINGER_MCP, PINKY_MCP),
        (WRIST, PINKY_MCP),
        (PINKY_MCP, PINKY_PIP),
        (PINKY_PIP, PINKY_DIP),
        (PINKY_DIP, PINKY_TIP),
    ]
};

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("expected {expected} landmark values, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A landmark in normalised image space: x and y are fractions of the image
/// width and height, z is depth relative to the wrist on roughly the x scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Exactly 21 landmarks of one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Builds a set from `x0, y0, z0, x1, ...`.
    pub fn from_flat(values: &[f32]) -> Result<Self, LandmarkError> {
        if values.len() != FEATURE_COUNT {
            return Err(LandmarkError::InvalidLength {
                expected: FEATURE_COUNT,
                actual: values.len(),
            });
        }
        let mut points = [Landmark::default(); LANDMARK_COUNT];
        for (point, coords) in points.iter_mut().zip(values.chunks_exact(COORDINATES)) {
            *point = Landmark::new(coords[0], coords[1], coords[2]);
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }

    /// Applies `f` to every point, keeping the order.
    pub fn map(&self, f: impl FnMut(Landmark) -> Landmark) -> Self {
        Self {
            points: self.points.map(f),
        }
    }

    pub fn to_triples(&self) -> Vec<[f32; 3]> {
        self.points.iter().map(|p| p.to_array()).collect()
    }

    /// Classifier input: one hand slot, 21 points, 3 coordinates.
    pub fn to_tensor(&self) -> Array3<f32> {
        let mut tensor = Array3::zeros((1, LANDMARK_COUNT, COORDINATES));
        for (i, point) in self.points.iter().enumerate() {
            tensor[[0, i, 0]] = point.x;
            tensor[[0, i, 1]] = point.y;
            tensor[[0, i, 2]] = point.z;
        }
        tensor
    }
}
