//! Track information supplied by the downstream track-matching stage.

use serde::{Deserialize, Serialize};

/// A reconstructed track crossing one paddle of the plane.
///
/// Positions and angles are in the focal-plane frame used by the
/// path-length coefficients of the calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackIntercept {
    /// Paddle the track points at.
    pub paddle: usize,
    /// Track position at the plane.
    pub x: f64,
    /// Dispersive-plane angle.
    pub theta: f64,
    /// Transverse-plane angle.
    pub phi: f64,
}

impl TrackIntercept {
    /// Creates a new track intercept.
    #[must_use]
    pub fn new(paddle: usize, x: f64, theta: f64, phi: f64) -> Self {
        Self {
            paddle,
            x,
            theta,
            phi,
        }
    }
}
