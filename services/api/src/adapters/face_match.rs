//! services/api/src/adapters/face_match.rs
//!
//! This module contains the face matcher implementing the `FaceMatchService`
//! port from the `core` crate. The simulated matcher returns a fixed synthetic
//! distance; a real face-embedding comparison plugs in behind the same port.

use async_trait::async_trait;
use std::time::Duration;
use verifly_core::domain::{FaceComparison, ImageData};
use verifly_core::ports::{FaceMatchService, PortResult};

/// The synthetic distance the demo matcher reports for every pair.
pub const DEMO_MATCH_DISTANCE: f32 = 0.23;

/// A matcher stand-in that reports a fixed distance after a fixed delay.
#[derive(Clone)]
pub struct SimulatedFaceMatcher {
    delay: Duration,
    distance: f32,
}

impl SimulatedFaceMatcher {
    /// Creates a matcher reporting the demo distance.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            distance: DEMO_MATCH_DISTANCE,
        }
    }

    /// Creates a matcher reporting a specific distance (useful in tests).
    pub fn with_distance(delay: Duration, distance: f32) -> Self {
        Self { delay, distance }
    }
}

#[async_trait]
impl FaceMatchService for SimulatedFaceMatcher {
    async fn compare_faces(
        &self,
        _document: &ImageData,
        _selfie: &ImageData,
    ) -> PortResult<FaceComparison> {
        tokio::time::sleep(self.delay).await;
        Ok(FaceComparison {
            distance: self.distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn demo_matcher_reports_the_fixed_distance() {
        let matcher = SimulatedFaceMatcher::new(Duration::ZERO);
        let image = ImageData {
            bytes: Bytes::from_static(b"img"),
            content_type: "image/jpeg".to_string(),
        };

        let comparison = matcher.compare_faces(&image, &image).await.unwrap();
        assert!((comparison.distance - DEMO_MATCH_DISTANCE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn custom_distance_is_reported_as_given() {
        let matcher = SimulatedFaceMatcher::with_distance(Duration::ZERO, 0.91);
        let image = ImageData {
            bytes: Bytes::from_static(b"img"),
            content_type: "image/jpeg".to_string(),
        };

        let comparison = matcher.compare_faces(&image, &image).await.unwrap();
        assert!((comparison.distance - 0.91).abs() < f32::EPSILON);
    }
}
