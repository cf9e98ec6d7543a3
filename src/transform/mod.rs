//! GPS to local-grid coordinate transform
//!
//! Local colony coordinates are meters east/north of the site's southwest
//! corner. A `CoordinateTransformer` is calibrated from 2 to 4 points whose
//! position is known in both systems:
//!
//! - 2 points: similarity (translate, rotate, uniform scale)
//! - 3 points: affine
//! - 4 points: projective (quadrilateral onto quadrilateral)
//!
//! Everything is solved once at construction. A configuration that cannot be
//! inverted is rejected there, so `to_local`/`to_gps` never fail.

mod solve;

use nalgebra::{Matrix3, Point2};
use thiserror::Error;

use crate::config::CalibrationConfig;
use crate::model::{Colony, ColonySet};

/// Minimum number of correspondence points.
pub const MIN_POINTS: usize = 2;
/// Maximum number of correspondence points.
pub const MAX_POINTS: usize = 4;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("need at least {MIN_POINTS} calibration points, got {0}")]
    TooFewPoints(usize),

    #[error("at most {MAX_POINTS} calibration points are supported, got {0}")]
    TooManyPoints(usize),

    /// Points coincide or are collinear, so the map cannot be inverted
    #[error("degenerate transform: {0}")]
    Degenerate(String),

    #[error("calibration colony {0} not found")]
    UnknownColony(i32),
}

/// A colony whose GPS position is known.
#[derive(Debug, Clone)]
pub struct MapPoint {
    colony: Colony,
    latitude: f64,
    longitude: f64,
}

impl MapPoint {
    pub fn new(colony: Colony, latitude: f64, longitude: f64) -> Self {
        Self {
            colony,
            latitude,
            longitude,
        }
    }

    pub fn colony(&self) -> &Colony {
        &self.colony
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Local X in meters (the colony's position)
    pub fn x(&self) -> f64 {
        self.colony.x()
    }

    /// Local Y in meters (the colony's position)
    pub fn y(&self) -> f64 {
        self.colony.y()
    }

    fn geodetic(&self) -> Point2<f64> {
        Point2::new(self.longitude, self.latitude)
    }

    fn local(&self) -> Point2<f64> {
        Point2::new(self.colony.x(), self.colony.y())
    }
}

/// Which model the transformer fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Similarity,
    Affine,
    Projective,
}

/// Immutable geodetic <-> local mapping.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateTransformer {
    kind: TransformKind,
    /// Homogeneous (lon, lat, 1) -> (x, y, w)
    forward: Matrix3<f64>,
    /// Homogeneous (x, y, 1) -> (lon, lat, w)
    inverse: Matrix3<f64>,
}

impl CoordinateTransformer {
    /// Calibrate from 2..=4 correspondence points.
    pub fn new(points: &[MapPoint]) -> Result<Self, TransformError> {
        let geodetic: Vec<Point2<f64>> = points.iter().map(MapPoint::geodetic).collect();
        let local: Vec<Point2<f64>> = points.iter().map(MapPoint::local).collect();

        let (kind, forward) = match points.len() {
            n if n < MIN_POINTS => return Err(TransformError::TooFewPoints(n)),
            2 => (
                TransformKind::Similarity,
                solve::similarity(&geodetic, &local)?,
            ),
            3 => (TransformKind::Affine, solve::affine(&geodetic, &local)?),
            4 => (
                TransformKind::Projective,
                solve::projective(&geodetic, &local)?,
            ),
            n => return Err(TransformError::TooManyPoints(n)),
        };

        let inverse = forward
            .try_inverse()
            .filter(|inverse| inverse.iter().all(|v| v.is_finite()))
            .ok_or_else(|| TransformError::Degenerate("transform is not invertible".into()))?;

        Ok(Self {
            kind,
            forward,
            inverse,
        })
    }

    /// Convenience for the classic two-point calibration.
    pub fn from_pair(point1: &MapPoint, point2: &MapPoint) -> Result<Self, TransformError> {
        Self::new(&[point1.clone(), point2.clone()])
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    /// Map GPS (longitude, latitude) to local (x, y).
    pub fn to_local(&self, longitude: f64, latitude: f64) -> (f64, f64) {
        apply(&self.forward, longitude, latitude)
    }

    /// Map local (x, y) to GPS (longitude, latitude).
    pub fn to_gps(&self, x: f64, y: f64) -> (f64, f64) {
        apply(&self.inverse, x, y)
    }
}

/// Resolve configured calibration points against a colony set and build
/// the transformer.
pub fn from_calibration(
    calibration: &CalibrationConfig,
    colonies: &ColonySet,
) -> Result<CoordinateTransformer, TransformError> {
    let points = calibration
        .points
        .iter()
        .map(|point| {
            colonies
                .get(point.colony_id)
                .map(|colony| MapPoint::new(colony.clone(), point.latitude, point.longitude))
                .ok_or(TransformError::UnknownColony(point.colony_id))
        })
        .collect::<Result<Vec<_>, _>>()?;
    CoordinateTransformer::new(&points)
}

fn apply(matrix: &Matrix3<f64>, u: f64, v: f64) -> (f64, f64) {
    let projected = matrix * nalgebra::Vector3::new(u, v, 1.0);
    (projected.x / projected.z, projected.y / projected.z)
}
