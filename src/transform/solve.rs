//! Solvers for the three calibration models.
//!
//! Each returns the homogeneous forward matrix mapping (lon, lat, 1) to
//! local (x, y, w).

use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};

use super::TransformError;

/// Area below this fraction of the squared extent counts as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-10;

/// Two-point similarity. Point 0 maps exactly; point 1 fixes rotation and
/// scale.
pub(super) fn similarity(
    geodetic: &[Point2<f64>],
    local: &[Point2<f64>],
) -> Result<Matrix3<f64>, TransformError> {
    let geo_delta = geodetic[1] - geodetic[0];
    let local_delta = local[1] - local[0];

    let geo_distance = geo_delta.norm();
    let local_distance = local_delta.norm();
    if is_negligible(geo_distance, &geodetic[..2]) {
        return Err(TransformError::Degenerate(
            "calibration points share a GPS position".into(),
        ));
    }
    if is_negligible(local_distance, &local[..2]) {
        return Err(TransformError::Degenerate(
            "calibration points share a local position".into(),
        ));
    }

    let rotation = local_delta.y.atan2(local_delta.x) - geo_delta.y.atan2(geo_delta.x);
    let scale = local_distance / geo_distance;
    let (a, b) = (scale * rotation.cos(), scale * rotation.sin());

    let origin = geodetic[0];
    let tx = local[0].x - (a * origin.x - b * origin.y);
    let ty = local[0].y - (b * origin.x + a * origin.y);

    Ok(Matrix3::new(a, -b, tx, b, a, ty, 0.0, 0.0, 1.0))
}

/// Three-point affine fit.
pub(super) fn affine(
    geodetic: &[Point2<f64>],
    local: &[Point2<f64>],
) -> Result<Matrix3<f64>, TransformError> {
    require_general_position(geodetic, "GPS")?;
    require_general_position(local, "local")?;

    let (geo_norm, geo) = normalize(geodetic)?;
    let (local_denorm, dst) = denormalize(local)?;

    let system = Matrix3::new(
        geo[0].x, geo[0].y, 1.0, //
        geo[1].x, geo[1].y, 1.0, //
        geo[2].x, geo[2].y, 1.0,
    );
    let lu = system.lu();
    let row_x = lu
        .solve(&Vector3::new(dst[0].x, dst[1].x, dst[2].x))
        .ok_or_else(singular)?;
    let row_y = lu
        .solve(&Vector3::new(dst[0].y, dst[1].y, dst[2].y))
        .ok_or_else(singular)?;

    let normalized = Matrix3::new(
        row_x[0], row_x[1], row_x[2], //
        row_y[0], row_y[1], row_y[2], //
        0.0, 0.0, 1.0,
    );
    Ok(local_denorm * normalized * geo_norm)
}

/// Four-point projective fit (direct linear solve with h33 = 1).
pub(super) fn projective(
    geodetic: &[Point2<f64>],
    local: &[Point2<f64>],
) -> Result<Matrix3<f64>, TransformError> {
    require_general_position(geodetic, "GPS")?;
    require_general_position(local, "local")?;

    let (geo_norm, src) = normalize(geodetic)?;
    let (local_denorm, dst) = denormalize(local)?;

    let mut system = SMatrix::<f64, 8, 8>::zeros();
    let mut rhs = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let (u, v) = (src[i].x, src[i].y);
        let (x, y) = (dst[i].x, dst[i].y);

        let r = 2 * i;
        system[(r, 0)] = u;
        system[(r, 1)] = v;
        system[(r, 2)] = 1.0;
        system[(r, 6)] = -x * u;
        system[(r, 7)] = -x * v;
        rhs[r] = x;

        system[(r + 1, 3)] = u;
        system[(r + 1, 4)] = v;
        system[(r + 1, 5)] = 1.0;
        system[(r + 1, 6)] = -y * u;
        system[(r + 1, 7)] = -y * v;
        rhs[r + 1] = y;
    }

    let h = system.lu().solve(&rhs).ok_or_else(singular)?;
    let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    Ok(local_denorm * normalized * geo_norm)
}

/// Translate the centroid to the origin and scale the mean distance to √2.
/// Returns the normalizing matrix and the normalized points.
fn normalize(
    points: &[Point2<f64>],
) -> Result<(Matrix3<f64>, Vec<Point2<f64>>), TransformError> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let centroid = Point2::new(cx, cy);
    let mean = points
        .iter()
        .map(|p| nalgebra::distance(p, &centroid))
        .sum::<f64>()
        / n;
    if mean <= 0.0 || !mean.is_finite() {
        return Err(TransformError::Degenerate("calibration points coincide".into()));
    }

    let s = std::f64::consts::SQRT_2 / mean;
    let matrix = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Ok((matrix, normalized))
}

/// Like `normalize`, but returns the matrix undoing the normalization.
fn denormalize(
    points: &[Point2<f64>],
) -> Result<(Matrix3<f64>, Vec<Point2<f64>>), TransformError> {
    let (matrix, normalized) = normalize(points)?;
    let s = matrix[(0, 0)];
    let (cx, cy) = (-matrix[(0, 2)] / s, -matrix[(1, 2)] / s);
    let inverse = Matrix3::new(1.0 / s, 0.0, cx, 0.0, 1.0 / s, cy, 0.0, 0.0, 1.0);
    Ok((inverse, normalized))
}

/// Every triple of points must span a triangle of non-negligible area.
fn require_general_position(points: &[Point2<f64>], system: &str) -> Result<(), TransformError> {
    let extent = points
        .iter()
        .flat_map(|p| points.iter().map(move |q| nalgebra::distance(p, q)))
        .fold(0.0, f64::max);
    if extent <= 0.0 {
        return Err(TransformError::Degenerate(format!(
            "{system} calibration points coincide"
        )));
    }

    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let ab = points[j] - points[i];
                let ac = points[k] - points[i];
                let twice_area = ab.x * ac.y - ab.y * ac.x;
                if twice_area.abs() <= COLLINEAR_TOLERANCE * extent * extent {
                    return Err(TransformError::Degenerate(format!(
                        "{system} calibration points {i}, {j} and {k} are collinear"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn is_negligible(distance: f64, points: &[Point2<f64>]) -> bool {
    let magnitude = points
        .iter()
        .map(|p| p.x.abs().max(p.y.abs()))
        .fold(1.0, f64::max);
    !distance.is_finite() || distance <= f64::EPSILON * magnitude
}

fn singular() -> TransformError {
    TransformError::Degenerate("calibration system is singular".into())
}
