//! Distance primitive used by the containment checks.
//!
//! [`DistanceMetric`] is the seam: the engine only needs "meters between two
//! coordinates, or nothing if that cannot be computed". [`Vincenty`] is the
//! default implementation (inverse Vincenty formula on the WGS-84 ellipsoid).

const AXIS_A: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;
const AXIS_B: f64 = 6_356_752.314_245;
const MAX_ITERATIONS: usize = 200;
const CONVERGENCE_THRESHOLD: f64 = 1e-12;

/// Computes the distance in meters between two points.
///
/// Returns `None` when the distance is undefined for the given input (non-finite
/// coordinates, or an iterative method that fails to converge).
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<f64>;
}

/// Inverse Vincenty distance on the WGS-84 ellipsoid.
///
/// Nearly antipodal points may not converge, in which case the distance is `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vincenty;

impl DistanceMetric for Vincenty {
    fn distance(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<f64> {
        vincenty(lat1, lon1, lat2, lon2)
    }
}

/// Free-function form of [`Vincenty`].
pub fn vincenty(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<f64> {
    if ![lat1, lon1, lat2, lon2].iter().all(|v| v.is_finite()) {
        return None;
    }
    if lat1 == lat2 && lon1 == lon2 {
        return Some(0.0);
    }

    let u1 = ((1.0 - FLATTENING) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - FLATTENING) * lat2.to_radians().tan()).atan();
    let l = (lon2 - lon1).to_radians();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    let mut converged = false;
    let (mut sin_sigma, mut cos_sigma, mut sigma) = (0.0, 0.0, 0.0);
    let (mut cos_sq_alpha, mut cos2_sigma_m) = (0.0, 0.0);

    for _ in 0..MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Some(0.0);
        }
        cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        cos_sq_alpha = 1.0 - sin_alpha.powi(2);
        cos2_sigma_m = if cos_sq_alpha == 0.0 {
            // equatorial line
            0.0
        } else {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        };
        let c = FLATTENING / 16.0 * cos_sq_alpha * (4.0 + FLATTENING * (4.0 - 3.0 * cos_sq_alpha));
        let lambda_prev = lambda;
        lambda = l
            + (1.0 - c)
                * FLATTENING
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos2_sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos2_sigma_m.powi(2))));
        if (lambda - lambda_prev).abs() < CONVERGENCE_THRESHOLD {
            converged = true;
            break;
        }
    }

    if !converged {
        return None;
    }

    let u_sq = cos_sq_alpha * (AXIS_A.powi(2) - AXIS_B.powi(2)) / AXIS_B.powi(2);
    let a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    let delta_sigma = b
        * sin_sigma
        * (cos2_sigma_m
            + b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos2_sigma_m.powi(2))
                    - b / 6.0
                        * cos2_sigma_m
                        * (-3.0 + 4.0 * sin_sigma.powi(2))
                        * (-3.0 + 4.0 * cos2_sigma_m.powi(2))));

    Some(AXIS_B * a * (sigma - delta_sigma))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        assert_eq!(vincenty(52.37, 4.89, 52.37, 4.89), Some(0.0));
    }

    #[test]
    fn paris_to_new_york() {
        let d = vincenty(48.864716, 2.349014, 40.730610, -73.935242).unwrap();
        assert!((d - 5_846_390.0).abs() < 2_000.0, "got {d}");
    }

    #[test]
    fn short_distance_is_meter_scale() {
        // 0.0001 degree of latitude is roughly 11 meters
        let d = vincenty(40.0, -75.0, 40.0001, -75.0).unwrap();
        assert!(d > 10.0 && d < 12.0, "got {d}");
    }

    #[test]
    fn non_finite_input_is_undefined() {
        assert!(vincenty(f64::NAN, 0.0, 1.0, 1.0).is_none());
        assert!(Vincenty.distance(0.0, f64::INFINITY, 1.0, 1.0).is_none());
    }

    #[test]
    fn nearly_antipodal_points_do_not_converge() {
        assert!(vincenty(0.0, 0.0, 0.5, 179.7).is_none());
    }
}
