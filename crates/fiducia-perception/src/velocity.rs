//! Finite-difference velocity between two timestamped poses.
//!
//! The relative transform `previous⁻¹ ∘ current` gives the motion between
//! the two samples in the previous pose's local frame.  Its translation is
//! the linear delta; its rotation is decomposed into roll/pitch/yaw and
//! treated as the angular delta.  Both are divided by the elapsed time.
//!
//! ```text
//! Δ      = T_prev⁻¹ · T_cur
//! v      = Δ.translation / Δt
//! ω      = rpy(Δ.rotation) / Δt
//! ```

use fiducia_types::{Quaternion, RigidPose, Transform3D, Twist, Vec3};

/// Computes [`Twist`]s from consecutive poses.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityEstimator;

impl VelocityEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Velocity that carries `previous` onto `current`.
    ///
    /// A `previous` orientation equal to the zero quaternion is read as the
    /// identity; any other orientation is normalised first.  Callers must
    /// ensure `current.stamp > previous.stamp`; an elapsed time of zero is
    /// not handled here.
    pub fn estimate(&self, previous: &RigidPose, current: &RigidPose) -> Twist {
        let delta_t = current.seconds_since(previous);
        debug_assert!(delta_t > 0.0, "velocity requested over non-positive dt {delta_t}");

        let previous_rotation = if previous.orientation.is_zero() {
            Quaternion::identity()
        } else {
            previous.orientation.normalized()
        };
        let t0 = Transform3D::new(previous.position, previous_rotation);
        let t1 = Transform3D::new(current.position, current.orientation.normalized());

        let deltas = t0.inverse_times(t1);
        let (roll, pitch, yaw) = deltas.rotation.to_rpy();

        Twist {
            linear: deltas.translation.scale(1.0 / delta_t),
            angular: Vec3::new(roll / delta_t, pitch / delta_t, yaw / delta_t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};

    fn pose_at(secs: f64, position: Vec3, orientation: Quaternion) -> RigidPose {
        let stamp = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::nanoseconds((secs * 1e9) as i64);
        RigidPose::new("bin_link", stamp, position, orientation)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn constant_translation_gives_linear_velocity() {
        let previous = pose_at(0.0, Vec3::zero(), Quaternion::identity());
        let current = pose_at(2.0, Vec3::new(2.0, 0.0, 0.0), Quaternion::identity());
        let twist = VelocityEstimator::new().estimate(&previous, &current);
        assert_close(twist.linear.x, 1.0);
        assert_close(twist.linear.y, 0.0);
        assert_close(twist.linear.z, 0.0);
        assert_eq!(twist.angular, Vec3::zero());
    }

    #[test]
    fn yaw_rate_matches_rotation_over_time() {
        let theta = 0.6;
        let dt = 1.5;
        let axis = Vec3::new(0.0, 0.0, 1.0);
        let start = Quaternion::from_axis_angle(axis, 0.25);
        let end = start.mul(Quaternion::from_axis_angle(axis, theta));
        let previous = pose_at(10.0, Vec3::new(1.0, 1.0, 0.0), start);
        let current = pose_at(10.0 + dt, Vec3::new(1.0, 1.0, 0.0), end);

        let twist = VelocityEstimator::new().estimate(&previous, &current);
        assert_close(twist.angular.z, theta / dt);
        assert_close(twist.angular.x, 0.0);
        assert_close(twist.angular.y, 0.0);
        assert!(twist.linear.norm() < 1e-9);
    }

    #[test]
    fn zero_quaternion_previous_acts_as_identity() {
        let current = pose_at(
            0.5,
            Vec3::new(0.3, -0.2, 0.1),
            Quaternion::from_rpy(0.1, 0.2, 0.3),
        );
        let unset = pose_at(0.0, Vec3::new(0.1, 0.0, 0.0), Quaternion::zero());
        let identity = pose_at(0.0, Vec3::new(0.1, 0.0, 0.0), Quaternion::identity());

        let estimator = VelocityEstimator::new();
        let a = estimator.estimate(&unset, &current);
        let b = estimator.estimate(&identity, &current);
        assert_eq!(a, b);
    }

    #[test]
    fn linear_delta_is_in_previous_local_frame() {
        // Facing +Y and moving along world +Y is forward motion.
        let yaw90 =
            Quaternion::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2);
        let previous = pose_at(0.0, Vec3::zero(), yaw90);
        let current = pose_at(0.5, Vec3::new(0.0, 1.0, 0.0), yaw90);
        let twist = VelocityEstimator::new().estimate(&previous, &current);
        assert_close(twist.linear.x, 2.0);
        assert_close(twist.linear.y, 0.0);
    }

    #[test]
    fn scaled_orientations_do_not_scale_velocity() {
        let doubled = Quaternion::new(2.0, 0.0, 0.0, 0.0);
        let previous = pose_at(0.0, Vec3::new(-1.0, 0.0, 0.0), doubled);
        let current = pose_at(1.0, Vec3::new(-2.0, 0.0, 0.0), doubled);
        let twist = VelocityEstimator::new().estimate(&previous, &current);
        assert_close(twist.linear.x, -1.0);
        assert_close(twist.linear.y, 0.0);
        assert_eq!(twist.angular, Vec3::zero());
    }

    #[test]
    fn roll_and_pitch_rates_are_reported_separately() {
        let previous = pose_at(0.0, Vec3::zero(), Quaternion::identity());
        let current = pose_at(0.1, Vec3::zero(), Quaternion::from_rpy(0.02, -0.03, 0.0));
        let twist = VelocityEstimator::new().estimate(&previous, &current);
        assert_close(twist.angular.x, 0.2);
        assert_close(twist.angular.y, -0.3);
        assert_close(twist.angular.z, 0.0);
    }
}
