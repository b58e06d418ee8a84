//! Rigid-body geometry primitives shared by every Fiducia crate.
//!
//! All quantities are `f64`.  Quaternions use the `(w, x, y, z)` field
//! order; the identity rotation is `w = 1`.  The all-zero quaternion is not a
//! rotation: it is the "never initialised" marker carried by poses that have
//! not yet been filled in.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (translation, position or rate).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1) when it is meant to represent a rotation.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// The all-zero quaternion used to tag an orientation that was never set.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// `true` when every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.w == 0.0 && self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Rotation of `angle_rad` around the (unit) `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f64) -> Self {
        let half = angle_rad * 0.5;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Build a rotation from fixed-axis roll (X), pitch (Y), yaw (Z) angles.
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    pub fn norm_squared(&self) -> f64 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Scale to unit length.  The zero quaternion is returned unchanged.
    pub fn normalized(self) -> Self {
        let n = self.norm_squared().sqrt();
        if n == 0.0 {
            return self;
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Row-major 3×3 rotation matrix.
    ///
    /// Non-unit quaternions are implicitly normalised.  The zero quaternion
    /// yields the identity matrix.
    pub fn to_rotation_matrix(&self) -> [[f64; 3]; 3] {
        let d = self.norm_squared();
        if d == 0.0 {
            return [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        }
        let s = 2.0 / d;
        let (xs, ys, zs) = (self.x * s, self.y * s, self.z * s);
        let (wx, wy, wz) = (self.w * xs, self.w * ys, self.w * zs);
        let (xx, xy, xz) = (self.x * xs, self.x * ys, self.x * zs);
        let (yy, yz, zz) = (self.y * ys, self.y * zs, self.z * zs);
        [
            [1.0 - (yy + zz), xy - wz, xz + wy],
            [xy + wz, 1.0 - (xx + zz), yz - wx],
            [xz - wy, yz + wx, 1.0 - (xx + yy)],
        ]
    }

    /// Decompose into fixed-axis `(roll, pitch, yaw)` via the rotation matrix.
    ///
    /// Pitch is kept in `[-π/2, π/2]`.  At gimbal lock yaw is pinned to zero
    /// and the remaining rotation is attributed to roll.
    pub fn to_rpy(&self) -> (f64, f64, f64) {
        let m = self.to_rotation_matrix();
        if m[2][0].abs() >= 1.0 {
            let roll = m[2][1].atan2(m[2][2]);
            let pitch = if m[2][0] < 0.0 {
                std::f64::consts::FRAC_PI_2
            } else {
                -std::f64::consts::FRAC_PI_2
            };
            (roll, pitch, 0.0)
        } else {
            let pitch = -m[2][0].asin();
            let c = pitch.cos();
            let roll = (m[2][1] / c).atan2(m[2][2] / c);
            let yaw = (m[1][0] / c).atan2(m[0][0] / c);
            (roll, pitch, yaw)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// `T_A_B` is the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// The inverse transform: T_A_B becomes T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation).neg(), inv_rot)
    }

    /// `self⁻¹ ∘ other`: the transform from `self` to `other`, expressed in
    /// `self`'s local frame.
    pub fn inverse_times(self, other: Self) -> Self {
        self.inverse().compose(other)
    }

    /// Map a point from the child frame into the parent frame.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(p))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
