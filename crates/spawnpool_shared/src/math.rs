//! Placement types shared between the pool core and the host.
//!
//! An instance's placement is applied on every spawn, whether the instance
//! was freshly allocated or popped from a free list.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - position, scale, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// All-ones vector, the neutral scale
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Component-wise product (applies a scale)
    #[must_use]
    pub fn scaled_by(self, scale: Self) -> Self {
        Self::new(self.x * scale.x, self.y * scale.y, self.z * scale.z)
    }

    /// Component-wise division (removes a scale).
    ///
    /// A zero scale axis collapses that axis to zero instead of producing
    /// infinities.
    #[must_use]
    pub fn unscaled_by(self, scale: Self) -> Self {
        let div = |v: f32, s: f32| if s == 0.0 { 0.0 } else { v / s };
        Self::new(div(self.x, scale.x), div(self.y, scale.y), div(self.z, scale.z))
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Rotation of `angle` radians around `axis`.
    #[must_use]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let len = axis.length();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        let (sin, cos) = (angle * 0.5).sin_cos();
        let a = axis * (sin / len);
        Self::new(a.x, a.y, a.z, cos)
    }

    /// Inverse rotation. Non-unit quaternions are normalized first.
    #[must_use]
    pub fn inverse(self) -> Self {
        let norm_sq = self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w;
        if norm_sq == 0.0 {
            return Self::IDENTITY;
        }
        Self::new(-self.x / norm_sq, -self.y / norm_sq, -self.z / norm_sq, self.w / norm_sq)
    }

    /// Rotates a vector by this quaternion.
    #[must_use]
    pub fn rotate(self, v: Vec3) -> Vec3 {
        // v' = v + 2w(q x v) + 2(q x (q x v))
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }
}

impl std::ops::Mul for Quaternion {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Placement - position + rotation + per-axis scale
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Placement {
    /// Position
    pub position: Vec3,
    /// Rotation
    pub rotation: Quaternion,
    /// Scale
    pub scale: Vec3,
}

impl Placement {
    /// Creates a new placement
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quaternion, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Placement at `position` and `rotation` with unit scale.
    #[must_use]
    pub const fn at(position: Vec3, rotation: Quaternion) -> Self {
        Self::new(position, rotation, Vec3::ONE)
    }

    /// Neutral placement: origin, no rotation, unit scale.
    pub const IDENTITY: Self = Self::new(Vec3::ZERO, Quaternion::IDENTITY, Vec3::ONE);

    /// Resolves a placement expressed relative to `parent` into the
    /// parent's space.
    #[must_use]
    pub fn compose(parent: Self, local: Self) -> Self {
        Self {
            position: parent.position
                + parent.rotation.rotate(local.position.scaled_by(parent.scale)),
            rotation: parent.rotation * local.rotation,
            scale: local.scale.scaled_by(parent.scale),
        }
    }

    /// Inverse of [`Placement::compose`]: expresses `world` relative to
    /// `parent`.
    #[must_use]
    pub fn relative_to(parent: Self, world: Self) -> Self {
        let inv = parent.rotation.inverse();
        Self {
            position: inv
                .rotate(world.position - parent.position)
                .unscaled_by(parent.scale),
            rotation: inv * world.rotation,
            scale: world.scale.unscaled_by(parent.scale),
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::IDENTITY
    }
}
