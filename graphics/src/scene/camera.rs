//! Free-fly perspective camera.

use glam::{Mat4, Vec3};

use super::input::{CameraKeys, InputState};

/// Pitch is kept just short of straight up/down so the view basis stays
/// well defined.
const MAX_PITCH: f32 = 1.553_343; // 89 degrees

/// A first-person camera with damped movement.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Rotation around the world up axis, in radians. Zero looks down +z.
    pub yaw: f32,
    /// Rotation above the horizon, in radians.
    pub pitch: f32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Units per second at full speed.
    pub movement_speed: f32,
    /// Degrees per pixel of mouse movement.
    pub rotation_speed: f32,
    /// Fraction of the previous velocity kept each frame, in `0..1`.
    pub friction: f32,
    velocity: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, -10.0),
            yaw: 0.0,
            pitch: 0.0,
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
            movement_speed: 10.0,
            rotation_speed: 0.1,
            friction: 0.6,
            velocity: Vec3::ZERO,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Turn the camera to face `target`.
    pub fn look_at(&mut self, target: Vec3) {
        let direction = (target - self.position).normalize_or_zero();
        if direction == Vec3::ZERO {
            return;
        }
        self.yaw = direction.x.atan2(direction.z);
        self.pitch = direction.y.asin().clamp(-MAX_PITCH, MAX_PITCH);
    }

    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch)
    }

    pub fn right(&self) -> Vec3 {
        Vec3::Y.cross(self.forward()).normalize_or_zero()
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Apply one frame of input.
    pub fn update(&mut self, delta_time: f32, input: &InputState) {
        if input.look_active {
            let delta = input.mouse_delta * self.rotation_speed.to_radians();
            self.yaw += delta.x;
            self.pitch = (self.pitch - delta.y).clamp(-MAX_PITCH, MAX_PITCH);
        }

        let axis = input.movement_axis();
        let direction = self.right() * axis.x + Vec3::Y * axis.y + self.forward() * axis.z;
        let speed = if input.keys.contains(CameraKeys::BOOST) {
            self.movement_speed * 4.0
        } else {
            self.movement_speed
        };
        let target = direction.normalize_or_zero() * speed;

        let friction = self.friction.clamp(0.0, 0.99);
        self.velocity = self.velocity * friction + target * (1.0 - friction);
        self.position += self.velocity * delta_time;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_lh(self.position, self.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        Mat4::perspective_lh(self.fov_y_degrees.to_radians(), aspect_ratio, self.near, self.far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_movement() {
        let mut camera = Camera {
            friction: 0.0,
            ..Camera::new(Vec3::ZERO)
        };
        let mut input = InputState::new();
        input.set_key(CameraKeys::FORWARD, true);
        camera.update(0.5, &input);
        assert!((camera.position - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn test_friction_damps_velocity() {
        let mut camera = Camera::new(Vec3::ZERO);
        let mut input = InputState::new();
        input.set_key(CameraKeys::RIGHT, true);
        camera.update(0.016, &input);
        let first = camera.velocity().length();
        assert!(first < camera.movement_speed);

        input.set_key(CameraKeys::RIGHT, false);
        camera.update(0.016, &input);
        assert!(camera.velocity().length() < first);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        let input = InputState {
            mouse_delta: glam::Vec2::new(0.0, -100_000.0),
            look_active: true,
            ..Default::default()
        };
        camera.update(0.016, &input);
        assert!(camera.pitch <= MAX_PITCH);
        assert!(camera.forward().is_finite());
    }

    #[test]
    fn test_look_at() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, -5.0));
        camera.look_at(Vec3::new(5.0, 0.0, -5.0));
        assert!((camera.forward() - Vec3::X).length() < 1e-5);
    }
}
