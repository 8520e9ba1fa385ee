//! Per-frame input snapshot consumed by the camera.

use bitflags::bitflags;
use glam::{Vec2, Vec3};

bitflags! {
    /// Camera movement keys held this frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CameraKeys: u32 {
        const FORWARD = 1 << 0;
        const BACKWARD = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const UP = 1 << 4;
        const DOWN = 1 << 5;
        /// Move faster while held.
        const BOOST = 1 << 6;
    }
}

/// Input gathered by the platform layer for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub keys: CameraKeys,
    /// Cursor movement in pixels since the previous frame.
    pub mouse_delta: Vec2,
    /// Mouse look is only applied while this is set (e.g. right button held).
    pub look_active: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key(&mut self, key: CameraKeys, pressed: bool) {
        self.keys.set(key, pressed);
    }

    /// Movement direction in camera space: +x right, +y up, +z forward.
    ///
    /// Opposite keys cancel out. Not normalized.
    pub fn movement_axis(&self) -> Vec3 {
        let axis = |positive: CameraKeys, negative: CameraKeys| -> f32 {
            f32::from(u8::from(self.keys.contains(positive)))
                - f32::from(u8::from(self.keys.contains(negative)))
        };
        Vec3::new(
            axis(CameraKeys::RIGHT, CameraKeys::LEFT),
            axis(CameraKeys::UP, CameraKeys::DOWN),
            axis(CameraKeys::FORWARD, CameraKeys::BACKWARD),
        )
    }

    /// Clear per-frame deltas; held keys persist.
    pub fn end_frame(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_keys_cancel() {
        let mut input = InputState::new();
        input.set_key(CameraKeys::FORWARD, true);
        input.set_key(CameraKeys::LEFT, true);
        assert_eq!(input.movement_axis(), Vec3::new(-1.0, 0.0, 1.0));

        input.set_key(CameraKeys::BACKWARD, true);
        assert_eq!(input.movement_axis().z, 0.0);

        input.set_key(CameraKeys::FORWARD, false);
        assert_eq!(input.movement_axis().z, -1.0);
    }

    #[test]
    fn test_end_frame_keeps_keys() {
        let mut input = InputState {
            keys: CameraKeys::UP,
            mouse_delta: Vec2::new(3.0, -2.0),
            look_active: true,
        };
        input.end_frame();
        assert_eq!(input.mouse_delta, Vec2::ZERO);
        assert!(input.keys.contains(CameraKeys::UP));
    }
}
