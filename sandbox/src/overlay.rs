//! A minimal editor overlay: frame statistics and a turntable model.

use std::collections::VecDeque;

use solstice_graphics::{Device, EditorOverlay, FrameView, GraphicsContext, GraphicsError, Scene};

/// Number of frame times averaged for the reported frame rate.
const HISTORY: usize = 120;

#[derive(Debug)]
pub struct StatsOverlay {
    frame_times: VecDeque<f32>,
    log_interval: u64,
    /// Model rotated about its vertical axis every frame.
    turntable: Option<String>,
    /// Radians per second.
    turntable_speed: f32,
}

impl StatsOverlay {
    pub fn new(log_interval: u64) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(HISTORY),
            log_interval: log_interval.max(1),
            turntable: None,
            turntable_speed: 0.0,
        }
    }

    pub fn with_turntable(mut self, model: impl Into<String>, speed: f32) -> Self {
        self.turntable = Some(model.into());
        self.turntable_speed = speed;
        self
    }

    fn record(&mut self, delta_time: f32) {
        if self.frame_times.len() == HISTORY {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(delta_time);
    }

    /// Average frames per second over the recorded history.
    pub fn average_fps(&self) -> Option<f32> {
        let total: f32 = self.frame_times.iter().sum();
        (total > 0.0).then(|| self.frame_times.len() as f32 / total)
    }
}

impl EditorOverlay for StatsOverlay {
    fn render(
        &mut self,
        device: &Device,
        scene: &mut Scene,
        frame: &FrameView,
        _ctx: &mut GraphicsContext,
    ) -> Result<(), GraphicsError> {
        self.record(frame.delta_time);

        if let Some(name) = &self.turntable
            && let Some(model) = scene.model_by_name(name)
        {
            model.transform.rotation.y += self.turntable_speed * frame.delta_time;
        }

        if frame.frame_count > 0 && frame.frame_count % self.log_interval == 0 {
            let memory = device.memory_report();
            log::info!(
                "frame {} ({}x{}): {:.1} fps, {} allocations ({} KiB)",
                frame.frame_count,
                frame.extent.width,
                frame.extent.height,
                self.average_fps().unwrap_or(0.0),
                memory.live_allocations,
                memory.live_bytes / 1024
            );
        }
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        log::info!("Viewport resized to {width}x{height}");
        self.frame_times.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_fps() {
        let mut overlay = StatsOverlay::new(60);
        assert_eq!(overlay.average_fps(), None);
        overlay.record(0.02);
        overlay.record(0.02);
        let fps = overlay.average_fps().unwrap();
        assert!((fps - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut overlay = StatsOverlay::new(60);
        for _ in 0..HISTORY {
            overlay.record(1.0);
        }
        for _ in 0..HISTORY {
            overlay.record(0.01);
        }
        assert_eq!(overlay.frame_times.len(), HISTORY);
        assert!((overlay.average_fps().unwrap() - 100.0).abs() < 1e-2);
    }
}
