use glam::{Mat4, Vec2};

/// Orthographic 2D camera, y-up, centred on `position`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera2D {
    pub position: Vec2,
    pub zoom: f32,
    pub viewport: (u32, u32),
}

impl Camera2D {
    pub fn new(viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: 1.0,
            viewport: (viewport_width, viewport_height),
        }
    }

    /// Camera whose view maps world `(0, 0)` to the bottom-left corner of the viewport.
    pub fn bottom_left(viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            position: Vec2::new(viewport_width as f32 * 0.5, viewport_height as f32 * 0.5),
            ..Self::new(viewport_width, viewport_height)
        }
    }

    pub fn projection(&self) -> Mat4 {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        let half_w = (self.viewport.0 as f32) / (2.0 * zoom);
        let half_h = (self.viewport.1 as f32) / (2.0 * zoom);

        Mat4::orthographic_rh(
            self.position.x - half_w,
            self.position.x + half_w,
            self.position.y - half_h,
            self.position.y + half_h,
            -1.0,
            1.0,
        )
    }

    pub fn view_proj(&self) -> [[f32; 4]; 4] {
        self.projection().to_cols_array_2d()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn centre_maps_to_clip_origin() {
        let mut camera = Camera2D::new(800, 600);
        camera.position = Vec2::new(100.0, 50.0);
        let clip = camera.projection() * Vec4::new(100.0, 50.0, 0.0, 1.0);
        assert!(clip.x.abs() < 1e-6 && clip.y.abs() < 1e-6);
    }

    #[test]
    fn bottom_left_camera_puts_origin_in_corner() {
        let camera = Camera2D::bottom_left(200, 100);
        let clip = camera.projection() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.x + 1.0).abs() < 1e-6);
        assert!((clip.y + 1.0).abs() < 1e-6);
        let top_right = camera.projection() * Vec4::new(200.0, 100.0, 0.0, 1.0);
        assert!((top_right.x - 1.0).abs() < 1e-6 && (top_right.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zoom_shrinks_visible_area() {
        let mut camera = Camera2D::new(100, 100);
        camera.zoom = 2.0;
        let clip = camera.projection() * Vec4::new(25.0, 0.0, 0.0, 1.0);
        assert!((clip.x - 1.0).abs() < 1e-6);
    }
}
