use std::cell::OnceCell;
use std::sync::Arc;

use glam::Vec2;
use pb_core::geometry::{is_point_in_polygon, transform_points};
use pb_core::{Aabb, Color, Texture};
use pb_render::{SpriteInstance, TexCoords};

/// A textured, transformable quad.
///
/// Fields are private so every transform change also drops the cached
/// world-space hit box. Inside a `SpriteList`, mutate through
/// `SpriteList::modify` so the list sees the change.
#[derive(Debug, Clone)]
pub struct Sprite {
    texture: Arc<Texture>,
    position: Vec2,
    scale: Vec2,
    /// Degrees, counter-clockwise.
    angle: f32,
    color: Color,
    visible: bool,
    velocity: Vec2,
    angular_velocity: f32,
    hit_box: OnceCell<Vec<Vec2>>,
}

/// Everything that feeds a sprite's instance record. Textures compare by
/// identity, so swapping in an equal-keyed texture still counts as a change.
#[derive(Debug, Clone)]
pub(crate) struct RenderState {
    texture: Arc<Texture>,
    position: Vec2,
    scale: Vec2,
    angle: f32,
    color: Color,
    visible: bool,
}

impl PartialEq for RenderState {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.texture, &other.texture)
            && self.position == other.position
            && self.scale == other.scale
            && self.angle == other.angle
            && self.color == other.color
            && self.visible == other.visible
    }
}

impl Sprite {
    pub fn new(texture: Arc<Texture>) -> Self {
        Self {
            texture,
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            angle: 0.0,
            color: Color::WHITE,
            visible: true,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            hit_box: OnceCell::new(),
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.set_position(position);
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.set_scale(scale);
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.set_angle(angle);
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    fn invalidate(&mut self) {
        self.hit_box.take();
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    pub fn set_texture(&mut self, texture: Arc<Texture>) {
        self.texture = texture;
        self.invalidate();
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        if self.position != position {
            self.position = position;
            self.invalidate();
        }
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.set_position(self.position + delta);
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.set_scale_xy(Vec2::splat(scale));
    }

    pub fn set_scale_xy(&mut self, scale: Vec2) {
        if self.scale != scale {
            self.scale = scale;
            self.invalidate();
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn set_angle(&mut self, angle: f32) {
        if self.angle != angle {
            self.angle = angle;
            self.invalidate();
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn alpha(&self) -> u8 {
        self.color.a
    }

    pub fn set_alpha(&mut self, alpha: u8) {
        self.color.a = alpha;
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec2) {
        self.velocity = velocity;
    }

    /// Degrees per update.
    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, degrees: f32) {
        self.angular_velocity = degrees;
    }

    /// Texture size multiplied by scale.
    pub fn size(&self) -> Vec2 {
        self.texture.size() * self.scale
    }

    pub fn width(&self) -> f32 {
        self.size().x.abs()
    }

    pub fn height(&self) -> f32 {
        self.size().y.abs()
    }

    /// Texture hit box with this sprite's scale, rotation and position applied.
    pub fn hit_box(&self) -> &[Vec2] {
        self.hit_box
            .get_or_init(|| transform_points(self.texture.hit_box(), self.position, self.scale, self.angle))
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(self.hit_box()).unwrap_or_else(|| Aabb::from_center_size(self.position, self.size()))
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        self.aabb().contains_point(point) && is_point_in_polygon(point, self.hit_box())
    }

    /// Apply velocity and angular velocity once. Returns whether anything moved.
    pub fn update(&mut self) -> bool {
        if self.velocity == Vec2::ZERO && self.angular_velocity == 0.0 {
            return false;
        }
        self.position += self.velocity;
        self.angle += self.angular_velocity;
        self.invalidate();
        true
    }

    pub(crate) fn render_state(&self) -> RenderState {
        RenderState {
            texture: self.texture.clone(),
            position: self.position,
            scale: self.scale,
            angle: self.angle,
            color: self.color,
            visible: self.visible,
        }
    }

    /// Instance record for the current state; hidden sprites get zero alpha.
    pub fn instance(&self, coords: TexCoords) -> SpriteInstance {
        let mut color = self.color.to_f32_array();
        if !self.visible {
            color[3] = 0.0;
        }
        SpriteInstance {
            position: self.position.to_array(),
            size: self.size().to_array(),
            angle: self.angle.to_radians(),
            _padding: 0.0,
            color,
            uv: coords.to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: u32) -> Arc<Texture> {
        Arc::new(Texture::solid(size, size, Color::WHITE))
    }

    #[test]
    fn hit_box_follows_transform() {
        let mut sprite = Sprite::new(square(10)).with_position(Vec2::new(100.0, 50.0));
        let aabb = sprite.aabb();
        assert_eq!(aabb.min, Vec2::new(95.0, 45.0));
        assert_eq!(aabb.max, Vec2::new(105.0, 55.0));

        sprite.set_scale(2.0);
        assert_eq!(sprite.aabb().min, Vec2::new(90.0, 40.0));

        sprite.set_angle(45.0);
        let half_diag = 10.0 * std::f32::consts::SQRT_2;
        assert!((sprite.aabb().max.x - (100.0 + half_diag)).abs() < 1e-3);
    }

    #[test]
    fn update_applies_velocity() {
        let mut sprite = Sprite::new(square(4)).with_velocity(Vec2::new(1.0, -2.0));
        sprite.set_angular_velocity(90.0);
        let before = sprite.aabb();
        assert!(sprite.update());
        assert_eq!(sprite.position(), Vec2::new(1.0, -2.0));
        assert_eq!(sprite.angle(), 90.0);
        assert_ne!(sprite.aabb(), before);

        let mut still = Sprite::new(square(4));
        assert!(!still.update());
    }

    #[test]
    fn contains_point_uses_the_polygon() {
        let tex = Arc::new(Texture::circle(20, Color::RED));
        let sprite = Sprite::new(tex);
        assert!(sprite.contains_point(Vec2::ZERO));
        assert!(!sprite.contains_point(Vec2::new(9.8, 9.8)));
    }

    #[test]
    fn hidden_sprites_emit_zero_alpha() {
        let mut sprite = Sprite::new(square(8)).with_angle(180.0);
        sprite.set_visible(false);
        let coords = TexCoords {
            u0: 0.25,
            v0: 0.5,
            du: 0.125,
            dv: 0.125,
        };
        let inst = sprite.instance(coords);
        assert_eq!(inst.color[3], 0.0);
        assert_eq!(inst.size, [8.0, 8.0]);
        assert!((inst.angle - std::f32::consts::PI).abs() < 1e-6);
        assert_eq!(inst.uv, [0.25, 0.5, 0.125, 0.125]);
    }

    #[test]
    fn render_state_tracks_texture_identity() {
        let mut sprite = Sprite::new(square(8));
        let before = sprite.render_state();
        assert_eq!(sprite.clone().render_state(), before);
        let same_key = square(8);
        assert_eq!(same_key.cache_key(), sprite.texture().cache_key());
        sprite.set_texture(same_key);
        assert_ne!(sprite.render_state(), before);
    }
}
