use glam::{Mat4, Vec3};

use crate::backend::{LightDescriptor, LightType};
use crate::resources::version_tracker::ChangeTracker;

/// Lowest intensity a light accepts.
pub const MIN_LIGHT_INTENSITY: f32 = 0.0001;

/// A light attached to a node.
///
/// Position and direction are in the node's local space. Every setter bumps
/// [`Light::version`], which is how the renderer decides whether the native
/// light needs a push.
#[derive(Debug, Clone)]
pub struct Light {
    light_type: LightType,
    color: Vec3,
    intensity: f32,
    falloff_radius: f32,
    inner_cone_angle: f32,
    outer_cone_angle: f32,
    cast_shadows: bool,
    position: Vec3,
    direction: Vec3,
    changes: ChangeTracker,
}

impl Light {
    #[must_use]
    pub fn new(light_type: LightType) -> Self {
        Self {
            light_type,
            color: Vec3::ONE,
            intensity: 2500.0,
            falloff_radius: 10.0,
            inner_cone_angle: 0.5,
            outer_cone_angle: 0.6,
            cast_shadows: false,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            changes: ChangeTracker::new(),
        }
    }

    #[must_use]
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        let mut light = Self::new(LightType::Directional);
        light.set_color(color);
        light.set_intensity(intensity);
        light
    }

    #[must_use]
    pub fn point(color: Vec3, intensity: f32, falloff_radius: f32) -> Self {
        let mut light = Self::new(LightType::Point);
        light.set_color(color);
        light.set_intensity(intensity);
        light.set_falloff_radius(falloff_radius);
        light
    }

    #[must_use]
    pub fn spot(color: Vec3, intensity: f32, inner: f32, outer: f32) -> Self {
        let mut light = Self::new(LightType::Spot);
        light.set_color(color);
        light.set_intensity(intensity);
        light.set_cone_angles(inner, outer);
        light
    }

    #[inline]
    #[must_use]
    pub fn light_type(&self) -> LightType {
        self.light_type
    }

    #[inline]
    #[must_use]
    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.changes.changed();
    }

    #[inline]
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Clamped to [`MIN_LIGHT_INTENSITY`].
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity.max(MIN_LIGHT_INTENSITY);
        self.changes.changed();
    }

    #[inline]
    #[must_use]
    pub fn falloff_radius(&self) -> f32 {
        self.falloff_radius
    }

    pub fn set_falloff_radius(&mut self, radius: f32) {
        self.falloff_radius = radius.max(0.0);
        self.changes.changed();
    }

    #[must_use]
    pub fn cone_angles(&self) -> (f32, f32) {
        (self.inner_cone_angle, self.outer_cone_angle)
    }

    /// Angles in radians. The inner angle is clamped to the outer one.
    pub fn set_cone_angles(&mut self, inner: f32, outer: f32) {
        let outer = outer.max(0.0);
        self.outer_cone_angle = outer;
        self.inner_cone_angle = inner.clamp(0.0, outer);
        self.changes.changed();
    }

    #[inline]
    #[must_use]
    pub fn is_shadow_caster(&self) -> bool {
        self.cast_shadows
    }

    pub fn set_shadow_caster(&mut self, cast: bool) {
        self.cast_shadows = cast;
        self.changes.changed();
    }

    #[inline]
    #[must_use]
    pub fn local_position(&self) -> Vec3 {
        self.position
    }

    pub fn set_local_position(&mut self, position: Vec3) {
        self.position = position;
        self.changes.changed();
    }

    #[inline]
    #[must_use]
    pub fn local_direction(&self) -> Vec3 {
        self.direction
    }

    pub fn set_local_direction(&mut self, direction: Vec3) {
        self.direction = direction.normalize_or(Vec3::NEG_Z);
        self.changes.changed();
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.changes.version()
    }

    /// Native description of this light placed by `world`.
    #[must_use]
    pub fn descriptor(&self, world: &Mat4) -> LightDescriptor {
        LightDescriptor {
            light_type: self.light_type,
            color: self.color,
            intensity: self.intensity,
            falloff_radius: self.falloff_radius,
            inner_cone_angle: self.inner_cone_angle,
            outer_cone_angle: self.outer_cone_angle,
            cast_shadows: self.cast_shadows,
            position: world.transform_point3(self.position),
            direction: world.transform_vector3(self.direction).normalize_or(Vec3::NEG_Z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_clamp_and_bump_version() {
        let mut light = Light::new(LightType::Spot);
        let v0 = light.version();
        light.set_intensity(-3.0);
        assert_eq!(light.intensity(), MIN_LIGHT_INTENSITY);
        light.set_cone_angles(1.0, 0.4);
        assert_eq!(light.cone_angles(), (0.4, 0.4));
        assert!(light.version() > v0);
    }

    #[test]
    fn descriptor_is_in_world_space() {
        let mut light = Light::point(Vec3::ONE, 100.0, 5.0);
        light.set_local_position(Vec3::Y);
        let world = Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(light.descriptor(&world).position, Vec3::new(2.0, 1.0, 0.0));
    }
}
