//! Material Parameters
//!
//! A [`MaterialParameters`] bag maps parameter names to typed values. It is
//! independent of any compiled program: [`MaterialParameters::apply_to`]
//! pushes only the names the target program declares, so one bag can be
//! shared between materials with different shaders.

use glam::{Vec2, Vec3, Vec4};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::backend::{Engine, ExternalTextureHandle, MaterialInstanceHandle, ParameterValue};
use crate::resources::texture::Texture;

/// A typed parameter value.
///
/// Texture parameters hold the [`Texture`] itself, keeping its native object
/// alive for as long as it is bound.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialParameter {
    Bool(bool),
    Bool2([bool; 2]),
    Bool3([bool; 3]),
    Bool4([bool; 4]),
    Int(i32),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
    Float(f32),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Texture(Texture),
    ExternalTexture(ExternalTextureHandle),
}

impl MaterialParameter {
    /// Converts to the value pushed into a native material instance.
    #[must_use]
    pub fn to_native(&self) -> ParameterValue {
        match self {
            Self::Bool(v) => ParameterValue::Bool(*v),
            Self::Bool2(v) => ParameterValue::Bool2(*v),
            Self::Bool3(v) => ParameterValue::Bool3(*v),
            Self::Bool4(v) => ParameterValue::Bool4(*v),
            Self::Int(v) => ParameterValue::Int(*v),
            Self::Int2(v) => ParameterValue::Int2(*v),
            Self::Int3(v) => ParameterValue::Int3(*v),
            Self::Int4(v) => ParameterValue::Int4(*v),
            Self::Float(v) => ParameterValue::Float(*v),
            Self::Float2(v) => ParameterValue::Float2(v.to_array()),
            Self::Float3(v) => ParameterValue::Float3(v.to_array()),
            Self::Float4(v) => ParameterValue::Float4(v.to_array()),
            Self::Texture(texture) => ParameterValue::Texture {
                texture: texture.handle(),
                sampler: texture.sampler(),
            },
            Self::ExternalTexture(handle) => ParameterValue::ExternalTexture(*handle),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialParameters {
    named: FxHashMap<String, MaterialParameter>,
}

impl MaterialParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: MaterialParameter) {
        self.named.insert(name.into(), value);
    }

    pub fn set_bool(&mut self, name: &str, x: bool) {
        self.set(name, MaterialParameter::Bool(x));
    }

    pub fn set_bool2(&mut self, name: &str, x: bool, y: bool) {
        self.set(name, MaterialParameter::Bool2([x, y]));
    }

    pub fn set_bool3(&mut self, name: &str, x: bool, y: bool, z: bool) {
        self.set(name, MaterialParameter::Bool3([x, y, z]));
    }

    pub fn set_bool4(&mut self, name: &str, x: bool, y: bool, z: bool, w: bool) {
        self.set(name, MaterialParameter::Bool4([x, y, z, w]));
    }

    pub fn set_int(&mut self, name: &str, x: i32) {
        self.set(name, MaterialParameter::Int(x));
    }

    pub fn set_int2(&mut self, name: &str, x: i32, y: i32) {
        self.set(name, MaterialParameter::Int2([x, y]));
    }

    pub fn set_int3(&mut self, name: &str, x: i32, y: i32, z: i32) {
        self.set(name, MaterialParameter::Int3([x, y, z]));
    }

    pub fn set_int4(&mut self, name: &str, x: i32, y: i32, z: i32, w: i32) {
        self.set(name, MaterialParameter::Int4([x, y, z, w]));
    }

    pub fn set_float(&mut self, name: &str, x: f32) {
        self.set(name, MaterialParameter::Float(x));
    }

    pub fn set_float2(&mut self, name: &str, x: f32, y: f32) {
        self.set(name, MaterialParameter::Float2(Vec2::new(x, y)));
    }

    pub fn set_float3(&mut self, name: &str, x: f32, y: f32, z: f32) {
        self.set(name, MaterialParameter::Float3(Vec3::new(x, y, z)));
    }

    pub fn set_float4(&mut self, name: &str, x: f32, y: f32, z: f32, w: f32) {
        self.set(name, MaterialParameter::Float4(Vec4::new(x, y, z, w)));
    }

    pub fn set_texture(&mut self, name: &str, texture: &Texture) {
        self.set(name, MaterialParameter::Texture(texture.clone()));
    }

    pub fn set_external_texture(&mut self, name: &str, texture: ExternalTextureHandle) {
        self.set(name, MaterialParameter::ExternalTexture(texture));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MaterialParameter> {
        self.named.get(name)
    }

    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f32> {
        match self.named.get(name)? {
            MaterialParameter::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_float4(&self, name: &str) -> Option<Vec4> {
        match self.named.get(name)? {
            MaterialParameter::Float4(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_texture(&self, name: &str) -> Option<&Texture> {
        match self.named.get(name)? {
            MaterialParameter::Texture(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.named.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MaterialParameter)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Pushes every parameter whose name is in `declared` into `instance`.
    ///
    /// Names the program does not declare are skipped. Returns the number of
    /// parameters applied.
    pub fn apply_to(
        &self,
        engine: &mut dyn Engine,
        instance: MaterialInstanceHandle,
        declared: &FxHashSet<String>,
    ) -> usize {
        let mut applied = 0;
        for (name, value) in &self.named {
            if !declared.contains(name) {
                log::trace!("skipping parameter '{name}' not declared by the material");
                continue;
            }
            engine.set_material_parameter(instance, name, &value.to_native());
            applied += 1;
        }
        applied
    }

    /// Copies every parameter of `other` into `self`, overwriting on conflict.
    pub fn merge(&mut self, other: &MaterialParameters) {
        for (name, value) in &other.named {
            self.named.insert(name.clone(), value.clone());
        }
    }

    /// Copies the parameters of `other` whose names `self` does not have yet.
    pub fn merge_if_absent(&mut self, other: &MaterialParameters) {
        for (name, value) in &other.named {
            self.named
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Replaces the whole bag with a copy of `other`.
    pub fn copy_from(&mut self, other: &MaterialParameters) {
        self.named.clone_from(&other.named);
    }
}
