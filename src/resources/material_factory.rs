//! Ready-made materials on top of the engine's built-in programs.
//!
//! Every factory call shares one compiled program per built-in kind through
//! the material registry and returns a material with its own instance and
//! parameter bag, preset to the PBR defaults below.

use futures::future::{FutureExt, LocalBoxFuture};
use glam::Vec4;

use crate::backend::{BuiltinMaterial, ExternalTextureHandle};
use crate::engine::EngineContext;
use crate::errors::Result;
use crate::resources::material::Material;
use crate::resources::parameters::MaterialParameters;
use crate::resources::texture::Texture;

pub const MATERIAL_COLOR: &str = "color";
pub const MATERIAL_TEXTURE: &str = "texture";
pub const MATERIAL_METALLIC: &str = "metallic";
pub const MATERIAL_ROUGHNESS: &str = "roughness";
pub const MATERIAL_REFLECTANCE: &str = "reflectance";
pub const VIEW_TEXTURE: &str = "viewTexture";

const DEFAULT_METALLIC: f32 = 0.0;
const DEFAULT_ROUGHNESS: f32 = 0.4;
const DEFAULT_REFLECTANCE: f32 = 0.5;

fn registry_id(kind: BuiltinMaterial) -> &'static str {
    match kind {
        BuiltinMaterial::OpaqueColor => "sceneweave:opaque_color",
        BuiltinMaterial::OpaqueTexture => "sceneweave:opaque_texture",
        BuiltinMaterial::TransparentColor => "sceneweave:transparent_color",
        BuiltinMaterial::TransparentTexture => "sceneweave:transparent_texture",
        BuiltinMaterial::ViewSurface => "sceneweave:view_surface",
    }
}

fn builtin(ctx: &EngineContext, kind: BuiltinMaterial) -> LocalBoxFuture<'static, Result<Material>> {
    Material::builder()
        .builtin(kind)
        .registry_id(registry_id(kind))
        .build(ctx)
}

fn apply_pbr_defaults(material: &Material) {
    let mut defaults = MaterialParameters::new();
    defaults.set_float(MATERIAL_METALLIC, DEFAULT_METALLIC);
    defaults.set_float(MATERIAL_ROUGHNESS, DEFAULT_ROUGHNESS);
    defaults.set_float(MATERIAL_REFLECTANCE, DEFAULT_REFLECTANCE);
    material.merge_if_absent(&defaults);
}

fn with_color(
    ctx: &EngineContext,
    kind: BuiltinMaterial,
    color: Vec4,
) -> LocalBoxFuture<'static, Result<Material>> {
    let load = builtin(ctx, kind);
    async move {
        let material = load.await?;
        material.set_color(MATERIAL_COLOR, color);
        apply_pbr_defaults(&material);
        Ok(material)
    }
    .boxed_local()
}

fn with_texture(
    ctx: &EngineContext,
    kind: BuiltinMaterial,
    texture: Texture,
) -> LocalBoxFuture<'static, Result<Material>> {
    let load = builtin(ctx, kind);
    async move {
        let material = load.await?;
        material.set_texture(MATERIAL_TEXTURE, &texture);
        apply_pbr_defaults(&material);
        Ok(material)
    }
    .boxed_local()
}

pub fn make_opaque_with_color(ctx: &EngineContext, color: Vec4) -> LocalBoxFuture<'static, Result<Material>> {
    with_color(ctx, BuiltinMaterial::OpaqueColor, color)
}

pub fn make_transparent_with_color(
    ctx: &EngineContext,
    color: Vec4,
) -> LocalBoxFuture<'static, Result<Material>> {
    with_color(ctx, BuiltinMaterial::TransparentColor, color)
}

pub fn make_opaque_with_texture(
    ctx: &EngineContext,
    texture: Texture,
) -> LocalBoxFuture<'static, Result<Material>> {
    with_texture(ctx, BuiltinMaterial::OpaqueTexture, texture)
}

pub fn make_transparent_with_texture(
    ctx: &EngineContext,
    texture: Texture,
) -> LocalBoxFuture<'static, Result<Material>> {
    with_texture(ctx, BuiltinMaterial::TransparentTexture, texture)
}

/// Unlit material sampling the external texture a view is rasterized into.
pub fn make_view_surface(
    ctx: &EngineContext,
    texture: ExternalTextureHandle,
) -> LocalBoxFuture<'static, Result<Material>> {
    let load = builtin(ctx, BuiltinMaterial::ViewSurface);
    async move {
        let material = load.await?;
        material.set_external_texture(VIEW_TEXTURE, texture);
        Ok(material)
    }
    .boxed_local()
}
