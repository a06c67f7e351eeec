//! glTF loader
//!
//! The engine's own asset loader owns glTF decoding and instancing. This side
//! reads the container, fetches every external buffer and image it
//! references relative to the container's location, and hands all bytes to
//! [`Engine::create_gltf_asset`](crate::backend::Engine::create_gltf_asset).
//!
//! Data URIs and GLB-embedded chunks are left to the engine.

use futures::future::{FutureExt, LocalBoxFuture, try_join_all};
use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::assets::loaders::{LoadRequest, fetch};
use crate::assets::uri;
use crate::backend::Aabb;
use crate::engine::EngineContext;
use crate::errors::{Error, LoadStage, Result};
use crate::resources::internal_data::RenderableInternalData;
use crate::resources::renderable::{AssetLocation, Renderable, RenderableKind};

/// What the loader needs from a container before the engine sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GltfSummary {
    /// External references exactly as written in the container.
    pub external_uris: Vec<String>,
    /// Union of the primitives' position accessor bounds, in mesh space.
    pub accessor_bounds: Option<Aabb>,
    pub animation_names: Vec<String>,
}

/// Parses the container JSON (or GLB) and collects its external references.
pub fn summarize(container: &[u8]) -> Result<GltfSummary> {
    let document = gltf::Gltf::from_slice(container)?;
    let buffer_uris = document.buffers().filter_map(|buffer| match buffer.source() {
        gltf::buffer::Source::Uri(reference) => Some(reference),
        gltf::buffer::Source::Bin => None,
    });
    let image_uris = document.images().filter_map(|image| match image.source() {
        gltf::image::Source::Uri { uri: reference, .. } => Some(reference),
        gltf::image::Source::View { .. } => None,
    });

    // First occurrence order; each reference is fetched once.
    let mut seen = FxHashSet::default();
    let external_uris: Vec<String> = buffer_uris
        .chain(image_uris)
        .filter(|reference| !uri::is_data_uri(reference) && seen.insert(*reference))
        .map(str::to_owned)
        .collect();

    let mut bounds: Option<(Vec3, Vec3)> = None;
    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let bbox = primitive.bounding_box();
            let (min, max) = (Vec3::from(bbox.min), Vec3::from(bbox.max));
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(min), hi.max(max)),
                None => (min, max),
            });
        }
    }

    let animation_names = document
        .animations()
        .enumerate()
        .map(|(i, a)| a.name().map_or_else(|| format!("animation_{i}"), str::to_owned))
        .collect();

    Ok(GltfSummary {
        external_uris,
        accessor_bounds: bounds.map(|(min, max)| Aabb::from_min_max(min, max)),
        animation_names,
    })
}

/// Loads a glTF or GLB container into a model renderable.
///
/// The renderable has no submeshes of its own; the engine's instance owns
/// the glTF materials.
pub fn load(ctx: EngineContext, location: AssetLocation) -> LocalBoxFuture<'static, Result<Renderable>> {
    async move {
        let request = LoadRequest::new(location.name());

        request.enter(LoadStage::Downloading);
        let container = fetch(&ctx, &location).await.map_err(|e| request.fail(e))?;

        request.enter(LoadStage::Parsing);
        let parse_input = std::sync::Arc::clone(&container);
        let summary = ctx
            .spawn_blocking(move || summarize(&parse_input))
            .await
            .and_then(|parsed| parsed)
            .map_err(|e| request.fail(e))?;

        // Companion buffers and images.
        request.enter(LoadStage::TextureLoading);
        let resources = fetch_companions(&ctx, location.name(), &summary.external_uris)
            .await
            .map_err(|e| request.fail(e))?;

        request.enter(LoadStage::GpuUpload);
        let info = ctx
            .with_engine(|e| e.create_gltf_asset(&container, &resources))
            .map_err(|e| request.fail(e))?;
        let bounding_box = info
            .bounding_box
            .or(summary.accessor_bounds)
            .unwrap_or_default();
        let data = RenderableInternalData::from_gltf(&ctx, &info, bounding_box);
        if info.animation_names.is_empty() && !summary.animation_names.is_empty() {
            data.set_animation_names(summary.animation_names);
        }
        let renderable = Renderable::from_parts(&ctx, RenderableKind::Model, data, Vec::new(), Vec::new());

        request.enter(LoadStage::Ready);
        Ok(renderable)
    }
    .boxed_local()
}

async fn fetch_companions(
    ctx: &EngineContext,
    parent: &str,
    references: &[String],
) -> Result<FxHashMap<String, Vec<u8>>> {
    let reads = references.iter().map(|reference| {
        let resolved = uri::resolve_relative(parent, reference);
        let reference = reference.clone();
        let ctx = ctx.clone();
        async move {
            let resolved = resolved?;
            log::trace!("glTF companion '{reference}' -> '{resolved}'");
            let bytes = ctx.read_bytes(&resolved).await.map_err(|e| Error::UnresolvedResource {
                uri: reference.clone(),
                reason: e.to_string(),
            })?;
            Ok::<_, Error>((reference, bytes))
        }
    });
    Ok(try_join_all(reads).await?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = r#"{
        "asset": { "version": "2.0" },
        "buffers": [
            { "uri": "mesh.bin", "byteLength": 36 },
            { "uri": "data:application/octet-stream;base64,AAAA", "byteLength": 3 }
        ],
        "images": [ { "uri": "textures/albedo%20map.png" } ],
        "bufferViews": [ { "buffer": 0, "byteLength": 36 } ],
        "accessors": [ {
            "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
            "min": [-1.0, 0.0, -2.0], "max": [1.0, 3.0, 0.0]
        } ],
        "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 } } ] } ]
    }"#;

    #[test]
    fn summary_lists_external_references_only() {
        let summary = summarize(CONTAINER.as_bytes()).unwrap();
        assert_eq!(summary.external_uris, vec!["mesh.bin", "textures/albedo%20map.png"]);
        let bounds = summary.accessor_bounds.unwrap();
        assert_eq!(bounds.min(), Vec3::new(-1.0, 0.0, -2.0));
        assert_eq!(bounds.max(), Vec3::new(1.0, 3.0, 0.0));
    }

    #[test]
    fn repeated_references_are_listed_once() {
        let container = r#"{
            "asset": { "version": "2.0" },
            "buffers": [
                { "uri": "shared.bin", "byteLength": 4 },
                { "uri": "other.bin", "byteLength": 4 },
                { "uri": "shared.bin", "byteLength": 4 }
            ],
            "images": [ { "uri": "a.png" }, { "uri": "b.png" }, { "uri": "a.png" } ]
        }"#;
        let summary = summarize(container.as_bytes()).unwrap();
        assert_eq!(summary.external_uris, vec!["shared.bin", "other.bin", "a.png", "b.png"]);
    }

    #[test]
    fn malformed_container_is_a_gltf_error() {
        assert!(matches!(summarize(b"not json"), Err(Error::Gltf(_))));
    }
}
