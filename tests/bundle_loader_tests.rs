//! Bundle Loader Tests
//!
//! Tests for:
//! - Loading a textured bundle end to end through the asset reader
//! - Parameter binding (bundle textures, caller-bound samplers)
//! - Version checks and unknown chunks
//! - Failures in the texture and validation stages
//! - Release of every native object once the model is dropped

use std::io::Cursor;
use std::sync::Arc;

use glam::{Vec3, Vec4};

use sceneweave::assets::MemoryAssetReader;
use sceneweave::assets::loaders::bundle::{
    BundleMaterial, BundleSubmesh, BundleTexture, BundleWriter, LATEST_MINOR, ParameterInit,
};
use sceneweave::backend::headless::{EngineJournal, HeadlessEngine};
use sceneweave::backend::{FilterMode, Sampler, VertexAttributes, WrapMode};
use sceneweave::resources::{IndexData, MeshData, TextureUsage};
use sceneweave::scene::CollisionShape;
use sceneweave::{EngineContext, EngineSettings, Error, Renderable, ResourceHolder, Result};

const URI: &str = "models/chair.swb";

fn context_with(bytes: Vec<u8>) -> (EngineContext, EngineJournal) {
    let _ = env_logger::builder().is_test(true).try_init();
    let reader = Arc::new(MemoryAssetReader::new());
    reader.insert(URI, bytes);
    let engine = HeadlessEngine::new();
    let journal = engine.journal();
    let ctx = EngineContext::with_reader(engine, EngineSettings::default(), reader).unwrap();
    (ctx, journal)
}

fn load(ctx: &EngineContext) -> Result<Renderable> {
    ctx.block_on(Renderable::builder().bundle(URI).build(ctx))
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Two triangles forming a unit quad, split into two submeshes.
fn quad_mesh() -> MeshData {
    let positions: [[f32; 3]; 4] = [
        [-0.5, 0.0, -0.5],
        [0.5, 0.0, -0.5],
        [0.5, 0.0, 0.5],
        [-0.5, 0.0, 0.5],
    ];
    MeshData {
        attributes: VertexAttributes::POSITION,
        vertex_count: 4,
        vertices: bytemuck::cast_slice(&positions).to_vec(),
        indices: IndexData::for_vertex_count(vec![0, 1, 2, 0, 2, 3], 4),
        submeshes: vec![0..3, 3..6],
    }
}

fn repeat_sampler() -> Sampler {
    Sampler {
        min_filter: FilterMode::Linear,
        mag_filter: FilterMode::Nearest,
        wrap_s: WrapMode::Repeat,
        wrap_t: WrapMode::Repeat,
        wrap_r: WrapMode::ClampToEdge,
    }
}

fn writer() -> BundleWriter {
    BundleWriter::new()
        .model(0.5, Vec3::new(0.0, 1.0, 0.0), &quad_mesh())
        .submeshes(&[
            BundleSubmesh {
                range: 0..3,
                material_index: 0,
                name: Some("seat".into()),
            },
            BundleSubmesh {
                range: 3..6,
                material_index: 1,
                name: None,
            },
        ])
        .textures(&[BundleTexture {
            name: "fabric".into(),
            usage: TextureUsage::Color,
            sampler: repeat_sampler(),
            encoded: png(4, 2),
        }])
        .materials(&[
            BundleMaterial {
                name: "fabric".into(),
                program: Arc::from(&b"albedo, tint, overlay"[..]),
                parameters: vec![
                    ("albedo".into(), ParameterInit::Sampler(0)),
                    ("tint".into(), ParameterInit::Float4(Vec4::new(1.0, 0.5, 0.5, 1.0))),
                    ("overlay".into(), ParameterInit::ExternalSampler),
                ],
            },
            BundleMaterial {
                name: "frame".into(),
                program: Arc::from(&b"roughness"[..]),
                parameters: vec![("roughness".into(), ParameterInit::Float(0.7))],
            },
        ])
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn loads_textured_model() {
    let (ctx, journal) = context_with(writer().finish());
    let model = load(&ctx).unwrap();

    assert_eq!(model.submesh_count(), 2);
    assert_eq!(model.material_name(0), Some("seat"));
    assert!(!model.material(0).shares_program_with(model.material(1)));

    let live = journal.live();
    assert_eq!(live.vertex_buffers, 1);
    assert_eq!(live.index_buffers, 1);
    assert_eq!(live.textures, 1);
    assert_eq!(live.materials, 2);

    let data = model.internal_data();
    assert_eq!(data.transform_scale(), 0.5);
    assert_eq!(data.transform_offset(), Vec3::Y);
    assert_eq!(model.bounding_box().min(), Vec3::new(-0.5, 0.0, -0.5));
    assert_eq!(model.bounding_box().max(), Vec3::new(0.5, 0.0, 0.5));
}

#[test]
fn bundle_textures_are_bound_with_their_sampler() {
    let (ctx, _) = context_with(writer().finish());
    let model = load(&ctx).unwrap();

    let params = model.material(0).parameters();
    let albedo = params.get_texture("albedo").expect("albedo bound");
    assert_eq!(albedo.size(), (4, 2));
    assert_eq!(albedo.sampler(), repeat_sampler());
    assert_eq!(albedo.usage(), TextureUsage::Color);
    assert_eq!(params.get_float4("tint"), Some(Vec4::new(1.0, 0.5, 0.5, 1.0)));
    assert!(!params.contains("overlay"), "external samplers are left to the caller");

    let frame = model.material(1).parameters();
    assert_eq!(frame.get_float("roughness"), Some(0.7));
}

#[test]
fn collision_and_animation_chunks_are_applied() {
    let shape = CollisionShape::Sphere {
        center: Vec3::ZERO,
        radius: 0.75,
    };
    let bytes = writer()
        .collision(&shape)
        .animations(&["idle", "wave"], 12)
        .finish();
    let (ctx, _) = context_with(bytes);
    let model = load(&ctx).unwrap();

    assert_eq!(model.collision_shape(), Some(&shape));
    assert_eq!(model.animation_names(), vec!["idle".to_string(), "wave".to_string()]);
    assert_eq!(model.internal_data().bone_count(), 12);
}

#[test]
fn unknown_chunks_are_skipped() {
    let bytes = writer().chunk(*b"XTRA", vec![1, 2, 3, 4, 5]).finish();
    let (ctx, _) = context_with(bytes);
    assert_eq!(load(&ctx).unwrap().submesh_count(), 2);
}

#[test]
fn dropped_model_releases_native_objects() {
    let (ctx, journal) = context_with(writer().finish());
    let model = load(&ctx).unwrap();
    ctx.pump();

    drop(model);
    ctx.resources().reclaim_released_resources();

    let live = journal.live();
    assert_eq!(live.vertex_buffers, 0);
    assert_eq!(live.index_buffers, 0);
    assert_eq!(live.textures, 0);
    assert_eq!(live.material_instances, 0);
}

// ============================================================================
// Versions
// ============================================================================

#[test]
fn newer_major_version_is_rejected() {
    let (ctx, _) = context_with(writer().version(2, 0).finish());
    assert!(matches!(
        load(&ctx),
        Err(Error::UnsupportedVersion {
            found_major: 2,
            supported_major: 1,
            ..
        })
    ));
}

#[test]
fn newer_minor_version_is_rejected() {
    let (ctx, _) = context_with(writer().version(1, LATEST_MINOR + 1).finish());
    assert!(matches!(load(&ctx), Err(Error::UnsupportedVersion { .. })));
}

#[test]
fn older_minor_version_loads() {
    let (ctx, _) = context_with(writer().version(1, 0).finish());
    assert!(load(&ctx).is_ok());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn undecodable_texture_fails() {
    let bytes = BundleWriter::new()
        .model(1.0, Vec3::ZERO, &quad_mesh())
        .submeshes(&[BundleSubmesh {
            range: 0..6,
            material_index: 0,
            name: None,
        }])
        .textures(&[BundleTexture {
            name: "broken".into(),
            usage: TextureUsage::Color,
            sampler: Sampler::default(),
            encoded: b"definitely not a png".to_vec(),
        }])
        .materials(&[BundleMaterial {
            name: "m".into(),
            program: Arc::from(&b"albedo"[..]),
            parameters: vec![("albedo".into(), ParameterInit::Sampler(0))],
        }])
        .finish();
    let (ctx, journal) = context_with(bytes);

    assert!(matches!(load(&ctx), Err(Error::ImageDecode(_))));
    assert_eq!(journal.live().vertex_buffers, 0, "nothing uploaded after a failed stage");
}

#[test]
fn submesh_with_missing_material_is_invalid() {
    let bytes = BundleWriter::new()
        .model(1.0, Vec3::ZERO, &quad_mesh())
        .submeshes(&[BundleSubmesh {
            range: 0..6,
            material_index: 3,
            name: None,
        }])
        .materials(&[])
        .finish();
    let (ctx, _) = context_with(bytes);
    assert!(matches!(load(&ctx), Err(Error::InvalidBundle(_))));
}

#[test]
fn sampler_pointing_past_texture_table_is_invalid() {
    let bytes = BundleWriter::new()
        .model(1.0, Vec3::ZERO, &quad_mesh())
        .submeshes(&[BundleSubmesh {
            range: 0..6,
            material_index: 0,
            name: None,
        }])
        .materials(&[BundleMaterial {
            name: "m".into(),
            program: Arc::from(&b"albedo"[..]),
            parameters: vec![("albedo".into(), ParameterInit::Sampler(1))],
        }])
        .finish();
    let (ctx, _) = context_with(bytes);
    assert!(matches!(load(&ctx), Err(Error::InvalidBundle(_))));
}

#[test]
fn missing_model_chunk_is_invalid() {
    let (ctx, _) = context_with(BundleWriter::new().finish());
    assert!(matches!(load(&ctx), Err(Error::InvalidBundle(_))));
}
