//! Asset Reader Tests
//!
//! Tests for:
//! - MemoryAssetReader lookups
//! - FileAssetReader: relative paths, file:// URLs, missing files
//! - Reads dispatched through the context's loader runtime
//! - A bundle loaded from disk end to end

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Vec3, Vec4};

use sceneweave::assets::loaders::bundle::{BundleMaterial, BundleSubmesh, BundleWriter, ParameterInit};
use sceneweave::assets::{AssetReader, FileAssetReader, MemoryAssetReader};
use sceneweave::backend::VertexAttributes;
use sceneweave::backend::headless::HeadlessEngine;
use sceneweave::resources::{IndexData, MeshData};
use sceneweave::{EngineContext, EngineSettings, Error, Renderable};

/// Fresh scratch directory under the system temp dir.
fn scratch_dir(name: &str) -> anyhow::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("sceneweave-{}-{name}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn file_context(root: &Path) -> anyhow::Result<EngineContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    let reader = Arc::new(FileAssetReader::new(root));
    Ok(EngineContext::with_reader(HeadlessEngine::new(), EngineSettings::default(), reader)?)
}

// ============================================================================
// MemoryAssetReader
// ============================================================================

#[test]
fn memory_reader_returns_inserted_bytes() -> anyhow::Result<()> {
    let reader = MemoryAssetReader::new();
    reader.insert("a.bin", vec![1u8, 2, 3]);
    assert!(reader.contains("a.bin"));

    let bytes = pollster::block_on(reader.read_bytes("a.bin"))?;
    assert_eq!(bytes, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn memory_reader_reports_missing_entry_as_io() {
    let reader = MemoryAssetReader::new();
    let err = pollster::block_on(reader.read_bytes("nope.bin")).unwrap_err();
    assert!(matches!(err, Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound));
}

// ============================================================================
// FileAssetReader
// ============================================================================

#[test]
fn file_reader_resolves_against_root() -> anyhow::Result<()> {
    let dir = scratch_dir("relative")?;
    std::fs::create_dir_all(dir.join("models"))?;
    std::fs::write(dir.join("models/a.bin"), b"hello")?;

    let ctx = file_context(&dir)?;
    let bytes = pollster::block_on(ctx.read_bytes("models/a.bin"))?;
    assert_eq!(bytes, b"hello");
    Ok(())
}

#[test]
fn file_reader_accepts_file_urls() -> anyhow::Result<()> {
    let dir = scratch_dir("url")?;
    let path = dir.join("b.bin");
    std::fs::write(&path, b"url")?;

    let ctx = file_context(&dir)?;
    let url = url::Url::from_file_path(&path).map_err(|()| anyhow::anyhow!("not absolute"))?;
    let bytes = pollster::block_on(ctx.read_bytes(url.as_str()))?;
    assert_eq!(bytes, b"url");
    Ok(())
}

#[test]
fn file_reader_root_may_be_a_file() -> anyhow::Result<()> {
    let dir = scratch_dir("file-root")?;
    std::fs::write(dir.join("scene.gltf"), b"{}")?;
    std::fs::write(dir.join("scene.bin"), b"buffer")?;

    let reader = FileAssetReader::new(dir.join("scene.gltf"));
    assert_eq!(reader.root_path(), dir.as_path());
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> anyhow::Result<()> {
    let dir = scratch_dir("missing")?;
    let ctx = file_context(&dir)?;
    let result = pollster::block_on(ctx.read_bytes("not-there.bin"));
    assert!(matches!(result, Err(Error::Io(_))));
    Ok(())
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn bundle_loads_from_disk() -> anyhow::Result<()> {
    let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let mesh = MeshData {
        attributes: VertexAttributes::POSITION,
        vertex_count: 3,
        vertices: bytemuck::cast_slice(&positions).to_vec(),
        indices: IndexData::for_vertex_count(vec![0, 1, 2], 3),
        submeshes: vec![0..3],
    };
    let bytes = BundleWriter::new()
        .model(1.0, Vec3::ZERO, &mesh)
        .submeshes(&[BundleSubmesh {
            range: 0..3,
            material_index: 0,
            name: None,
        }])
        .materials(&[BundleMaterial {
            name: "m".into(),
            program: Arc::from(&b"color"[..]),
            parameters: vec![("color".into(), ParameterInit::Float4(Vec4::ONE))],
        }])
        .finish();

    let dir = scratch_dir("bundle")?;
    std::fs::write(dir.join("tri.swb"), bytes)?;

    let ctx = file_context(&dir)?;
    let model = ctx.block_on(Renderable::builder().bundle("tri.swb").build(&ctx))?;
    assert_eq!(model.submesh_count(), 1);
    assert_eq!(model.material(0).parameters().get_float4("color"), Some(Vec4::ONE));
    Ok(())
}
