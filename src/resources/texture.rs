//! Textures
//!
//! A [`Texture`] is a cheap handle over shared native texture data plus the
//! sampler state used when it is bound to a material. Clones share the native
//! texture; it is destroyed by the cleanup registry once the last clone (and
//! every material parameter holding one) is gone.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use image::GenericImageView;

use crate::assets::cleanup::CleanupToken;
use crate::backend::{FilterMode, Sampler, TextureDescriptor, TextureFormat, TextureHandle};
use crate::engine::EngineContext;
use crate::errors::{Error, Result};

/// What a texture's texels mean, which decides its GPU storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureUsage {
    /// sRGB-encoded color.
    #[default]
    Color,
    /// Tangent-space normals, stored linear.
    Normal,
    /// Arbitrary linear data (roughness, occlusion, masks).
    Data,
}

impl TextureUsage {
    #[must_use]
    pub fn format(self) -> TextureFormat {
        match self {
            Self::Color => TextureFormat::Srgb8A8,
            Self::Normal | Self::Data => TextureFormat::Rgba8,
        }
    }

    /// Decodes the bundle's usage byte.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Color),
            1 => Some(Self::Normal),
            2 => Some(Self::Data),
            _ => None,
        }
    }
}

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Decodes an encoded image (PNG or JPEG) into RGBA8.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    let rgba = img.into_rgba8().into_raw();
    Ok(DecodedImage {
        width,
        height,
        rgba,
    })
}

fn mip_levels(width: u32, height: u32, sampler: &Sampler) -> u32 {
    let mipmapped = !matches!(sampler.min_filter, FilterMode::Nearest | FilterMode::Linear);
    if mipmapped {
        32 - width.max(height).max(1).leading_zeros()
    } else {
        1
    }
}

/// Native texture shared by every [`Texture`] with the same pixels.
pub struct TextureInternalData {
    handle: TextureHandle,
    width: u32,
    height: u32,
    usage: TextureUsage,
    _cleanup: CleanupToken,
}

#[derive(Clone)]
pub struct Texture {
    data: Rc<TextureInternalData>,
    sampler: Sampler,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.data.handle)
            .field("size", &(self.data.width, self.data.height))
            .field("usage", &self.data.usage)
            .field("sampler", &self.sampler)
            .finish()
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data) && self.sampler == other.sampler
    }
}

impl Texture {
    #[must_use]
    pub fn builder() -> TextureBuilder {
        TextureBuilder::default()
    }

    /// Uploads decoded pixels. Must run on the render thread.
    pub fn from_image(
        ctx: &EngineContext,
        image: &DecodedImage,
        usage: TextureUsage,
        sampler: Sampler,
    ) -> Result<Self> {
        let desc = TextureDescriptor {
            width: image.width,
            height: image.height,
            format: usage.format(),
            mip_levels: mip_levels(image.width, image.height, &sampler),
        };
        let handle = ctx.with_engine(|e| e.create_texture(&desc, &image.rgba))?;
        let cleanup = ctx.cleanup().register(move |e| e.destroy_texture(handle));
        Ok(Self {
            data: Rc::new(TextureInternalData {
                handle,
                width: image.width,
                height: image.height,
                usage,
                _cleanup: cleanup,
            }),
            sampler,
        })
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> TextureHandle {
        self.data.handle
    }

    #[inline]
    #[must_use]
    pub fn sampler(&self) -> Sampler {
        self.sampler
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> TextureUsage {
        self.data.usage
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.data.width, self.data.height)
    }

    /// Same native texture, different sampler.
    #[must_use]
    pub fn with_sampler(&self, sampler: Sampler) -> Self {
        Self {
            data: Rc::clone(&self.data),
            sampler,
        }
    }

    /// Whether both handles share one native texture.
    #[must_use]
    pub fn shares_data_with(&self, other: &Texture) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

enum TextureSource {
    Uri(String),
    Encoded(Arc<[u8]>),
    Pixels(DecodedImage),
}

/// Fluent description of a texture load.
#[derive(Default)]
pub struct TextureBuilder {
    source: Option<TextureSource>,
    usage: TextureUsage,
    sampler: Sampler,
    registry_id: Option<String>,
}

impl TextureBuilder {
    /// Loads from `uri`; the URI doubles as registry id unless one is set.
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.source = Some(TextureSource::Uri(uri.into()));
        self
    }

    #[must_use]
    pub fn encoded(mut self, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.source = Some(TextureSource::Encoded(bytes.into()));
        self
    }

    #[must_use]
    pub fn pixels(mut self, image: DecodedImage) -> Self {
        self.source = Some(TextureSource::Pixels(image));
        self
    }

    #[must_use]
    pub fn usage(mut self, usage: TextureUsage) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    #[must_use]
    pub fn registry_id(mut self, id: impl Into<String>) -> Self {
        self.registry_id = Some(id.into());
        self
    }

    pub fn build(self, ctx: &EngineContext) -> LocalBoxFuture<'static, Result<Texture>> {
        let Some(source) = self.source else {
            return futures::future::ready(Err(Error::MissingSource(
                "texture has no uri, bytes or pixels".into(),
            )))
            .boxed_local();
        };

        let registry_id = self.registry_id.or_else(|| match &source {
            TextureSource::Uri(uri) => Some(uri.clone()),
            _ => None,
        });
        let sampler = self.sampler;
        let registry = Rc::clone(ctx.texture_registry());

        if let Some(id) = &registry_id
            && let Some(existing) = registry.get(id)
        {
            return async move { Ok(Texture { data: existing.await?, sampler }) }.boxed_local();
        }

        let load = load_texture(ctx.clone(), source, self.usage, sampler);
        match registry_id {
            Some(id) => {
                let shared = registry.register(id, load.map(|r| r.map(|t| t.data)).boxed_local());
                async move { Ok(Texture { data: shared.await?, sampler }) }.boxed_local()
            }
            None => load,
        }
    }
}

fn load_texture(
    ctx: EngineContext,
    source: TextureSource,
    usage: TextureUsage,
    sampler: Sampler,
) -> LocalBoxFuture<'static, Result<Texture>> {
    async move {
        let image = match source {
            TextureSource::Pixels(image) => image,
            TextureSource::Encoded(bytes) => {
                ctx.spawn_blocking(move || decode_image(&bytes)).await??
            }
            TextureSource::Uri(uri) => {
                let bytes = ctx.read_bytes(&uri).await?;
                ctx.spawn_blocking(move || decode_image(&bytes)).await??
            }
        };
        Texture::from_image(&ctx, &image, usage, sampler)
    }
    .boxed_local()
}
