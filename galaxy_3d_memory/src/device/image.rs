/// RawImage trait and image descriptor

/// Image format (power-of-two texel sizes only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ImageFormat {
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
}

impl ImageFormat {
    /// Size of one texel in bytes
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ImageFormat::R8_UNORM => 1,
            ImageFormat::R8G8_UNORM => 2,
            ImageFormat::R8G8B8A8_UNORM | ImageFormat::R8G8B8A8_SRGB => 4,
            ImageFormat::R16G16B16A16_SFLOAT => 8,
            ImageFormat::R32G32B32A32_SFLOAT => 16,
        }
    }
}

/// Descriptor for creating a 2D, single-mip sampled image
#[derive(Debug, Clone)]
pub struct ImageDesc {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageDesc {
    /// Bytes needed to fill the whole image
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Raw GPU image trait
///
/// Created with transfer-dst and sampled usage. Its contents are only
/// defined after an upload through the transfer manager.
pub trait RawImage: Send + Sync {
    /// Native handle (e.g. `vk::Image` as raw u64)
    fn native(&self) -> u64;

    /// Creation descriptor
    fn desc(&self) -> &ImageDesc;
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
