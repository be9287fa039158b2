use std::sync::Arc;

use anyhow::Context;

use crate::foundation::error::SceneResult;

/// Decoded raster image in premultiplied RGBA8 form.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl PreparedImage {
    /// Copy out straight-alpha RGBA8 bytes (for resizing/export paths that
    /// expect unpremultiplied pixels).
    pub fn to_straight_rgba8(&self) -> Vec<u8> {
        let mut out = self.rgba8_premul.as_slice().to_vec();
        crate::foundation::core::unpremultiply_rgba8_in_place(&mut out);
        out
    }
}

/// Decode encoded image bytes and convert to premultiplied RGBA8.
pub fn decode_image(bytes: &[u8]) -> SceneResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    crate::foundation::core::premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}
