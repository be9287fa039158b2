use crate::foundation::error::{SceneError, SceneResult};

pub use kurbo::{Affine, BezPath, Circle, Point, Rect, RoundedRect, Vec2};

/// Canvas pixel dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> SceneResult<Self> {
        if width == 0 || height == 0 {
            return Err(SceneError::validation("canvas width/height must be > 0"));
        }
        Ok(Self { width, height })
    }
}

/// The closed set of supported output formats.
///
/// Canvas pixel dimensions are always derived from one of these labels; no
/// other size is a valid input to the scene builder or the rasterizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AspectRatio {
    /// `1:1`, 1080x1080.
    #[serde(rename = "1:1")]
    Square,
    /// `9:16`, 1080x1920.
    #[serde(rename = "9:16")]
    Portrait,
    /// `16:9`, 1920x1080.
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    /// Strict label parse. Returns `None` for anything outside the enum.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "1:1" => Some(Self::Square),
            "9:16" => Some(Self::Portrait),
            "16:9" => Some(Self::Landscape),
            _ => None,
        }
    }

    /// Lenient label lookup: unknown labels fall back to `1:1`.
    ///
    /// Callers should not rely on this fallback and should validate with
    /// [`AspectRatio::parse`] upstream.
    pub fn from_label(label: &str) -> Self {
        Self::parse(label).unwrap_or(Self::Square)
    }

    /// Pixel dimensions for this label.
    pub fn dimensions(self) -> CanvasSize {
        match self {
            Self::Square => CanvasSize {
                width: 1080,
                height: 1080,
            },
            Self::Portrait => CanvasSize {
                width: 1080,
                height: 1920,
            },
            Self::Landscape => CanvasSize {
                width: 1920,
                height: 1080,
            },
        }
    }

    /// The wire label for this ratio.
    pub fn label(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "9:16",
            Self::Landscape => "16:9",
        }
    }
}

/// A rendered frame: row-major RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Whether `data` carries premultiplied alpha.
    pub premultiplied: bool,
}

/// Multiply color channels by alpha in place (straight -> premultiplied).
pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Divide color channels by alpha in place (premultiplied -> straight).
pub fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = (((px[0] as u16) * 255 + a / 2) / a).min(255) as u8;
        px[1] = (((px[1] as u16) * 255 + a / 2) / a).min(255) as u8;
        px[2] = (((px[2] as u16) * 255 + a / 2) / a).min(255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_dimension_table() {
        assert_eq!(
            AspectRatio::Square.dimensions(),
            CanvasSize {
                width: 1080,
                height: 1080
            }
        );
        assert_eq!(
            AspectRatio::Portrait.dimensions(),
            CanvasSize {
                width: 1080,
                height: 1920
            }
        );
        assert_eq!(
            AspectRatio::Landscape.dimensions(),
            CanvasSize {
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn unknown_label_falls_back_to_square() {
        assert_eq!(AspectRatio::parse("4:5"), None);
        assert_eq!(AspectRatio::from_label("4:5"), AspectRatio::Square);
    }

    #[test]
    fn label_roundtrips_through_serde() {
        let json = serde_json::to_string(&AspectRatio::Portrait).unwrap();
        assert_eq!(json, "\"9:16\"");
        let back: AspectRatio = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AspectRatio::Portrait);
    }

    #[test]
    fn premultiply_then_unpremultiply_is_close() {
        let mut px = [200u8, 100, 40, 128];
        premultiply_rgba8_in_place(&mut px);
        unpremultiply_rgba8_in_place(&mut px);
        assert!((px[0] as i32 - 200).abs() <= 2);
        assert!((px[1] as i32 - 100).abs() <= 2);
        assert!((px[2] as i32 - 40).abs() <= 2);
        assert_eq!(px[3], 128);
    }
}
