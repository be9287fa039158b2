//! Builds the initial scene document for a generated creative: background,
//! headline, call-to-action and optional logo, positioned and colored from
//! the campaign's brand inputs.
//!
//! Building is pure and deterministic: ad copy and brand fields arrive
//! already resolved, and no I/O happens here. The only non-trivial policy is
//! the contrast clamp, which keeps brand hues while forcing text lightness
//! far enough from the underlying background band to stay legible.

use serde::{Deserialize, Serialize};

use crate::{
    assets::decode::PreparedImage,
    foundation::color::{Srgba, adjust_for_contrast, parse_css_color},
    foundation::core::AspectRatio,
    scene::model::{
        FontStyle, FontWeight, ImageLayer, Layer, LayerBase, LayerRole, OriginX, SCENE_VERSION,
        SceneDocument, TextAlign, TextLayer,
    },
};

/// Per-region booleans describing whether the background band behind a text
/// region reads as visually light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionBrightness {
    pub headline_light: bool,
    pub cta_light: bool,
}

/// Inputs to [`build_scene`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneParams {
    pub aspect_ratio: AspectRatio,
    pub background_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub headline: String,
    pub cta: String,
    /// Ordered brand colors; first is primary, second is accent.
    #[serde(default)]
    pub brand_colors: Vec<String>,
    /// Target-language tag; Japanese selects a CJK-capable family up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// When present, text/chip colors are contrast-clamped per region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<RegionBrightness>,
}

// #1a1a1a / #ffffff.
const FALLBACK_PRIMARY: Srgba = Srgba {
    r: 26.0 / 255.0,
    g: 26.0 / 255.0,
    b: 26.0 / 255.0,
    a: 1.0,
};
const FALLBACK_ACCENT: Srgba = Srgba {
    r: 1.0,
    g: 1.0,
    b: 1.0,
    a: 1.0,
};
const FALLBACK_HEADLINE: &str = "Discover More";
const FALLBACK_CTA: &str = "Shop Now";

const LOGO_MARGIN: f64 = 40.0;

/// Headline fallback chain: a short campaign message, else the product
/// name, else the campaign name, else a fixed default.
pub fn headline_text(
    product_name: Option<&str>,
    campaign_name: Option<&str>,
    message: Option<&str>,
) -> String {
    if let Some(msg) = message
        && !msg.is_empty()
        && msg.len() <= 60
    {
        return msg.to_string();
    }
    if let Some(product) = product_name
        && !product.is_empty()
    {
        return product.to_string();
    }
    if let Some(campaign) = campaign_name
        && !campaign.is_empty()
    {
        return campaign.to_string();
    }
    FALLBACK_HEADLINE.to_string()
}

/// CTA fallback: the supplied call-to-action, else a fixed default.
pub fn cta_text(cta: Option<&str>) -> String {
    match cta {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => FALLBACK_CTA.to_string(),
    }
}

fn parse_brand_color(value: Option<&String>, fallback: Srgba) -> Srgba {
    value
        .and_then(|v| parse_css_color(v).ok())
        .unwrap_or(fallback)
}

fn font_family_for_language(language: Option<&str>) -> String {
    let is_japanese = language
        .map(|l| {
            let l = l.to_lowercase();
            l == "japanese" || l == "ja"
        })
        .unwrap_or(false);
    if is_japanese {
        "Noto Sans JP, Arial, sans-serif".to_string()
    } else {
        "Arial, sans-serif".to_string()
    }
}

/// Build the initial scene document for one creative.
///
/// Emits exactly one locked full-canvas background layer, a headline layer
/// in the upper band, a CTA layer with a background chip in the lower band,
/// and, when a logo reference is supplied, a logo layer anchored to the
/// bottom-right corner.
pub fn build_scene(params: &SceneParams) -> SceneDocument {
    let size = params.aspect_ratio.dimensions();
    let (width, height) = (f64::from(size.width), f64::from(size.height));

    let primary = parse_brand_color(params.brand_colors.first(), FALLBACK_PRIMARY);
    let accent = parse_brand_color(params.brand_colors.get(1), FALLBACK_ACCENT);

    let (headline_fill, cta_fill, cta_chip) = match params.brightness {
        Some(bb) => (
            adjust_for_contrast(accent, bb.headline_light),
            adjust_for_contrast(primary, bb.cta_light),
            adjust_for_contrast(accent, !bb.cta_light),
        ),
        None => (accent, primary, accent),
    };

    let font_family = font_family_for_language(params.language.as_deref());

    let mut doc = SceneDocument {
        version: SCENE_VERSION.to_string(),
        objects: Vec::new(),
        extra: serde_json::Map::new(),
    };

    // Background: locked, unselectable, exactly canvas-sized.
    let mut background_base = LayerBase::at(0.0, 0.0);
    background_base.id = Some("background".to_string());
    background_base.name = Some("Background".to_string());
    background_base.layer_type = Some(LayerRole::Background);
    background_base.locked = true;
    background_base.selectable = false;
    background_base.evented = false;
    doc.objects.push(Layer::Image(ImageLayer {
        base: background_base,
        src: Some(params.background_url.clone()),
        width: Some(width),
        height: Some(height),
    }));

    let (headline_size, cta_size, logo_size) = match params.aspect_ratio {
        AspectRatio::Portrait => (72.0, 48.0, 120.0),
        AspectRatio::Landscape => (96.0, 56.0, 150.0),
        AspectRatio::Square => (80.0, 52.0, 140.0),
    };

    // Headline: upper band, centered, 85% of the canvas width.
    let mut headline_base = LayerBase::at(width * 0.5, height * 0.15);
    headline_base.id = Some("headline".to_string());
    headline_base.name = Some("Headline".to_string());
    headline_base.layer_type = Some(LayerRole::Text);
    headline_base.origin_x = OriginX::Center;
    doc.objects.push(Layer::Text(TextLayer {
        base: headline_base,
        text: Some(params.headline.clone()),
        width: Some(width * 0.85),
        font_size: headline_size,
        font_family: font_family.clone(),
        font_weight: FontWeight::Numeric(700),
        font_style: FontStyle::Normal,
        text_align: TextAlign::Center,
        line_height: 1.16,
        fill: Some(headline_fill.to_hex()),
        background_color: None,
        text_background_color: None,
        underline: false,
    }));

    // CTA: lower band, centered, with a background chip.
    let mut cta_base = LayerBase::at(width * 0.5, height * 0.82);
    cta_base.id = Some("cta".to_string());
    cta_base.name = Some("CTA".to_string());
    cta_base.layer_type = Some(LayerRole::Text);
    cta_base.origin_x = OriginX::Center;
    doc.objects.push(Layer::Text(TextLayer {
        base: cta_base,
        text: Some(params.cta.clone()),
        width: Some(width * 0.6),
        font_size: cta_size,
        font_family,
        font_weight: FontWeight::Numeric(700),
        font_style: FontStyle::Normal,
        text_align: TextAlign::Center,
        line_height: 1.16,
        fill: Some(cta_fill.to_hex()),
        background_color: Some(cta_chip.to_hex()),
        text_background_color: None,
        underline: false,
    }));

    // Logo: bottom-right with a fixed inset, slightly translucent.
    if let Some(logo_url) = &params.logo_url {
        let mut logo_base = LayerBase::at(
            width - logo_size - LOGO_MARGIN,
            height - logo_size - LOGO_MARGIN,
        );
        logo_base.id = Some("logo".to_string());
        logo_base.name = Some("Logo".to_string());
        logo_base.layer_type = Some(LayerRole::Logo);
        logo_base.opacity = 0.9;
        doc.objects.push(Layer::Image(ImageLayer {
            base: logo_base,
            src: Some(logo_url.clone()),
            width: Some(logo_size),
            height: Some(logo_size),
        }));
    }

    doc
}

// Horizontal bands sampled when deriving brightness hints from the
// background image: (top fraction, height fraction) of the canvas.
const HEADLINE_BAND: (f64, f64) = (0.10, 0.25);
const CTA_BAND: (f64, f64) = (0.75, 0.20);
const LIGHT_THRESHOLD: f64 = 128.0;

/// Derive per-region brightness hints from a decoded background image.
///
/// Averages the R/G/B channel means over a fixed horizontal band per region
/// and compares against a mid-gray threshold. The bands are deliberately
/// coarse; they describe the region, not the pixels behind individual
/// glyphs.
pub fn analyze_background_brightness(image: &PreparedImage) -> RegionBrightness {
    RegionBrightness {
        headline_light: region_is_light(image, HEADLINE_BAND.0, HEADLINE_BAND.1),
        cta_light: region_is_light(image, CTA_BAND.0, CTA_BAND.1),
    }
}

fn region_is_light(image: &PreparedImage, top_frac: f64, height_frac: f64) -> bool {
    let height = image.height as usize;
    let width = image.width as usize;
    if width == 0 || height == 0 {
        return false;
    }

    let top = ((height as f64 * top_frac).round() as usize).min(height - 1);
    let rows = ((height as f64 * height_frac).round() as usize)
        .max(1)
        .min(height - top);

    let data = image.rgba8_premul.as_slice();
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in top..top + rows {
        let row = &data[y * width * 4..(y + 1) * width * 4];
        for px in row.chunks_exact(4) {
            sum += u64::from(px[0]) + u64::from(px[1]) + u64::from(px[2]);
            count += 3;
        }
    }

    if count == 0 {
        return false;
    }
    (sum as f64 / count as f64) > LIGHT_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::color::rgb_to_hsl;
    use std::sync::Arc;

    fn flat_image(width: u32, height: u32, rgb: [u8; 3]) -> PreparedImage {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        PreparedImage {
            width,
            height,
            rgba8_premul: Arc::new(data),
        }
    }

    #[test]
    fn portrait_scene_layout() {
        let params = SceneParams {
            aspect_ratio: AspectRatio::Portrait,
            background_url: "https://cdn.example/bg.png".to_string(),
            logo_url: None,
            headline: "Cold Brew, Reinvented".to_string(),
            cta: "Shop Now".to_string(),
            brand_colors: vec!["#101010".to_string(), "#F5F5F5".to_string()],
            language: None,
            brightness: Some(RegionBrightness {
                headline_light: true,
                cta_light: false,
            }),
        };
        let doc = build_scene(&params);
        doc.validate().unwrap();

        assert_eq!(doc.objects.len(), 3);

        let Layer::Image(bg) = &doc.objects[0] else {
            panic!("layer 0 must be the background image");
        };
        assert_eq!(bg.base.layer_type, Some(LayerRole::Background));
        assert!(bg.base.locked);
        assert!(!bg.base.selectable);
        assert_eq!(bg.width, Some(1080.0));
        assert_eq!(bg.height, Some(1920.0));

        let Layer::Text(headline) = &doc.objects[1] else {
            panic!("layer 1 must be the headline");
        };
        assert_eq!(headline.text.as_deref(), Some("Cold Brew, Reinvented"));
        assert_eq!(headline.font_size, 72.0);
        assert_eq!(headline.base.left, 540.0);
        assert_eq!(headline.base.top, 1920.0 * 0.15);
        assert_eq!(headline.width, Some(1080.0 * 0.85));
        // Over a light band the headline is forced dark.
        let fill = parse_css_color(headline.fill.as_deref().unwrap()).unwrap();
        assert!(rgb_to_hsl(fill).l <= 20.0 + 1e-6);

        let Layer::Text(cta) = &doc.objects[2] else {
            panic!("layer 2 must be the CTA");
        };
        assert_eq!(cta.font_size, 48.0);
        // Over a dark band the CTA text is forced light, and the chip is
        // present and forced the opposite way.
        let fill = parse_css_color(cta.fill.as_deref().unwrap()).unwrap();
        assert!(rgb_to_hsl(fill).l >= 85.0 - 1e-6);
        let chip = parse_css_color(cta.block_background().unwrap()).unwrap();
        assert!(rgb_to_hsl(chip).l <= 20.0 + 1e-6);
    }

    #[test]
    fn logo_layer_is_optional_and_corner_anchored() {
        let mut params = SceneParams {
            aspect_ratio: AspectRatio::Landscape,
            background_url: "https://cdn.example/bg.png".to_string(),
            logo_url: Some("https://cdn.example/logo.png".to_string()),
            headline: "h".to_string(),
            cta: "c".to_string(),
            brand_colors: vec![],
            language: None,
            brightness: None,
        };
        let doc = build_scene(&params);
        assert_eq!(doc.objects.len(), 4);
        let Layer::Image(logo) = &doc.objects[3] else {
            panic!("layer 3 must be the logo");
        };
        assert_eq!(logo.base.layer_type, Some(LayerRole::Logo));
        assert_eq!(logo.base.left, 1920.0 - 150.0 - 40.0);
        assert_eq!(logo.base.top, 1080.0 - 150.0 - 40.0);
        assert_eq!(logo.base.opacity, 0.9);

        params.logo_url = None;
        assert_eq!(build_scene(&params).objects.len(), 3);
    }

    #[test]
    fn brand_colors_pass_through_without_hints() {
        let params = SceneParams {
            aspect_ratio: AspectRatio::Square,
            background_url: "https://cdn.example/bg.png".to_string(),
            logo_url: None,
            headline: "h".to_string(),
            cta: "c".to_string(),
            brand_colors: vec!["#336699".to_string(), "#ffcc00".to_string()],
            language: None,
            brightness: None,
        };
        let doc = build_scene(&params);
        let Layer::Text(headline) = &doc.objects[1] else {
            unreachable!()
        };
        assert_eq!(headline.fill.as_deref(), Some("#ffcc00"));
        let Layer::Text(cta) = &doc.objects[2] else {
            unreachable!()
        };
        assert_eq!(cta.fill.as_deref(), Some("#336699"));
    }

    #[test]
    fn japanese_language_selects_cjk_family() {
        let mut params = SceneParams {
            aspect_ratio: AspectRatio::Square,
            background_url: "u".to_string(),
            logo_url: None,
            headline: "h".to_string(),
            cta: "c".to_string(),
            brand_colors: vec![],
            language: Some("ja".to_string()),
            brightness: None,
        };
        let doc = build_scene(&params);
        let Layer::Text(headline) = &doc.objects[1] else {
            unreachable!()
        };
        assert!(headline.font_family.starts_with("Noto Sans JP"));

        params.language = Some("en".to_string());
        let doc = build_scene(&params);
        let Layer::Text(headline) = &doc.objects[1] else {
            unreachable!()
        };
        assert_eq!(headline.font_family, "Arial, sans-serif");
    }

    #[test]
    fn headline_and_cta_fallback_chains() {
        assert_eq!(
            headline_text(Some("Prod"), Some("Camp"), Some("Short message")),
            "Short message"
        );
        let long = "x".repeat(61);
        assert_eq!(
            headline_text(Some("Prod"), Some("Camp"), Some(&long)),
            "Prod"
        );
        assert_eq!(headline_text(None, Some("Camp"), None), "Camp");
        assert_eq!(headline_text(None, None, None), "Discover More");
        // Empty strings count as absent, not as copy.
        assert_eq!(headline_text(Some(""), None, Some("")), "Discover More");
        assert_eq!(cta_text(Some("Buy today")), "Buy today");
        assert_eq!(cta_text(Some("")), "Shop Now");
        assert_eq!(cta_text(None), "Shop Now");
    }

    #[test]
    fn brightness_bands_use_documented_regions() {
        // Light on top, dark at the bottom.
        let mut data = Vec::new();
        let (w, h) = (8u32, 100u32);
        for y in 0..h {
            let v = if y < 50 { 250u8 } else { 10u8 };
            for _ in 0..w {
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let img = PreparedImage {
            width: w,
            height: h,
            rgba8_premul: Arc::new(data),
        };
        let bb = analyze_background_brightness(&img);
        assert!(bb.headline_light);
        assert!(!bb.cta_light);

        let gray = flat_image(8, 100, [128, 128, 128]);
        let bb = analyze_background_brightness(&gray);
        // Exactly at the threshold counts as dark.
        assert!(!bb.headline_light);
    }
}
