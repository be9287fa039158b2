//! The scene document model: a layered 2D composition that is built
//! programmatically, edited interactively, rasterized headlessly and
//! exported to layered containers, all from one shared structure.
//!
//! A document is a pure serde data model. The `objects` order is the sole
//! source of z-order: index 0 paints first, later layers occlude earlier
//! ones. Unknown top-level keys are preserved opaquely so newer documents
//! survive a load/save cycle through an older build.

use serde::{Deserialize, Serialize};

use crate::foundation::error::{SceneError, SceneResult};

/// Format revision tag written by [`crate::scene::builder::build_scene`].
pub const SCENE_VERSION: &str = "1.0";

/// Root persisted unit: an ordered stack of layers plus a format tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    /// Format revision tag. Round-trips unchanged.
    pub version: String,
    /// Back-to-front layer stack. Order IS z-order.
    pub objects: Vec<Layer>,
    /// Unknown top-level keys, preserved opaquely for forward compatibility.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SceneDocument {
    /// An empty document at the current format revision.
    pub fn new() -> Self {
        Self {
            version: SCENE_VERSION.to_string(),
            objects: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Structural sanity checks: non-empty version, at most one background
    /// layer, no duplicate layer ids.
    pub fn validate(&self) -> SceneResult<()> {
        if self.version.trim().is_empty() {
            return Err(SceneError::validation("document version must be non-empty"));
        }

        let backgrounds = self
            .objects
            .iter()
            .filter(|l| l.role() == LayerRole::Background)
            .count();
        if backgrounds > 1 {
            return Err(SceneError::validation(format!(
                "document has {backgrounds} background layers, at most one is allowed"
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for layer in &self.objects {
            if let Some(id) = &layer.base().id
                && !seen.insert(id.as_str())
            {
                return Err(SceneError::validation(format!(
                    "duplicate layer id '{id}'"
                )));
            }
        }

        Ok(())
    }

    /// Apply `f` to every image-layer source URL.
    pub fn for_each_src_mut(&mut self, mut f: impl FnMut(&mut String)) {
        for layer in &mut self.objects {
            if let Layer::Image(img) = layer
                && let Some(src) = &mut img.src
            {
                f(src);
            }
        }
    }
}

impl Default for SceneDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Semantic role of a layer: business meaning, independent of the
/// rendering primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerRole {
    Background,
    Image,
    Text,
    Logo,
    Shape,
}

/// Anchor interpretation for a layer's `left` coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginX {
    #[default]
    Left,
    Center,
}

/// Anchor interpretation for a layer's `top` coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginY {
    #[default]
    Top,
    Center,
}

/// Horizontal alignment of wrapped text lines within the wrap box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Font slant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

/// Font weight: `"normal"`, `"bold"`, or a numeric weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FontWeight {
    Normal,
    Bold,
    Numeric(u16),
}

impl Default for FontWeight {
    fn default() -> Self {
        Self::Normal
    }
}

impl FontWeight {
    /// CSS-style numeric weight (400/700 for the keywords).
    pub fn to_number(self) -> u16 {
        match self {
            Self::Normal => 400,
            Self::Bold => 700,
            Self::Numeric(n) => n,
        }
    }
}

impl Serialize for FontWeight {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Normal => serializer.serialize_str("normal"),
            Self::Bold => serializer.serialize_str("bold"),
            Self::Numeric(n) => serializer.serialize_u16(*n),
        }
    }
}

impl<'de> Deserialize<'de> for FontWeight {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(u16),
            Str(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Ok(Self::Numeric(n)),
            Repr::Str(s) => match s.as_str() {
                "bold" => Ok(Self::Bold),
                "normal" => Ok(Self::Normal),
                other => other.parse::<u16>().map(Self::Numeric).map_err(|_| {
                    serde::de::Error::custom(format!("invalid font weight \"{other}\""))
                }),
            },
        }
    }
}

fn default_scale() -> f64 {
    1.0
}

fn default_opacity() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn is_one(v: &f64) -> bool {
    *v == 1.0
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Positional, transform and editing attributes shared by every layer kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerBase {
    /// Unique id within the document; used for selection correlation in
    /// editors, never for rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display label only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Semantic role. Absent on hand-written documents; inferred from the
    /// primitive kind via [`Layer::role`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_type: Option<LayerRole>,
    /// Position in unscaled layer-local units (interpretation depends on
    /// the origin fields).
    pub left: f64,
    pub top: f64,
    #[serde(default)]
    pub origin_x: OriginX,
    #[serde(default)]
    pub origin_y: OriginY,
    #[serde(default = "default_scale", skip_serializing_if = "is_one")]
    pub scale_x: f64,
    #[serde(default = "default_scale", skip_serializing_if = "is_one")]
    pub scale_y: f64,
    /// Clockwise rotation in degrees about the layer's geometric center.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub angle: f64,
    #[serde(default = "default_opacity", skip_serializing_if = "is_one")]
    pub opacity: f64,
    /// Invisible layers are skipped during rasterization but kept in the
    /// document.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub visible: bool,
    /// Editing-time hint: prevents selection/movement. No rendering effect.
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
    /// Editing-time hint. No rendering effect.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub selectable: bool,
    /// Editing-time hint. No rendering effect.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub evented: bool,
}

impl LayerBase {
    /// A base at `left`/`top` with every other field at its default.
    pub fn at(left: f64, top: f64) -> Self {
        Self {
            id: None,
            name: None,
            layer_type: None,
            left,
            top,
            origin_x: OriginX::default(),
            origin_y: OriginY::default(),
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            opacity: 1.0,
            visible: true,
            locked: false,
            selectable: true,
            evented: true,
        }
    }
}

/// Bitmap layer referencing an externally hosted source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayer {
    #[serde(flatten)]
    pub base: LayerBase,
    /// Source URL. May arrive in a locally-proxied form; it is resolved to
    /// the canonical remote URL before fetching or persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Declared natural width in pixels, before scale. For freshly inserted
    /// images this comes from the decoded pixel dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

fn default_font_size() -> f64 {
    16.0
}

fn default_font_family() -> String {
    "Arial, sans-serif".to_string()
}

fn default_line_height() -> f64 {
    1.16
}

/// Word-wrapped text block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLayer {
    #[serde(flatten)]
    pub base: LayerBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Wrap width in layer-local units. Falls back to the canvas width when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default)]
    pub font_style: FontStyle,
    #[serde(default)]
    pub text_align: TextAlign,
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    /// Text color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Fill behind the whole text block (the "chip").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Editor-compatible alias surface for the block background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_background_color: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
}

impl TextLayer {
    /// The effective block background: `backgroundColor` wins over
    /// `textBackgroundColor`; empty strings count as absent.
    pub fn block_background(&self) -> Option<&str> {
        for candidate in [&self.background_color, &self.text_background_color] {
            if let Some(c) = candidate
                && !c.is_empty()
            {
                return Some(c.as_str());
            }
        }
        None
    }
}

fn default_shape_extent() -> f64 {
    100.0
}

fn default_radius() -> f64 {
    50.0
}

/// Filled rectangle, optionally with uniformly rounded corners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectLayer {
    #[serde(flatten)]
    pub base: LayerBase,
    #[serde(default = "default_shape_extent")]
    pub width: f64,
    #[serde(default = "default_shape_extent")]
    pub height: f64,
    /// Corner radius; `rx`/`ry` are kept equal for uniform rounding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ry: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

impl RectLayer {
    /// Effective uniform corner radius.
    pub fn corner_radius(&self) -> f64 {
        self.rx.or(self.ry).unwrap_or(0.0).max(0.0)
    }
}

/// Filled circle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleLayer {
    #[serde(flatten)]
    pub base: LayerBase,
    #[serde(default = "default_radius")]
    pub radius: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

/// One positioned, styled element of a scene document.
///
/// A closed sum over the rendering-primitive kinds. The `type` tag on the
/// wire selects the variant; the semantic role lives in
/// [`LayerBase::layer_type`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Layer {
    #[serde(rename = "image")]
    Image(ImageLayer),
    #[serde(rename = "textbox")]
    Text(TextLayer),
    #[serde(rename = "rect")]
    Rect(RectLayer),
    #[serde(rename = "circle")]
    Circle(CircleLayer),
}

impl Layer {
    /// Shared positional/transform record.
    pub fn base(&self) -> &LayerBase {
        match self {
            Self::Image(l) => &l.base,
            Self::Text(l) => &l.base,
            Self::Rect(l) => &l.base,
            Self::Circle(l) => &l.base,
        }
    }

    /// Mutable shared record.
    pub fn base_mut(&mut self) -> &mut LayerBase {
        match self {
            Self::Image(l) => &mut l.base,
            Self::Text(l) => &mut l.base,
            Self::Rect(l) => &mut l.base,
            Self::Circle(l) => &mut l.base,
        }
    }

    /// Declared semantic role, or one inferred from the primitive kind.
    pub fn role(&self) -> LayerRole {
        if let Some(role) = self.base().layer_type {
            return role;
        }
        match self {
            Self::Image(_) => LayerRole::Image,
            Self::Text(_) => LayerRole::Text,
            Self::Rect(_) | Self::Circle(_) => LayerRole::Shape,
        }
    }

    /// Label for diagnostics: name, then id, then the primitive kind.
    pub fn display_name(&self) -> &str {
        let base = self.base();
        base.name
            .as_deref()
            .or(base.id.as_deref())
            .unwrap_or_else(|| match self {
                Self::Image(_) => "image",
                Self::Text(_) => "textbox",
                Self::Rect(_) => "rect",
                Self::Circle(_) => "circle",
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_layer(text: &str) -> Layer {
        Layer::Text(TextLayer {
            base: LayerBase::at(10.0, 20.0),
            text: Some(text.to_string()),
            width: Some(300.0),
            font_size: 48.0,
            font_family: "Arial, sans-serif".to_string(),
            font_weight: FontWeight::Bold,
            font_style: FontStyle::Normal,
            text_align: TextAlign::Center,
            line_height: 1.16,
            fill: Some("#101010".to_string()),
            background_color: None,
            text_background_color: None,
            underline: false,
        })
    }

    #[test]
    fn layer_tag_selects_variant() {
        let json = r#"{
            "type": "textbox",
            "left": 540.0,
            "top": 288.0,
            "originX": "center",
            "text": "Hello",
            "fontSize": 72,
            "fontWeight": 700,
            "textAlign": "center"
        }"#;
        let layer: Layer = serde_json::from_str(json).unwrap();
        let Layer::Text(t) = &layer else {
            panic!("expected textbox variant");
        };
        assert_eq!(t.text.as_deref(), Some("Hello"));
        assert_eq!(t.font_weight, FontWeight::Numeric(700));
        assert_eq!(t.base.origin_x, OriginX::Center);
        assert_eq!(t.base.origin_y, OriginY::Top);
        // Defaults fill in.
        assert_eq!(t.base.scale_x, 1.0);
        assert!(t.base.visible);
    }

    #[test]
    fn document_roundtrips_with_unknown_keys() {
        let json = r##"{
            "version": "1.0",
            "objects": [
                { "type": "rect", "left": 1.5, "top": 2.25, "width": 64, "height": 32, "fill": "#ff0000" }
            ],
            "generator": "upstream-vNext",
            "meta": { "campaign": "c-42" }
        }"##;
        let doc: SceneDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.extra.get("generator").unwrap(), "upstream-vNext");

        let out = serde_json::to_string(&doc).unwrap();
        let back: SceneDocument = serde_json::from_str(&out).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn font_weight_wire_forms() {
        let w: FontWeight = serde_json::from_str("\"bold\"").unwrap();
        assert_eq!(w, FontWeight::Bold);
        let w: FontWeight = serde_json::from_str("650").unwrap();
        assert_eq!(w, FontWeight::Numeric(650));
        assert_eq!(serde_json::to_string(&FontWeight::Bold).unwrap(), "\"bold\"");
        assert_eq!(
            serde_json::to_string(&FontWeight::Numeric(700)).unwrap(),
            "700"
        );
    }

    #[test]
    fn missing_kind_fields_parse_as_absent() {
        // A structurally incomplete layer parses; the renderer skips it.
        let json = r#"{ "type": "textbox", "left": 0, "top": 0 }"#;
        let layer: Layer = serde_json::from_str(json).unwrap();
        let Layer::Text(t) = &layer else {
            panic!("expected textbox variant");
        };
        assert!(t.text.is_none());
    }

    #[test]
    fn validate_rejects_two_backgrounds() {
        let mut doc = SceneDocument::new();
        for _ in 0..2 {
            let mut layer = Layer::Image(ImageLayer {
                base: LayerBase::at(0.0, 0.0),
                src: Some("https://cdn.example/bg.png".to_string()),
                width: Some(1080.0),
                height: Some(1080.0),
            });
            layer.base_mut().layer_type = Some(LayerRole::Background);
            doc.objects.push(layer);
        }
        assert!(doc.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let mut doc = SceneDocument::new();
        for _ in 0..2 {
            let mut layer = text_layer("x");
            layer.base_mut().id = Some("dup".to_string());
            doc.objects.push(layer);
        }
        assert!(doc.validate().is_err());
    }

    #[test]
    fn block_background_prefers_background_color() {
        let Layer::Text(mut t) = text_layer("x") else {
            unreachable!()
        };
        assert_eq!(t.block_background(), None);
        t.text_background_color = Some("#222222".to_string());
        assert_eq!(t.block_background(), Some("#222222"));
        t.background_color = Some("".to_string());
        assert_eq!(t.block_background(), Some("#222222"));
        t.background_color = Some("#ffffff".to_string());
        assert_eq!(t.block_background(), Some("#ffffff"));
    }
}
