//! Adscene generates and processes layered scene documents for social-ad
//! creatives.
//!
//! One JSON-serializable scene model (background image, headline, CTA,
//! logo, shapes) is shared by four operations that must agree with each
//! other pixel-for-pixel:
//!
//! 1. **Build**: [`build_scene`] emits the initial document from generation
//!    parameters; pure, no I/O.
//! 2. **Rasterize**: [`Rasterizer`] flattens a document into PNG-encodable
//!    pixels on a server, with no DOM or GPU.
//! 3. **Export**: [`export_psd`] converts the same document into a layered
//!    Photoshop-style container for manual editing.
//! 4. **Edit**: [`SceneHistory`] provides bounded snapshot undo/redo over
//!    serialized documents.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic rendering**: all external I/O (image fetches) is
//!   front-loaded into a [`PreparedImageStore`]; the paint pass is pure and
//!   strictly sequential in z-order.
//! - **One metrics source**: word-wrap measurement and glyph painting run
//!   through the same [`TextEngine`], so line breaks cannot differ between
//!   a preview and the final render.
//! - **Per-layer failure isolation**: a fetch/decode failure or a
//!   structurally incomplete layer is logged and skipped; the remaining
//!   layers still render or export.
#![forbid(unsafe_code)]

mod assets;
mod export;
mod foundation;
mod history;
mod render;
mod scene;
mod text;

pub use assets::decode::{PreparedImage, decode_image};
pub use assets::fetch::{FetchSource, FileSource, HttpSource, normalize_rel_path};
pub use assets::store::PreparedImageStore;
pub use export::convert::{convert_layers, export_psd};
pub use export::psd::{PsdLayerImage, write_psd};
pub use foundation::color::{
    Hsl, Srgba, adjust_for_contrast, hsl_to_rgb, parse_css_color, rgb_to_hsl,
};
pub use foundation::core::{
    AspectRatio, CanvasSize, FrameRgba, premultiply_rgba8_in_place, unpremultiply_rgba8_in_place,
};
pub use foundation::error::{SceneError, SceneResult};
pub use history::machine::{DEFAULT_MAX_HISTORY, SceneHistory, persistable_snapshot};
pub use render::batch::{BatchOptions, RenderJob, render_documents};
pub use render::raster::{Rasterizer, encode_png};
pub use scene::builder::{
    RegionBrightness, SceneParams, analyze_background_brightness, build_scene, cta_text,
    headline_text,
};
pub use scene::model::{
    CircleLayer, FontStyle, FontWeight, ImageLayer, Layer, LayerBase, LayerRole, OriginX, OriginY,
    RectLayer, SCENE_VERSION, SceneDocument, TextAlign, TextLayer,
};
pub use scene::proxy::{
    IdentityResolver, PrefixProxy, UrlResolver, canonicalize_sources, editor_sources,
};
pub use text::engine::{MeasureText, TextBrush, TextEngine, TextStyle, WrappedBlock, wrap_lines};
pub use text::script::{
    JAPANESE_FAMILY, KOREAN_FAMILY, contains_cjk, contains_korean, resolve_font_stack,
};
