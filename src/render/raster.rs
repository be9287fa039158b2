//! Deterministic, headless flattening of a scene document into pixels.
//!
//! Painting walks `objects` in array order (that order IS the z-order)
//! onto an opaque white canvas. Each layer's opacity applies to that
//! layer's paint operations only; rotation is about the layer's own
//! geometric center and never disturbs other layers. All image bytes are
//! prepared up front (see [`PreparedImageStore`]) so this pass performs no
//! I/O and is pixel-stable for a given document and size.
//!
//! A layer that cannot be painted (unreachable source, missing required
//! field, degenerate geometry) is logged and skipped; the remaining layers
//! still render. Only canvas allocation itself is fatal.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use kurbo::Shape as _;
use tracing::warn;

use crate::{
    assets::decode::PreparedImage,
    assets::store::PreparedImageStore,
    foundation::color::{Srgba, parse_css_color},
    foundation::core::{Affine, BezPath, CanvasSize, Circle, FrameRgba, Point, RoundedRect},
    foundation::error::{SceneError, SceneResult},
    scene::model::{
        CircleLayer, FontStyle, ImageLayer, Layer, LayerBase, OriginX, OriginY, RectLayer,
        SceneDocument, TextAlign, TextLayer,
    },
    scene::proxy::{UrlResolver, canonical_src},
    text::engine::{TextBrush, TextEngine, TextStyle},
    text::script::resolve_font_stack,
};

/// Padding around a text block's background chip, per side.
const TEXT_CHIP_PADDING: f64 = 20.0;
const DEFAULT_TEXT_FILL: &str = "#000000";
const DEFAULT_SHAPE_FILL: &str = "#3b82f6";

/// CPU rasterizer for scene documents.
///
/// Holds the shared text engine (one shaping source for wrap and paint) and
/// a small glyph-font cache; safe to reuse across documents.
pub struct Rasterizer {
    engine: TextEngine,
    glyph_fonts: HashMap<u64, vello_cpu::peniko::FontData>,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer {
    /// Rasterizer over the system font collection.
    pub fn new() -> Self {
        Self {
            engine: TextEngine::new(),
            glyph_fonts: HashMap::new(),
        }
    }

    /// Rasterizer that additionally registers every font file in `dir`.
    pub fn with_fonts_dir(dir: &std::path::Path) -> Self {
        Self {
            engine: TextEngine::with_fonts_dir(dir),
            glyph_fonts: HashMap::new(),
        }
    }

    /// Access the shared text engine (the layered exporter reuses it so
    /// wrap metrics stay identical across outputs).
    pub fn engine_mut(&mut self) -> &mut TextEngine {
        &mut self.engine
    }

    /// Flatten `doc` to premultiplied RGBA8 at the requested dimensions.
    #[tracing::instrument(skip_all, fields(width = size.width, height = size.height))]
    pub fn render(
        &mut self,
        doc: &SceneDocument,
        size: CanvasSize,
        store: &PreparedImageStore,
        resolver: Option<&dyn UrlResolver>,
    ) -> SceneResult<FrameRgba> {
        let width: u16 = size
            .width
            .try_into()
            .map_err(|_| SceneError::render("canvas width exceeds the supported pixel range"))?;
        let height: u16 = size
            .height
            .try_into()
            .map_err(|_| SceneError::render("canvas height exceeds the supported pixel range"))?;
        if width == 0 || height == 0 {
            return Err(SceneError::render("canvas dimensions must be > 0"));
        }

        let mut pixmap = vello_cpu::Pixmap::new(width, height);
        let mut ctx = vello_cpu::RenderContext::new(width, height);

        // Opaque white base.
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(size.width),
            f64::from(size.height),
        ));

        for layer in &doc.objects {
            if !layer.base().visible {
                continue;
            }
            if let Err(e) = self.paint_layer(&mut ctx, layer, size, store, resolver) {
                warn!(layer = layer.display_name(), error = %e, "skipping layer");
            }
        }

        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        Ok(FrameRgba {
            width: size.width,
            height: size.height,
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }

    /// Flatten `doc` and encode the result as PNG bytes.
    pub fn render_png(
        &mut self,
        doc: &SceneDocument,
        size: CanvasSize,
        store: &PreparedImageStore,
        resolver: Option<&dyn UrlResolver>,
    ) -> SceneResult<Vec<u8>> {
        let frame = self.render(doc, size, store, resolver)?;
        encode_png(&frame)
    }

    fn paint_layer(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layer: &Layer,
        size: CanvasSize,
        store: &PreparedImageStore,
        resolver: Option<&dyn UrlResolver>,
    ) -> SceneResult<()> {
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        let opacity = layer.base().opacity.clamp(0.0, 1.0) as f32;

        match layer {
            Layer::Image(img) => self.paint_image(ctx, img, opacity, store, resolver),
            Layer::Text(text) => self.paint_text(ctx, text, opacity, size),
            Layer::Rect(rect) => paint_rect(ctx, rect, opacity),
            Layer::Circle(circle) => paint_circle(ctx, circle, opacity),
        }
    }

    fn paint_image(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layer: &ImageLayer,
        opacity: f32,
        store: &PreparedImageStore,
        resolver: Option<&dyn UrlResolver>,
    ) -> SceneResult<()> {
        let src = layer
            .src
            .as_deref()
            .ok_or_else(|| SceneError::layer("image layer has no source"))?;
        let canonical = canonical_src(src, resolver);
        let image = store
            .get(&canonical)
            .ok_or_else(|| SceneError::layer(format!("image '{canonical}' was not prepared")))?;

        let natural_w = f64::from(image.width);
        let natural_h = f64::from(image.height);
        let draw_w = layer.width.unwrap_or(natural_w) * layer.base.scale_x;
        let draw_h = layer.height.unwrap_or(natural_h) * layer.base.scale_y;
        if natural_w <= 0.0 || natural_h <= 0.0 || draw_w <= 0.0 || draw_h <= 0.0 {
            return Err(SceneError::layer("image layer has a degenerate size"));
        }

        let paint = image_paint(image)?;
        let transform = placement(&layer.base, draw_w, draw_h)
            * Affine::scale_non_uniform(draw_w / natural_w, draw_h / natural_h);

        ctx.set_transform(affine_to_cpu(transform));
        ctx.set_paint(paint);
        if opacity < 1.0 {
            ctx.push_opacity_layer(opacity);
        }
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, natural_w, natural_h));
        if opacity < 1.0 {
            ctx.pop_layer();
        }
        Ok(())
    }

    fn paint_text(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layer: &TextLayer,
        opacity: f32,
        size: CanvasSize,
    ) -> SceneResult<()> {
        let text = layer
            .text
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SceneError::layer("text layer has no content"))?;

        let wrap_width = layer.width.unwrap_or(f64::from(size.width));
        let style = text_style(layer, text)?;
        if wrap_width <= 0.0 {
            return Err(SceneError::layer("text layer has a non-positive wrap width"));
        }

        let block = self.engine.wrap_block(text, &style, wrap_width);
        if block.lines.is_empty() {
            return Ok(());
        }

        let line_px = f64::from(style.size) * layer.line_height;
        let block_h = line_px * block.lines.len() as f64;
        let place = placement(&layer.base, wrap_width, block_h);

        // Parse every color before any paint op so a structural error skips
        // the layer without leaving a dangling opacity layer behind.
        let chip_color = match layer.block_background() {
            Some(bg) => Some(parse_css_color(bg).map_err(SceneError::layer)?),
            None => None,
        };
        let fill = parse_css_color(layer.fill.as_deref().unwrap_or(DEFAULT_TEXT_FILL))
            .map_err(SceneError::layer)?;
        let brush = srgba_to_brush(fill);

        ctx.set_transform(affine_to_cpu(place));
        if opacity < 1.0 {
            ctx.push_opacity_layer(opacity);
        }

        // Background chip sized to the block, padded per side, aligned the
        // same way as the text itself.
        if let Some(chip_color) = chip_color {
            let chip_w = layer.width.unwrap_or(block.max_line_width);
            let chip_x = align_offset(layer.text_align, wrap_width, chip_w);
            ctx.set_paint(srgba_to_paint(chip_color));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                chip_x - TEXT_CHIP_PADDING,
                -TEXT_CHIP_PADDING,
                chip_x + chip_w + TEXT_CHIP_PADDING,
                block_h + TEXT_CHIP_PADDING,
            ));
        }

        for (i, line) in block.lines.iter().enumerate() {
            let line_x = align_offset(layer.text_align, wrap_width, block.line_widths[i]);
            let layout = self.engine.shape_line(line, &style, brush);
            let transform = place * Affine::translate((line_x, i as f64 * line_px));
            self.draw_layout(ctx, &layout, transform);
        }

        if opacity < 1.0 {
            ctx.pop_layer();
        }
        Ok(())
    }

    /// Paint a shaped line's glyph runs at `transform`.
    pub(crate) fn draw_layout(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        layout: &parley::Layout<TextBrush>,
        transform: Affine,
    ) {
        ctx.set_transform(affine_to_cpu(transform));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };

                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));

                let font = run.run().font();
                let key = font.data.id();
                let font_data = match self.glyph_fonts.get(&key) {
                    Some(cached) => cached.clone(),
                    None => {
                        let data = vello_cpu::peniko::FontData::new(
                            vello_cpu::peniko::Blob::from(font.data.as_ref().to_vec()),
                            font.index,
                        );
                        self.glyph_fonts.insert(key, data.clone());
                        data
                    }
                };

                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&font_data)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
}

/// Resolved style for a text layer's content.
pub(crate) fn text_style(layer: &TextLayer, text: &str) -> SceneResult<TextStyle> {
    let size = (layer.font_size * layer.base.scale_x) as f32;
    if !size.is_finite() || size <= 0.0 {
        return Err(SceneError::layer("text layer font size must be > 0"));
    }
    Ok(TextStyle {
        family_stack: resolve_font_stack(&layer.font_family, text),
        size,
        weight: f32::from(layer.font_weight.to_number()),
        italic: matches!(layer.font_style, FontStyle::Italic),
    })
}

/// Horizontal offset of a run of width `inner` within a box of `outer`.
pub(crate) fn align_offset(align: TextAlign, outer: f64, inner: f64) -> f64 {
    match align {
        TextAlign::Left => 0.0,
        TextAlign::Center => (outer - inner) / 2.0,
        TextAlign::Right => outer - inner,
    }
}

/// Map a layer's local `(0,0)..(w,h)` box onto the canvas: origin-aware
/// anchoring, then rotation about the box center when the angle is set.
pub(crate) fn placement(base: &LayerBase, draw_w: f64, draw_h: f64) -> Affine {
    let x0 = base.left
        - match base.origin_x {
            OriginX::Left => 0.0,
            OriginX::Center => draw_w / 2.0,
        };
    let y0 = base.top
        - match base.origin_y {
            OriginY::Top => 0.0,
            OriginY::Center => draw_h / 2.0,
        };

    if base.angle != 0.0 {
        Affine::translate((x0 + draw_w / 2.0, y0 + draw_h / 2.0))
            * Affine::rotate(base.angle.to_radians())
            * Affine::translate((-draw_w / 2.0, -draw_h / 2.0))
    } else {
        Affine::translate((x0, y0))
    }
}

pub(crate) fn paint_rect(
    ctx: &mut vello_cpu::RenderContext,
    layer: &RectLayer,
    opacity: f32,
) -> SceneResult<()> {
    let w = layer.width * layer.base.scale_x;
    let h = layer.height * layer.base.scale_y;
    if w <= 0.0 || h <= 0.0 {
        return Err(SceneError::layer("rect layer has a degenerate size"));
    }
    let fill = parse_css_color(layer.fill.as_deref().unwrap_or(DEFAULT_SHAPE_FILL))
        .map_err(SceneError::layer)?;

    ctx.set_transform(affine_to_cpu(placement(&layer.base, w, h)));
    ctx.set_paint(srgba_to_paint(fill));
    if opacity < 1.0 {
        ctx.push_opacity_layer(opacity);
    }
    let radius = layer.corner_radius().min(w.min(h) / 2.0);
    if radius > 0.0 {
        let path = RoundedRect::new(0.0, 0.0, w, h, radius).to_path(0.1);
        ctx.fill_path(&bezpath_to_cpu(&path));
    } else {
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
    }
    if opacity < 1.0 {
        ctx.pop_layer();
    }
    Ok(())
}

pub(crate) fn paint_circle(
    ctx: &mut vello_cpu::RenderContext,
    layer: &CircleLayer,
    opacity: f32,
) -> SceneResult<()> {
    let radius = layer.radius * layer.base.scale_x.max(layer.base.scale_y);
    if radius <= 0.0 {
        return Err(SceneError::layer("circle layer has a non-positive radius"));
    }
    let fill = parse_css_color(layer.fill.as_deref().unwrap_or(DEFAULT_SHAPE_FILL))
        .map_err(SceneError::layer)?;

    let extent = radius * 2.0;
    ctx.set_transform(affine_to_cpu(placement(&layer.base, extent, extent)));
    ctx.set_paint(srgba_to_paint(fill));
    if opacity < 1.0 {
        ctx.push_opacity_layer(opacity);
    }
    let path = Circle::new((radius, radius), radius).to_path(0.1);
    ctx.fill_path(&bezpath_to_cpu(&path));
    if opacity < 1.0 {
        ctx.pop_layer();
    }
    Ok(())
}

/// Encode a rendered frame as PNG bytes (straight alpha on the wire).
pub fn encode_png(frame: &FrameRgba) -> SceneResult<Vec<u8>> {
    let mut data = frame.data.clone();
    if frame.premultiplied {
        crate::foundation::core::unpremultiply_rgba8_in_place(&mut data);
    }

    let mut out = Vec::new();
    image::write_buffer_with_format(
        &mut std::io::Cursor::new(&mut out),
        &data,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .context("encode png")?;
    Ok(out)
}

pub(crate) fn srgba_to_paint(c: Srgba) -> vello_cpu::peniko::Color {
    let [r, g, b, a] = c.to_rgba8();
    vello_cpu::peniko::Color::from_rgba8(r, g, b, a)
}

pub(crate) fn srgba_to_brush(c: Srgba) -> TextBrush {
    let [r, g, b, a] = c.to_rgba8();
    TextBrush { r, g, b, a }
}

/// Wrap prepared premultiplied pixels as a vello image paint.
pub(crate) fn image_paint(image: &PreparedImage) -> SceneResult<vello_cpu::Image> {
    let pixmap = premul_bytes_to_pixmap(image.rgba8_premul.as_slice(), image.width, image.height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

pub(crate) fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> SceneResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| SceneError::layer("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| SceneError::layer("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(SceneError::layer("prepared image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

pub(crate) fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_anchors_top_left_by_default() {
        let base = LayerBase::at(10.0, 20.0);
        let a = placement(&base, 100.0, 50.0);
        assert_eq!(a, Affine::translate((10.0, 20.0)));
    }

    #[test]
    fn placement_centers_when_origin_is_center() {
        let mut base = LayerBase::at(100.0, 100.0);
        base.origin_x = OriginX::Center;
        base.origin_y = OriginY::Center;
        let a = placement(&base, 40.0, 20.0);
        assert_eq!(a, Affine::translate((80.0, 90.0)));
    }

    #[test]
    fn rotation_preserves_the_box_center() {
        let mut base = LayerBase::at(10.0, 10.0);
        base.angle = 90.0;
        let a = placement(&base, 40.0, 20.0);
        // The local center maps to the same canvas point as without rotation.
        let center = a * Point::new(20.0, 10.0);
        assert!((center.x - 30.0).abs() < 1e-9);
        assert!((center.y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn align_offset_matches_alignment() {
        assert_eq!(align_offset(TextAlign::Left, 100.0, 40.0), 0.0);
        assert_eq!(align_offset(TextAlign::Center, 100.0, 40.0), 30.0);
        assert_eq!(align_offset(TextAlign::Right, 100.0, 40.0), 60.0);
    }
}
