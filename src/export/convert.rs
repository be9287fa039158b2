//! Conversion of scene layers into independently editable PSD layers.
//!
//! Unlike the rasterizer, which flattens everything into one buffer, each
//! scene layer becomes its own named container layer with its own pixel
//! buffer, position and opacity. Text and shapes have no native container
//! representation, so they are rasterized onto dedicated transparent
//! canvases using the same wrap and font-resolution rules as the flattening
//! path; a converted document therefore lands every element at the same
//! visual location as the flattened raster.
//!
//! A layer that fails to convert (unreachable image, missing fields) is
//! omitted from the output; the remaining layers still produce a valid,
//! possibly partial, container.

use tracing::warn;

use crate::{
    assets::store::PreparedImageStore,
    export::psd::{PsdLayerImage, write_psd},
    foundation::color::parse_css_color,
    foundation::core::{Affine, CanvasSize, Circle, RoundedRect, unpremultiply_rgba8_in_place},
    foundation::error::{SceneError, SceneResult},
    render::raster::{
        Rasterizer, align_offset, bezpath_to_cpu, srgba_to_brush, srgba_to_paint, text_style,
    },
    scene::model::{
        CircleLayer, ImageLayer, Layer, LayerBase, OriginX, OriginY, RectLayer, SceneDocument,
        TextLayer,
    },
    scene::proxy::{UrlResolver, canonical_src},
};

use kurbo::Shape as _;

/// Extra height added below the wrapped block.
const TEXT_CANVAS_PADDING: f64 = 20.0;

const DEFAULT_TEXT_FILL: &str = "#000000";
const DEFAULT_SHAPE_FILL: &str = "#3b82f6";

/// Convert every visible scene layer into a container layer.
pub fn convert_layers(
    doc: &SceneDocument,
    size: CanvasSize,
    store: &PreparedImageStore,
    rasterizer: &mut Rasterizer,
    resolver: Option<&dyn UrlResolver>,
) -> Vec<PsdLayerImage> {
    let mut out = Vec::new();
    for layer in &doc.objects {
        if !layer.base().visible {
            continue;
        }
        let converted = match layer {
            Layer::Image(img) => convert_image(img, store, resolver),
            Layer::Text(text) => convert_text(text, size, rasterizer),
            Layer::Rect(rect) => convert_rect(rect),
            Layer::Circle(circle) => convert_circle(circle),
        };
        match converted {
            Ok(psd_layer) => out.push(psd_layer),
            Err(e) => {
                warn!(layer = layer.display_name(), error = %e, "omitting layer from export");
            }
        }
    }
    out
}

/// Convert a document and serialize it as a PSD byte buffer.
#[tracing::instrument(skip_all, fields(width = size.width, height = size.height))]
pub fn export_psd(
    doc: &SceneDocument,
    size: CanvasSize,
    store: &PreparedImageStore,
    rasterizer: &mut Rasterizer,
    resolver: Option<&dyn UrlResolver>,
) -> SceneResult<Vec<u8>> {
    let layers = convert_layers(doc, size, store, rasterizer, resolver);
    write_psd(size, &layers)
}

fn opacity_byte(base: &LayerBase) -> u8 {
    (base.opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Placed position compensated for center-origin anchoring.
fn placed_corner(base: &LayerBase, w: f64, h: f64) -> (i32, i32) {
    let mut left = base.left;
    let mut top = base.top;
    if base.origin_x == OriginX::Center {
        left -= w / 2.0;
    }
    if base.origin_y == OriginY::Center {
        top -= h / 2.0;
    }
    (left.round() as i32, top.round() as i32)
}

fn convert_image(
    layer: &ImageLayer,
    store: &PreparedImageStore,
    resolver: Option<&dyn UrlResolver>,
) -> SceneResult<PsdLayerImage> {
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
    let final_w = draw_w.round().max(1.0) as u32;
    let final_h = draw_h.round().max(1.0) as u32;

    let straight = image.to_straight_rgba8();
    let rgba = image::RgbaImage::from_raw(image.width, image.height, straight)
        .ok_or_else(|| SceneError::layer("prepared image byte length mismatch"))?;
    let resized = image::imageops::resize(
        &rgba,
        final_w,
        final_h,
        image::imageops::FilterType::Triangle,
    );

    let (left, top) = placed_corner(&layer.base, draw_w, draw_h);
    Ok(PsdLayerImage {
        name: layer
            .base
            .name
            .clone()
            .unwrap_or_else(|| "Image Layer".to_string()),
        left,
        top,
        opacity: opacity_byte(&layer.base),
        width: final_w,
        height: final_h,
        rgba: resized.into_raw(),
    })
}

fn convert_text(
    layer: &TextLayer,
    size: CanvasSize,
    rasterizer: &mut Rasterizer,
) -> SceneResult<PsdLayerImage> {
    let text = layer
        .text
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SceneError::layer("text layer has no content"))?;
    let style = text_style(layer, text)?;

    // Same effective wrap width as the flattening rasterizer, so line
    // breaks cannot differ between the flattened raster and the export.
    let wrap_width = layer.width.unwrap_or(f64::from(size.width));
    let canvas_w = wrap_width.round().max(1.0);
    let line_px = f64::from(style.size) * layer.line_height;
    let block = rasterizer.engine_mut().wrap_block(text, &style, wrap_width);
    let canvas_h = (block.lines.len().max(1) as f64 * line_px + TEXT_CANVAS_PADDING).max(line_px);

    let (mut ctx, mut pixmap) = layer_canvas(canvas_w, canvas_h)?;

    if let Some(bg) = layer.block_background() {
        let chip = parse_css_color(bg).map_err(SceneError::layer)?;
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(srgba_to_paint(chip));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, canvas_w, canvas_h));
    }

    let fill = parse_css_color(layer.fill.as_deref().unwrap_or(DEFAULT_TEXT_FILL))
        .map_err(SceneError::layer)?;
    let brush = srgba_to_brush(fill);

    for (i, line) in block.lines.iter().enumerate() {
        let line_x = align_offset(layer.text_align, wrap_width, block.line_widths[i]);
        let layout = rasterizer.engine_mut().shape_line(line, &style, brush);
        let transform = Affine::translate((line_x, i as f64 * line_px));
        rasterizer.draw_layout(&mut ctx, &layout, transform);
    }

    let rgba = finish_layer_canvas(ctx, &mut pixmap);
    let (left, top) = placed_corner(&layer.base, canvas_w, canvas_h);
    Ok(PsdLayerImage {
        name: layer
            .base
            .name
            .clone()
            .unwrap_or_else(|| "Text Layer".to_string()),
        left,
        top,
        opacity: opacity_byte(&layer.base),
        width: canvas_w as u32,
        height: canvas_h as u32,
        rgba,
    })
}

fn convert_rect(layer: &RectLayer) -> SceneResult<PsdLayerImage> {
    let w = (layer.width * layer.base.scale_x).round().max(1.0);
    let h = (layer.height * layer.base.scale_y).round().max(1.0);
    let fill = parse_css_color(layer.fill.as_deref().unwrap_or(DEFAULT_SHAPE_FILL))
        .map_err(SceneError::layer)?;

    let (mut ctx, mut pixmap) = layer_canvas(w, h)?;
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(srgba_to_paint(fill));
    let radius = layer.corner_radius().min(w.min(h) / 2.0);
    if radius > 0.0 {
        let path = RoundedRect::new(0.0, 0.0, w, h, radius).to_path(0.1);
        ctx.fill_path(&bezpath_to_cpu(&path));
    } else {
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
    }

    let rgba = finish_layer_canvas(ctx, &mut pixmap);
    let (left, top) = placed_corner(&layer.base, w, h);
    Ok(PsdLayerImage {
        name: layer
            .base
            .name
            .clone()
            .unwrap_or_else(|| "Shape Layer".to_string()),
        left,
        top,
        opacity: opacity_byte(&layer.base),
        width: w as u32,
        height: h as u32,
        rgba,
    })
}

fn convert_circle(layer: &CircleLayer) -> SceneResult<PsdLayerImage> {
    let radius = (layer.radius * layer.base.scale_x.max(layer.base.scale_y))
        .round()
        .max(1.0);
    let extent = radius * 2.0;
    let fill = parse_css_color(layer.fill.as_deref().unwrap_or(DEFAULT_SHAPE_FILL))
        .map_err(SceneError::layer)?;

    let (mut ctx, mut pixmap) = layer_canvas(extent, extent)?;
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(srgba_to_paint(fill));
    let path = Circle::new((radius, radius), radius).to_path(0.1);
    ctx.fill_path(&bezpath_to_cpu(&path));

    let rgba = finish_layer_canvas(ctx, &mut pixmap);
    let (left, top) = placed_corner(&layer.base, extent, extent);
    Ok(PsdLayerImage {
        name: layer
            .base
            .name
            .clone()
            .unwrap_or_else(|| "Shape Layer".to_string()),
        left,
        top,
        opacity: opacity_byte(&layer.base),
        width: extent as u32,
        height: extent as u32,
        rgba,
    })
}

/// A dedicated transparent canvas for one layer's pixels.
fn layer_canvas(w: f64, h: f64) -> SceneResult<(vello_cpu::RenderContext, vello_cpu::Pixmap)> {
    let width: u16 = (w as u32)
        .try_into()
        .map_err(|_| SceneError::layer("layer canvas width exceeds the supported pixel range"))?;
    let height: u16 = (h as u32)
        .try_into()
        .map_err(|_| SceneError::layer("layer canvas height exceeds the supported pixel range"))?;
    if width == 0 || height == 0 {
        return Err(SceneError::layer("layer canvas dimensions must be > 0"));
    }

    let pixmap = vello_cpu::Pixmap::new(width, height);
    let ctx = vello_cpu::RenderContext::new(width, height);
    Ok((ctx, pixmap))
}

/// Resolve the painted canvas into straight-alpha RGBA bytes.
fn finish_layer_canvas(mut ctx: vello_cpu::RenderContext, pixmap: &mut vello_cpu::Pixmap) -> Vec<u8> {
    ctx.flush();
    ctx.render_to_pixmap(pixmap);
    let mut rgba = pixmap.data_as_u8_slice().to_vec();
    unpremultiply_rgba8_in_place(&mut rgba);
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::model::LayerBase;

    #[test]
    fn placed_corner_compensates_center_origin() {
        let mut base = LayerBase::at(100.0, 60.0);
        assert_eq!(placed_corner(&base, 40.0, 20.0), (100, 60));
        base.origin_x = OriginX::Center;
        base.origin_y = OriginY::Center;
        assert_eq!(placed_corner(&base, 40.0, 20.0), (80, 50));
    }

    #[test]
    fn opacity_maps_to_container_range() {
        let mut base = LayerBase::at(0.0, 0.0);
        assert_eq!(opacity_byte(&base), 255);
        base.opacity = 0.9;
        assert_eq!(opacity_byte(&base), 230);
        base.opacity = -1.0;
        assert_eq!(opacity_byte(&base), 0);
    }
}
