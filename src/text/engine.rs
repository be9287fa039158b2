//! Shaping, measurement and word-wrap.
//!
//! One engine instance serves both the wrap pass (measuring candidate
//! lines) and the paint pass (shaping the final lines into glyph runs).
//! Routing both through the same shaping contexts is what keeps line breaks
//! identical between measurement and painting; there is no second metrics
//! source to drift from.

use std::borrow::Cow;
use std::path::Path;

use parley::style::{FontStack, StyleProperty};

/// RGBA8 brush color carried through parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Resolved styling for one text block.
#[derive(Clone, Debug)]
pub struct TextStyle {
    /// Comma-separated family stack, already script-resolved.
    pub family_stack: String,
    /// Font size in pixels (layer `fontSize` x `scaleX`).
    pub size: f32,
    /// CSS-style numeric weight.
    pub weight: f32,
    pub italic: bool,
}

/// Width measurement used by the wrap pass.
///
/// The production implementation shapes through [`TextEngine`]; tests use
/// synthetic fixed-advance metrics to pin down the wrap algorithm itself.
pub trait MeasureText {
    fn measure(&mut self, line: &str) -> f64;
}

/// A wrapped text block: final lines plus their measured widths.
#[derive(Clone, Debug)]
pub struct WrappedBlock {
    pub lines: Vec<String>,
    pub line_widths: Vec<f64>,
    pub max_line_width: f64,
}

/// Greedy whitespace word-wrap.
///
/// Words are packed into a line while the measured width stays within
/// `max_width`; a break is forced when the next word would overflow, unless
/// the line is still empty: an overlong single word is placed alone on its
/// own line rather than dropped. Explicit newlines always break.
pub fn wrap_lines<M: MeasureText>(measure: &mut M, text: &str, max_width: f64) -> Vec<String> {
    let mut result = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split(' ') {
            let test = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if measure.measure(&test) > max_width && !current.is_empty() {
                result.push(std::mem::take(&mut current));
                current = word.to_string();
            } else {
                current = test;
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    result
}

/// Font and layout contexts shared by measurement and painting.
pub struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine {
    /// Engine over the system font collection.
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Engine over the system collection plus every font file found
    /// directly in `dir` (servers ship Noto Sans CJK faces this way).
    pub fn with_fonts_dir(dir: &Path) -> Self {
        let mut engine = Self::new();
        engine.load_fonts_from_dir(dir);
        engine
    }

    /// Register all `.ttf`/`.otf`/`.ttc` files in `dir`. Unreadable files
    /// are ignored.
    pub fn load_fonts_from_dir(&mut self, dir: &Path) {
        let Ok(rd) = std::fs::read_dir(dir) else {
            return;
        };

        for entry in rd.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if ext != "ttf" && ext != "otf" && ext != "ttc" {
                continue;
            }
            if let Ok(bytes) = std::fs::read(&path) {
                self.register_font_bytes(bytes);
            }
        }
    }

    /// Register an in-memory font face.
    pub fn register_font_bytes(&mut self, bytes: Vec<u8>) {
        let _ = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes), None);
    }

    /// Shape a single line (no width constraint) into a layout ready for
    /// glyph-run painting.
    pub fn shape_line(
        &mut self,
        line: &str,
        style: &TextStyle,
        brush: TextBrush,
    ) -> parley::Layout<TextBrush> {
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, line, 1.0, true);
        builder.push_default(StyleProperty::FontStack(FontStack::Source(Cow::Owned(
            style.family_stack.clone(),
        ))));
        builder.push_default(StyleProperty::FontSize(style.size));
        builder.push_default(StyleProperty::FontWeight(parley::style::FontWeight::new(
            style.weight,
        )));
        if style.italic {
            builder.push_default(StyleProperty::FontStyle(parley::style::FontStyle::Italic));
        }
        builder.push_default(StyleProperty::Brush(brush));

        let mut layout = builder.build(line);
        layout.break_all_lines(None);
        layout
    }

    /// Advance width of a single line under `style`.
    pub fn measure_line(&mut self, line: &str, style: &TextStyle) -> f64 {
        f64::from(self.shape_line(line, style, TextBrush::default()).width())
    }

    /// Wrap `text` to `max_width` and measure the final lines.
    pub fn wrap_block(&mut self, text: &str, style: &TextStyle, max_width: f64) -> WrappedBlock {
        let lines = {
            let mut measurer = EngineMeasurer {
                engine: self,
                style,
            };
            wrap_lines(&mut measurer, text, max_width)
        };
        let line_widths: Vec<f64> = lines
            .iter()
            .map(|line| self.measure_line(line, style))
            .collect();
        let max_line_width = line_widths.iter().copied().fold(0.0, f64::max);
        WrappedBlock {
            lines,
            line_widths,
            max_line_width,
        }
    }
}

/// [`MeasureText`] implementation backed by a [`TextEngine`].
pub struct EngineMeasurer<'a> {
    pub engine: &'a mut TextEngine,
    pub style: &'a TextStyle,
}

impl MeasureText for EngineMeasurer<'_> {
    fn measure(&mut self, line: &str) -> f64 {
        self.engine.measure_line(line, self.style)
    }
}
