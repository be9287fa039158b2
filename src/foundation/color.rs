//! sRGB color parsing and the hue-preserving contrast adjustment used when
//! placing brand-colored text over generated backgrounds.

/// Straight-alpha sRGB color with normalized 0..1 channels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Srgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Srgba {
    pub fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn opaque(r: f64, g: f64, b: f64) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Quantize to RGBA8 (straight alpha).
    pub fn to_rgba8(self) -> [u8; 4] {
        fn to_u8(x: f64) -> u8 {
            (x.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        [to_u8(self.r), to_u8(self.g), to_u8(self.b), to_u8(self.a)]
    }

    /// Format as `#rrggbb` (alpha is dropped, matching generated documents).
    pub fn to_hex(self) -> String {
        let [r, g, b, _] = self.to_rgba8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// Hue (0..360), saturation (0..100), lightness (0..100).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

/// Parse a CSS-style color: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(..)` or
/// `rgba(..)`.
pub fn parse_css_color(s: &str) -> Result<Srgba, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if s.starts_with("rgb(") || s.starts_with("rgba(") {
        return parse_rgb_fn(s);
    }
    Err(format!("unsupported color \"{s}\""))
}

fn parse_hex(hex: &str) -> Result<Srgba, String> {
    fn hex_byte(pair: &str) -> Result<u8, String> {
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    let (r, g, b, a) = match hex.len() {
        3 => {
            let expand = |c: &str| hex_byte(&format!("{c}{c}"));
            (
                expand(&hex[0..1])?,
                expand(&hex[1..2])?,
                expand(&hex[2..3])?,
                255,
            )
        }
        6 => (
            hex_byte(&hex[0..2])?,
            hex_byte(&hex[2..4])?,
            hex_byte(&hex[4..6])?,
            255,
        ),
        8 => (
            hex_byte(&hex[0..2])?,
            hex_byte(&hex[2..4])?,
            hex_byte(&hex[4..6])?,
            hex_byte(&hex[6..8])?,
        ),
        _ => return Err("hex color must be #rgb, #rrggbb or #rrggbbaa".to_owned()),
    };

    Ok(Srgba::rgba(
        f64::from(r) / 255.0,
        f64::from(g) / 255.0,
        f64::from(b) / 255.0,
        f64::from(a) / 255.0,
    ))
}

fn parse_rgb_fn(s: &str) -> Result<Srgba, String> {
    let inner = s
        .trim_start_matches("rgba")
        .trim_start_matches("rgb")
        .trim();
    let inner = inner
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(|| format!("malformed rgb() color \"{s}\""))?;

    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(format!("rgb() color must have 3 or 4 components: \"{s}\""));
    }

    let channel = |p: &str| -> Result<f64, String> {
        p.parse::<f64>()
            .map(|v| (v / 255.0).clamp(0.0, 1.0))
            .map_err(|_| format!("invalid rgb() component \"{p}\""))
    };

    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = if parts.len() == 4 {
        parts[3]
            .parse::<f64>()
            .map(|v| v.clamp(0.0, 1.0))
            .map_err(|_| format!("invalid alpha component \"{}\"", parts[3]))?
    } else {
        1.0
    };

    Ok(Srgba::rgba(r, g, b, a))
}

/// Standard sRGB -> HSL conversion.
pub fn rgb_to_hsl(c: Srgba) -> Hsl {
    let (r, g, b) = (c.r.clamp(0.0, 1.0), c.g.clamp(0.0, 1.0), c.b.clamp(0.0, 1.0));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return Hsl {
            h: 0.0,
            s: 0.0,
            l: l * 100.0,
        };
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let h = if max == r {
        ((g - b) / d + if g < b { 6.0 } else { 0.0 }) / 6.0
    } else if max == g {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    Hsl {
        h: h * 360.0,
        s: s * 100.0,
        l: l * 100.0,
    }
}

/// Standard HSL -> sRGB conversion (alpha fixed at 1).
pub fn hsl_to_rgb(hsl: Hsl) -> Srgba {
    let h = ((hsl.h % 360.0 + 360.0) % 360.0) / 360.0;
    let s = (hsl.s / 100.0).clamp(0.0, 1.0);
    let l = (hsl.l / 100.0).clamp(0.0, 1.0);

    if s == 0.0 {
        return Srgba::opaque(l, l, l);
    }

    fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            return p + (q - p) * 6.0 * t;
        }
        if t < 1.0 / 2.0 {
            return q;
        }
        if t < 2.0 / 3.0 {
            return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
        }
        p
    }

    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l + s - l * s
    };
    let p = 2.0 * l - q;

    Srgba::opaque(
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

/// Clamp a color's lightness for legibility against a light or dark region.
///
/// Hue and saturation are preserved so generated text stays on-brand. Over a
/// light region the lightness is clamped to at most 20%; over a dark region
/// to at least 85%.
pub fn adjust_for_contrast(color: Srgba, background_is_light: bool) -> Srgba {
    let mut hsl = rgb_to_hsl(color);
    if background_is_light {
        hsl.l = hsl.l.min(20.0);
    } else {
        hsl.l = hsl.l.max(85.0);
    }
    hsl_to_rgb(hsl)
}
