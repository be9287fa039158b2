//! Minimal Photoshop (PSD) container writer.
//!
//! Emits an 8-bit RGB document with one named, positioned, independently
//! editable raster layer per input buffer, RLE (PackBits) compressed
//! channel data, and a raw flattened composite so viewers without layer
//! support still show the creative. Big-endian throughout, per the format.

use crate::{
    foundation::core::CanvasSize,
    foundation::error::{SceneError, SceneResult},
};

/// One rasterized layer destined for the container.
#[derive(Clone, Debug)]
pub struct PsdLayerImage {
    pub name: String,
    pub left: i32,
    pub top: i32,
    /// 0-255; mapped from the scene layer's 0..1 opacity.
    pub opacity: u8,
    pub width: u32,
    pub height: u32,
    /// Straight-alpha RGBA8, row-major, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// Serialize a layered document at the given canvas size.
pub fn write_psd(size: CanvasSize, layers: &[PsdLayerImage]) -> SceneResult<Vec<u8>> {
    for layer in layers {
        if layer.width == 0 || layer.height == 0 {
            return Err(SceneError::render(format!(
                "psd layer '{}' has a degenerate size",
                layer.name
            )));
        }
        if layer.rgba.len() != layer.width as usize * layer.height as usize * 4 {
            return Err(SceneError::render(format!(
                "psd layer '{}' pixel buffer length mismatch",
                layer.name
            )));
        }
    }
    if layers.len() > i16::MAX as usize {
        return Err(SceneError::render("too many psd layers"));
    }

    let mut out = Vec::new();

    // File header.
    out.extend_from_slice(b"8BPS");
    push_u16(&mut out, 1);
    out.extend_from_slice(&[0u8; 6]);
    push_u16(&mut out, 4); // composite channels: RGBA
    push_u32(&mut out, size.height);
    push_u32(&mut out, size.width);
    push_u16(&mut out, 8); // bits per channel
    push_u16(&mut out, 3); // RGB color mode

    // Color mode data and image resources: both empty.
    push_u32(&mut out, 0);
    push_u32(&mut out, 0);

    // Layer and mask information.
    let layer_info = encode_layer_info(layers);
    push_u32(&mut out, (layer_info.len() + 4) as u32);
    out.extend_from_slice(&layer_info);
    push_u32(&mut out, 0); // global layer mask info: empty

    // Flattened composite, raw, planar RGBA.
    push_u16(&mut out, 0);
    let composite = composite_over_white(size, layers);
    for plane in split_planes(&composite) {
        out.extend_from_slice(&plane);
    }

    Ok(out)
}

fn encode_layer_info(layers: &[PsdLayerImage]) -> Vec<u8> {
    let mut records = Vec::new();
    let mut channel_data = Vec::new();

    for layer in layers {
        let planes = split_planes(&layer.rgba);
        // Channel order: R, G, B, then transparency (-1).
        let ids: [i16; 4] = [0, 1, 2, -1];
        let encoded: Vec<Vec<u8>> = planes
            .iter()
            .map(|plane| rle_encode_plane(plane, layer.width as usize, layer.height as usize))
            .collect();

        push_i32(&mut records, layer.top);
        push_i32(&mut records, layer.left);
        push_i32(&mut records, layer.top + layer.height as i32);
        push_i32(&mut records, layer.left + layer.width as i32);
        push_u16(&mut records, 4);
        for (id, data) in ids.iter().zip(&encoded) {
            push_i16(&mut records, *id);
            push_u32(&mut records, data.len() as u32);
        }
        records.extend_from_slice(b"8BIM");
        records.extend_from_slice(b"norm");
        records.push(layer.opacity);
        records.push(0); // clipping: base
        records.push(0); // flags: visible
        records.push(0); // filler

        let name = pascal_name(&layer.name);
        push_u32(&mut records, (4 + 4 + name.len()) as u32);
        push_u32(&mut records, 0); // layer mask data: none
        push_u32(&mut records, 0); // blending ranges: none
        records.extend_from_slice(&name);

        for data in encoded {
            channel_data.extend_from_slice(&data);
        }
    }

    let mut info = Vec::new();
    push_i16(&mut info, layers.len() as i16);
    info.extend_from_slice(&records);
    info.extend_from_slice(&channel_data);
    if info.len() % 2 == 1 {
        info.push(0);
    }

    let mut out = Vec::with_capacity(info.len() + 4);
    push_u32(&mut out, info.len() as u32);
    out.extend_from_slice(&info);
    out
}

/// Pascal name string padded to a multiple of 4 (length byte included).
fn pascal_name(name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let len = bytes.len().min(255);
    let mut out = Vec::with_capacity(len + 4);
    out.push(len as u8);
    out.extend_from_slice(&bytes[..len]);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

/// One channel's RLE section: compression tag, per-row byte counts, rows.
fn rle_encode_plane(plane: &[u8], width: usize, height: usize) -> Vec<u8> {
    let rows: Vec<Vec<u8>> = (0..height)
        .map(|y| packbits(&plane[y * width..(y + 1) * width]))
        .collect();

    let mut out = Vec::new();
    push_u16(&mut out, 1); // RLE
    for row in &rows {
        push_u16(&mut out, row.len() as u16);
    }
    for row in rows {
        out.extend_from_slice(&row);
    }
    out
}

/// PackBits: runs of 2..=128 identical bytes become `(1 - run)` + byte;
/// literal segments of up to 128 bytes become `(len - 1)` + bytes.
fn packbits(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let n = row.len();
    let mut i = 0;

    while i < n {
        let mut run = 1;
        while i + run < n && row[i + run] == row[i] && run < 128 {
            run += 1;
        }
        if run >= 2 {
            out.push((1i16 - run as i16) as u8);
            out.push(row[i]);
            i += run;
            continue;
        }

        let start = i;
        i += 1;
        while i < n && (i - start) < 128 {
            if i + 1 < n && row[i] == row[i + 1] {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&row[start..i]);
    }

    out
}

/// Split interleaved RGBA into four planes.
fn split_planes(rgba: &[u8]) -> [Vec<u8>; 4] {
    let count = rgba.len() / 4;
    let mut planes = [
        Vec::with_capacity(count),
        Vec::with_capacity(count),
        Vec::with_capacity(count),
        Vec::with_capacity(count),
    ];
    for px in rgba.chunks_exact(4) {
        planes[0].push(px[0]);
        planes[1].push(px[1]);
        planes[2].push(px[2]);
        planes[3].push(px[3]);
    }
    planes
}

/// Flatten all layers over an opaque white canvas (straight alpha).
fn composite_over_white(size: CanvasSize, layers: &[PsdLayerImage]) -> Vec<u8> {
    let (w, h) = (size.width as usize, size.height as usize);
    let mut canvas = vec![255u8; w * h * 4];

    for layer in layers {
        for y in 0..layer.height as usize {
            let dy = layer.top + y as i32;
            if dy < 0 || dy >= h as i32 {
                continue;
            }
            for x in 0..layer.width as usize {
                let dx = layer.left + x as i32;
                if dx < 0 || dx >= w as i32 {
                    continue;
                }

                let src = &layer.rgba[(y * layer.width as usize + x) * 4..][..4];
                let sa = u32::from(src[3]) * u32::from(layer.opacity) / 255;
                if sa == 0 {
                    continue;
                }

                let di = (dy as usize * w + dx as usize) * 4;
                for c in 0..3 {
                    let s = u32::from(src[c]);
                    let d = u32::from(canvas[di + c]);
                    canvas[di + c] = ((s * sa + d * (255 - sa) + 127) / 255) as u8;
                }
            }
        }
    }

    canvas
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpackbits(data: &[u8], expect: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(expect);
        let mut i = 0;
        while i < data.len() && out.len() < expect {
            let header = data[i] as i8;
            i += 1;
            if header >= 0 {
                let len = header as usize + 1;
                out.extend_from_slice(&data[i..i + len]);
                i += len;
            } else if header != -128 {
                let len = 1 - header as isize;
                out.extend(std::iter::repeat_n(data[i], len as usize));
                i += 1;
            }
        }
        out
    }

    fn read_u32(data: &[u8], at: usize) -> u32 {
        u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
    }

    fn read_u16(data: &[u8], at: usize) -> u16 {
        u16::from_be_bytes(data[at..at + 2].try_into().unwrap())
    }

    #[test]
    fn packbits_roundtrips() {
        let rows: &[&[u8]] = &[
            b"",
            b"a",
            b"aaaaaaa",
            b"abcdefg",
            b"aabbbbccd",
            &[7u8; 300],
            &(0u8..=255).collect::<Vec<_>>(),
        ];
        for row in rows {
            let packed = packbits(row);
            assert_eq!(&unpackbits(&packed, row.len()), row);
        }
    }

    #[test]
    fn packbits_compresses_runs() {
        let packed = packbits(&[9u8; 128]);
        assert_eq!(packed, vec![0x81, 9]);
    }

    fn canvas_size() -> CanvasSize {
        CanvasSize {
            width: 4,
            height: 2,
        }
    }

    #[test]
    fn empty_document_header_and_sections() {
        let psd = write_psd(canvas_size(), &[]).unwrap();

        assert_eq!(&psd[0..4], b"8BPS");
        assert_eq!(read_u16(&psd, 4), 1); // version
        assert_eq!(read_u16(&psd, 12), 4); // channels
        assert_eq!(read_u32(&psd, 14), 2); // height
        assert_eq!(read_u32(&psd, 18), 4); // width
        assert_eq!(read_u16(&psd, 22), 8); // depth
        assert_eq!(read_u16(&psd, 24), 3); // RGB

        // Color mode data and image resources are empty.
        assert_eq!(read_u32(&psd, 26), 0);
        assert_eq!(read_u32(&psd, 30), 0);

        // Layer section: length field + zero layer count + global mask.
        let layer_section_len = read_u32(&psd, 34) as usize;
        let layer_count = read_u16(&psd, 38 + 4) as i16;
        assert_eq!(layer_count, 0);

        // Composite: raw compression then 4 planes of w*h.
        let composite_at = 38 + layer_section_len;
        assert_eq!(read_u16(&psd, composite_at), 0);
        assert_eq!(psd.len(), composite_at + 2 + 4 * 4 * 2);
        // All-white flattened image.
        assert!(psd[composite_at + 2..].iter().all(|&b| b == 255));
    }

    #[test]
    fn single_layer_record_fields() {
        let layer = PsdLayerImage {
            name: "CTA".to_string(),
            left: 3,
            top: -1,
            opacity: 200,
            width: 2,
            height: 2,
            rgba: vec![
                255, 0, 0, 255, 255, 0, 0, 255, //
                255, 0, 0, 255, 255, 0, 0, 255,
            ],
        };
        let psd = write_psd(canvas_size(), &[layer]).unwrap();

        let layer_count_at = 38 + 4;
        assert_eq!(read_u16(&psd, layer_count_at) as i16, 1);

        let rec = layer_count_at + 2;
        assert_eq!(read_u32(&psd, rec) as i32, -1); // top
        assert_eq!(read_u32(&psd, rec + 4) as i32, 3); // left
        assert_eq!(read_u32(&psd, rec + 8) as i32, 1); // bottom
        assert_eq!(read_u32(&psd, rec + 12) as i32, 5); // right
        assert_eq!(read_u16(&psd, rec + 16), 4); // channel count

        // 4 channel infos of 6 bytes each, then the blend signature.
        let blend_at = rec + 18 + 4 * 6;
        assert_eq!(&psd[blend_at..blend_at + 4], b"8BIM");
        assert_eq!(&psd[blend_at + 4..blend_at + 8], b"norm");
        assert_eq!(psd[blend_at + 8], 200); // opacity
        assert_eq!(psd[blend_at + 10], 0); // visible

        // Pascal name, padded to 4: 1 length byte + "CTA".
        let extra_at = blend_at + 12;
        let extra_len = read_u32(&psd, extra_at) as usize;
        assert_eq!(extra_len, 4 + 4 + 4);
        assert_eq!(psd[extra_at + 12], 3);
        assert_eq!(&psd[extra_at + 13..extra_at + 16], b"CTA");
    }

    #[test]
    fn composite_blends_layer_over_white() {
        let layer = PsdLayerImage {
            name: "chip".to_string(),
            left: 0,
            top: 0,
            opacity: 255,
            width: 1,
            height: 1,
            rgba: vec![0, 0, 0, 128],
        };
        let composite = composite_over_white(canvas_size(), &[layer]);
        // 50% black over white: mid gray; untouched pixels stay white.
        assert!((composite[0] as i32 - 127).abs() <= 1);
        assert_eq!(composite[7], 255);
    }

    #[test]
    fn rejects_mismatched_pixel_buffers() {
        let bad = PsdLayerImage {
            name: "bad".to_string(),
            left: 0,
            top: 0,
            opacity: 255,
            width: 2,
            height: 2,
            rgba: vec![0; 4],
        };
        assert!(write_psd(canvas_size(), &[bad]).is_err());
    }
}
