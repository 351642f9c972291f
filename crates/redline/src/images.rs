//! Image XObjects.
//!
//! Figures in a rule book come in whatever encoding the typesetter picked;
//! the rasters of a composited document are always raw DeviceRGB samples.
//! Both are read through [`read_image`], which passes encoded streams
//! through untouched and turns raw samples (and CCITT fax data) into PNG.

use std::io::Cursor;

use lopdf::{Dictionary, Object};

use crate::parser::backend::{FormId, LopdfBackend, PageId};
use crate::types::ImageFormat;
use crate::RedlineError;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// An image read from a page, ready to be written to a file.
#[derive(Debug, Clone)]
pub struct ImageStream {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
    /// Pixel size from the stream dictionary, `0` when it does not say.
    pub width: u32,
    pub height: u32,
}

impl ImageStream {
    /// Resolution the encoded image declares for itself.
    pub fn declared_dpi(&self) -> Option<(f32, f32)> {
        match self.format {
            ImageFormat::Jpeg => jfif_density(&self.bytes),
            ImageFormat::Png => png_density(&self.bytes),
            _ => None,
        }
    }
}

/// Read the image XObject `name` from the resources of `page`, or of
/// `form` when the image was painted from inside one.
pub fn read_image(
    backend: &LopdfBackend,
    page: PageId,
    form: Option<FormId>,
    name: &[u8],
) -> Result<ImageStream, RedlineError> {
    let (_, stream) = backend
        .xobject_stream(page, form, name)
        .ok_or_else(|| RedlineError::ImageNotFound(String::from_utf8_lossy(name).into_owned()))?;
    let dict = &stream.dict;
    let (width, height) = Samples::size(dict).unwrap_or_default();
    let filter = first_filter(dict);

    // lopdf has no CCITT decoder; go from the raw stream.
    if filter == Some(b"CCITTFaxDecode".as_slice()) {
        if let Some(bytes) = ccitt_to_png(dict, &stream.content) {
            return Ok(ImageStream {
                format: ImageFormat::Png,
                bytes,
                width,
                height,
            });
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    let format = filter
        .and_then(filter_format)
        .unwrap_or_else(|| sniff_format(&data));

    if format != ImageFormat::Unknown {
        return Ok(ImageStream {
            format,
            bytes: data,
            width,
            height,
        });
    }

    match Samples::from_dict(dict).and_then(|s| s.to_png(&data)) {
        Some(bytes) => Ok(ImageStream {
            format: ImageFormat::Png,
            bytes,
            width,
            height,
        }),
        None => Ok(ImageStream {
            format,
            bytes: data,
            width,
            height,
        }),
    }
}

/// Guess an encoded image's format from its leading bytes.
pub fn sniff_format(bytes: &[u8]) -> ImageFormat {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => ImageFormat::Jpeg,
        b if b.starts_with(PNG_MAGIC) => ImageFormat::Png,
        [0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ', ..] => ImageFormat::Jpeg2000,
        b if b.starts_with(b"GIF87a") || b.starts_with(b"GIF89a") => ImageFormat::Gif,
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => ImageFormat::Tiff,
        [b'B', b'M', _, _, _, _, ..] => ImageFormat::Bmp,
        _ => ImageFormat::Unknown,
    }
}

fn filter_format(filter: &[u8]) -> Option<ImageFormat> {
    match filter {
        b"DCTDecode" => Some(ImageFormat::Jpeg),
        b"JPXDecode" => Some(ImageFormat::Jpeg2000),
        _ => None,
    }
}

/// `Filter` may be one name or an array of them; the first one decides.
fn first_filter(dict: &Dictionary) -> Option<&[u8]> {
    match dict.get(b"Filter").ok()? {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(filters) => filters.first()?.as_name().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorModel {
    fn channels(self) -> usize {
        match self {
            ColorModel::Gray => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }
}

/// Layout of uncompressed image samples.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Samples {
    width: u32,
    height: u32,
    bits: u8,
    model: ColorModel,
}

impl Samples {
    fn size(dict: &Dictionary) -> Option<(u32, u32)> {
        let dim = |key: &[u8]| {
            dict.get(key)
                .ok()
                .and_then(|o| o.as_i64().ok())
                .and_then(|v| u32::try_from(v).ok())
        };
        Some((dim(b"Width")?, dim(b"Height")?))
    }

    fn from_dict(dict: &Dictionary) -> Option<Self> {
        let (width, height) = Self::size(dict)?;
        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(8);
        let model = match dict.get(b"ColorSpace").ok()?.as_name().ok()? {
            b"DeviceGray" => ColorModel::Gray,
            b"DeviceRGB" => ColorModel::Rgb,
            b"DeviceCMYK" => ColorModel::Cmyk,
            _ => return None,
        };
        if !matches!(bits, 1 | 2 | 4 | 8) {
            return None;
        }
        Some(Self {
            width,
            height,
            bits,
            model,
        })
    }

    /// Bytes per row; rows of packed samples are padded to a whole byte.
    fn stride(&self) -> usize {
        (self.width as usize * self.model.channels() * self.bits as usize).div_ceil(8)
    }

    /// Widen packed samples to one byte each, scaled to `0..=255`.
    fn unpack(&self, data: &[u8]) -> Vec<u8> {
        if self.bits == 8 {
            return data.to_vec();
        }
        let per_row = self.width as usize * self.model.channels();
        let max = (1u16 << self.bits) - 1;
        let mut out = Vec::with_capacity(per_row * self.height as usize);

        for row in data.chunks(self.stride()).take(self.height as usize) {
            let samples = row.iter().flat_map(|&byte| {
                (0..8 / self.bits).map(move |i| {
                    let shift = 8 - self.bits * (i + 1);
                    (byte >> shift) as u16 & max
                })
            });
            out.extend(samples.take(per_row).map(|v| (v * 255 / max) as u8));
        }
        out
    }

    fn to_png(&self, data: &[u8]) -> Option<Vec<u8>> {
        if data.len() != self.stride() * self.height as usize {
            return None;
        }
        let samples = self.unpack(data);
        let image = match self.model {
            ColorModel::Gray => image::DynamicImage::ImageLuma8(image::GrayImage::from_raw(
                self.width,
                self.height,
                samples,
            )?),
            ColorModel::Rgb => image::DynamicImage::ImageRgb8(image::RgbImage::from_raw(
                self.width,
                self.height,
                samples,
            )?),
            ColorModel::Cmyk => image::DynamicImage::ImageRgb8(image::RgbImage::from_raw(
                self.width,
                self.height,
                cmyk_to_rgb(&samples),
            )?),
        };

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .ok()?;
        Some(png)
    }
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    cmyk.chunks_exact(4)
        .flat_map(|p| {
            let k = p[3] as u16;
            [p[0], p[1], p[2]].map(|c| 255u16.saturating_sub(c as u16 + k) as u8)
        })
        .collect()
}

/// Group 4 fax streams only. Returns `None` for anything else.
fn ccitt_to_png(dict: &Dictionary, raw: &[u8]) -> Option<Vec<u8>> {
    let params = match dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(d) => d,
        Object::Array(items) => items.first()?.as_dict().ok()?,
        _ => return None,
    };
    let int = |key: &[u8]| params.get(key).ok().and_then(|o| o.as_i64().ok());

    if int(b"K").unwrap_or(0) >= 0 {
        return None;
    }
    let columns = u16::try_from(int(b"Columns")?).ok()?;
    let rows = int(b"Rows").and_then(|v| u16::try_from(v).ok());

    let stride = (columns as usize).div_ceil(8);
    let mut bits = Vec::new();
    let mut height = 0u32;
    fax::decoder::decode_g4(raw.iter().copied(), columns, rows, |transitions| {
        bits.extend(pack_fax_row(transitions, columns));
        height += 1;
    })?;
    if height == 0 {
        return None;
    }

    // Fax rows mark black with 1; grayscale samples want black as 0.
    bits.iter_mut().for_each(|b| *b = !*b);
    debug_assert_eq!(bits.len(), stride * height as usize);

    Samples {
        width: columns as u32,
        height,
        bits: 1,
        model: ColorModel::Gray,
    }
    .to_png(&bits)
}

/// Alternating white/black run boundaries to a packed row, black bits set.
fn pack_fax_row(transitions: &[u16], width: u16) -> Vec<u8> {
    let mut row = vec![0u8; (width as usize).div_ceil(8)];
    let edges = transitions.iter().copied().chain(std::iter::once(width));
    let mut start = 0u16;
    let mut black = false;

    for end in edges {
        if black {
            for col in start..end.min(width) {
                row[col as usize / 8] |= 0x80 >> (col % 8);
            }
        }
        start = end;
        black = !black;
        if end >= width {
            break;
        }
    }
    row
}

fn jfif_density(bytes: &[u8]) -> Option<(f32, f32)> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let body = bytes.get(pos + 4..pos + 2 + len)?;

        match marker {
            0xE0 if body.len() >= 12 && body.starts_with(b"JFIF\0") => {
                let x = u16::from_be_bytes([body[8], body[9]]) as f32;
                let y = u16::from_be_bytes([body[10], body[11]]) as f32;
                return match body[7] {
                    _ if x == 0.0 || y == 0.0 => None,
                    1 => Some((x, y)),
                    2 => Some((x * 2.54, y * 2.54)),
                    _ => None,
                };
            }
            // Start of scan.
            0xDA => return None,
            _ => pos += 2 + len,
        }
    }
    None
}

fn png_density(bytes: &[u8]) -> Option<(f32, f32)> {
    let mut rest = bytes.strip_prefix(PNG_MAGIC)?;
    while rest.len() >= 8 {
        let len = u32::from_be_bytes(rest[..4].try_into().ok()?) as usize;
        let kind = &rest[4..8];
        let data = rest.get(8..8 + len)?;

        match kind {
            // Unit 1 is pixels per metre; 0 only gives an aspect ratio.
            b"pHYs" if data.len() >= 9 && data[8] == 1 => {
                let x = u32::from_be_bytes(data[..4].try_into().ok()?) as f32;
                let y = u32::from_be_bytes(data[4..8].try_into().ok()?) as f32;
                return Some((x * 0.0254, y * 0.0254));
            }
            b"pHYs" | b"IDAT" | b"IEND" => return None,
            _ => rest = rest.get(12 + len..)?,
        }
    }
    None
}
