use crate::{
    animation::{self, Playback},
    capabilities::{DeviceProbe, reply_supports_sixel},
    error::{Error, Result},
    term_misc::EnvIdentifiers,
};
use color_quant::NeuQuant;
use image::{ImageFormat, RgbaImage};
use std::{
    collections::HashMap,
    io::{self, Write},
};
use tracing::{debug, warn};

const SIXEL_MIN: u8 = 0x3f; // '?'
const ALPHA_THRESHOLD: u8 = 128;

/// an image mapped onto a palette of at most 256 colors.
/// `None` pixels are transparent and left unpainted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: usize,
    pub height: usize,
    pub palette: Vec<[u8; 3]>,
    pub pixels: Vec<Option<u8>>,
}

/// encode image bytes into sixel graphics.
/// GIFs go through the animation player, everything else the `image` crate can decode is
/// printed as a single still image.
/// # example:
/// ```
/// use std::io::Cursor;
/// use termimg::animation::Playback;
/// use termimg::sixel_encoder::encode_image;
///
/// let mut png = Vec::new();
/// image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]))
///     .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
///     .unwrap();
///
/// let mut out = Vec::new();
/// encode_image(&png, &mut out, &Playback::default()).unwrap();
/// assert!(out.starts_with(b"\x1bP0;1q\"1;1;4;4"));
/// ```
pub fn encode_image(img: &[u8], mut out: impl Write, playback: &Playback) -> Result<()> {
    if image::guess_format(img).is_ok_and(|f| f == ImageFormat::Gif) {
        debug!("gif input, using the animation player");
        let frames = animation::play(img, out, playback)?;
        debug!(frames, "animation finished");
        return Ok(());
    }

    let dyn_img = image::load_from_memory(img)?;
    encode_rgba(&dyn_img.to_rgba8(), &mut out)?;
    out.flush()?;
    Ok(())
}

/// quantizes and prints a single rgba raster
pub fn encode_rgba(img: &RgbaImage, out: &mut impl Write) -> Result<()> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::EmptyImage);
    }
    let indexed = quantize(img);
    write_sixel(out, &indexed)?;
    Ok(())
}

/// checks if the current terminal supports Sixel's graphic protocol.
/// some terminals are known outright, for the ambiguous ones the terminal is asked.
pub fn is_sixel_capable(env: &EnvIdentifiers, probe: &mut dyn DeviceProbe) -> bool {
    if env.equals("TERM_PROGRAM", "macterm") {
        return true;
    }

    match env.get("TERM") {
        Some("mlterm" | "yaft-256color" | "foot") => true,
        Some("st-256color" | "xterm" | "xterm-256color") => match probe.device_attributes() {
            Ok(reply) => {
                debug!(?reply, "device attributes");
                reply_supports_sixel(&reply)
            }
            Err(err) => {
                warn!(%err, "sixel probe failed, assuming no sixel support");
                false
            }
        },
        _ => false,
    }
}

/// reduces an rgba image into at most 256 colors.
/// images that already fit in 256 colors keep them exactly, the rest go through NeuQuant.
pub fn quantize(img: &RgbaImage) -> IndexedImage {
    let width = img.width() as usize;
    let height = img.height() as usize;

    if let Some(exact) = exact_palette(img) {
        return exact;
    }

    let opaque: Vec<u8> = img
        .pixels()
        .filter(|p| p[3] >= ALPHA_THRESHOLD)
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect();

    let nq = NeuQuant::new(10, 256, &opaque);
    let palette = nq
        .color_map_rgb()
        .chunks(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();
    let pixels = img
        .pixels()
        .map(|p| (p[3] >= ALPHA_THRESHOLD).then(|| nq.index_of(&[p[0], p[1], p[2], 255]) as u8))
        .collect();

    IndexedImage {
        width,
        height,
        palette,
        pixels,
    }
}

// None when the opaque pixels use more than 256 colors
fn exact_palette(img: &RgbaImage) -> Option<IndexedImage> {
    let mut palette: Vec<[u8; 3]> = Vec::new();
    let mut lookup: HashMap<[u8; 3], u8> = HashMap::new();
    let mut pixels = Vec::with_capacity(img.width() as usize * img.height() as usize);

    for p in img.pixels() {
        if p[3] < ALPHA_THRESHOLD {
            pixels.push(None);
            continue;
        }
        let rgb = [p[0], p[1], p[2]];
        let idx = match lookup.get(&rgb) {
            Some(&idx) => idx,
            None => {
                if palette.len() == 256 {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push(rgb);
                lookup.insert(rgb, idx);
                idx
            }
        };
        pixels.push(Some(idx));
    }

    if palette.is_empty() {
        palette.push([0, 0, 0]);
    }
    Some(IndexedImage {
        width: img.width() as usize,
        height: img.height() as usize,
        palette,
        pixels,
    })
}

/// writes a full DCS sixel sequence for an indexed image
pub fn write_sixel<W: Write>(out: &mut W, img: &IndexedImage) -> io::Result<()> {
    let width = img.width;
    let height = img.height;
    let palette_size = img.palette.len();
    let mut buf = Vec::with_capacity(width * height / 2 + palette_size * 16);

    // DECSIXEL introducer, P2=1 keeps unpainted pixels transparent, then raster attributes
    write!(buf, "\x1bP0;1q\"1;1;{};{}", width, height)?;

    for (i, &[r, g, b]) in img.palette.iter().enumerate() {
        write!(buf, "#{};2;{};{};{}", i, percent(r), percent(g), percent(b))?;
    }

    let mut color_used = vec![false; palette_size];
    let mut sixel_data = vec![0u8; width * palette_size];

    // Process the image in 6-pixel strips
    let sixel_rows = height.div_ceil(6);
    for row in 0..sixel_rows {
        // Graphics NL
        if row > 0 {
            buf.push(b'-');
        }

        color_used.fill(false);
        sixel_data.fill(0);

        for p in 0..6 {
            let y = (row * 6) + p;
            if y >= height {
                break;
            }

            for x in 0..width {
                let Some(color_idx) = img.pixels[y * width + x] else {
                    continue;
                };
                let color_idx = color_idx as usize;
                color_used[color_idx] = true;
                sixel_data[(width * color_idx) + x] |= 1 << p;
            }
        }

        let mut first_color_written = false;
        for n in 0..palette_size {
            if !color_used[n] {
                continue;
            }

            // Graphics CR
            if first_color_written {
                buf.push(b'$');
            }

            write!(buf, "#{}", n)?;

            let mut rle_count = 0;
            let mut prev_sixel = None;

            for x in 0..width {
                let next_sixel = sixel_data[(n * width) + x];

                if let Some(prev) = prev_sixel
                    && next_sixel != prev
                {
                    write_gri(&mut buf, rle_count, prev)?;
                    rle_count = 0;
                }

                prev_sixel = Some(next_sixel);
                rle_count += 1;
            }

            if let Some(prev) = prev_sixel {
                write_gri(&mut buf, rle_count, prev)?;
            }

            first_color_written = true;
        }
    }

    buf.extend_from_slice(b"\x1b\\");
    out.write_all(&buf)
}

fn percent(channel: u8) -> u32 {
    (channel as u32 * 100 + 127) / 255
}

// Graphics Repeat Introducer encoding
fn write_gri<W: Write>(out: &mut W, repeat_count: usize, sixel: u8) -> io::Result<()> {
    if repeat_count == 0 {
        return Ok(());
    }

    let sixel = SIXEL_MIN + (sixel & 0b111111);

    if repeat_count > 3 {
        write!(out, "!{}{}", repeat_count, sixel as char)?;
    } else {
        for _ in 0..repeat_count {
            out.write_all(&[sixel])?;
        }
    }

    Ok(())
}
