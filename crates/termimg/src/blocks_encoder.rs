use std::io::Write;

use image::RgbaImage;

use crate::{config::RenderConfig, error::Result, image_extended::FitImage, term_misc};

const ALPHA_THRESHOLD: u8 = 128;

/// Renders an image as colored half-blocks, two pixel rows per text row.
///
/// The image is shrunk to fit the width hint (in cells) or the terminal width, and the height
/// hint (in cells) when one is given. Transparent pixels print as blank cells.
///
/// # Example
/// ```
/// use std::io::Cursor;
/// use termimg::blocks_encoder::encode_image;
/// use termimg::config::RenderConfig;
///
/// let mut png = Vec::new();
/// image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
///     .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
///     .unwrap();
///
/// let mut out = Vec::new();
/// encode_image(&png, &mut out, &RenderConfig::default(), false).unwrap();
/// assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), 1);
/// ```
pub fn encode_image(
    img: &[u8],
    mut out: impl Write,
    config: &RenderConfig,
    output_is_tty: bool,
) -> Result<()> {
    let image = image::load_from_memory(img)?;

    let columns = match config.width {
        Some(w) => w.get(),
        None => term_misc::winsize_or_default(output_is_tty).columns as u32,
    };
    let rows = config
        .height
        .map(|h| h.get().saturating_mul(2))
        .unwrap_or(u32::MAX / 4);
    let rgba = image.fit_into(columns, rows, config.preserve_aspect_ratio)?;

    write_blocks(&rgba, &mut out)?;
    out.flush()?;
    Ok(())
}

fn write_blocks(img: &RgbaImage, out: &mut impl Write) -> Result<()> {
    let w = img.width();
    let h = img.height();
    let mut buf = Vec::with_capacity((w * h) as usize * 20);

    for y in (0..h).step_by(2) {
        for x in 0..w {
            let upper = img.get_pixel(x, y);
            let lower = (y + 1 < h).then(|| img.get_pixel(x, y + 1));

            let upper_visible = upper[3] >= ALPHA_THRESHOLD;
            let lower_visible = lower.is_some_and(|p| p[3] >= ALPHA_THRESHOLD);

            match (upper_visible, lower) {
                (true, Some(l)) if lower_visible => write!(
                    buf,
                    "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m▀",
                    upper[0], upper[1], upper[2], l[0], l[1], l[2]
                )?,
                (true, _) => write!(
                    buf,
                    "\x1b[38;2;{};{};{}m\x1b[49m▀",
                    upper[0], upper[1], upper[2]
                )?,
                (false, Some(l)) if lower_visible => {
                    write!(buf, "\x1b[0m\x1b[38;2;{};{};{}m▄", l[0], l[1], l[2])?
                }
                _ => buf.extend_from_slice(b"\x1b[0m "),
            }
        }
        buf.extend_from_slice(b"\x1b[0m\n");
    }

    out.write_all(&buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn png(img: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_two_pixel_rows_per_line() {
        let mut img = RgbaImage::from_pixel(1, 3, Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        let mut out = Vec::new();
        write_blocks(&img, &mut out).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert_eq!(
            s,
            "\x1b[38;2;255;0;0m\x1b[48;2;0;0;255m▀\x1b[0m\n\x1b[38;2;255;0;0m\x1b[49m▀\x1b[0m\n"
        );
    }

    #[test]
    fn test_transparent_cells() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 1, Rgba([0, 255, 0, 255]));
        let mut out = Vec::new();
        write_blocks(&img, &mut out).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert_eq!(s, "\x1b[0m \x1b[0m\x1b[38;2;0;255;0m▄\x1b[0m\n");
    }

    #[test]
    fn test_width_hint_shrinks() {
        let img = RgbaImage::from_pixel(40, 20, Rgba([9, 9, 9, 255]));
        let cfg = RenderConfig::default().with_width(10).unwrap();
        let mut out = Vec::new();
        encode_image(&png(&img), &mut out, &cfg, false).unwrap();
        let s = String::from_utf8(out).unwrap();
        // 10x5 pixels -> 3 lines of 10 cells
        assert_eq!(s.lines().count(), 3);
        assert_eq!(s.lines().next().unwrap().matches('▀').count(), 10);
    }

    #[test]
    fn test_default_width_is_terminal_fallback() {
        let img = RgbaImage::from_pixel(200, 2, Rgba([9, 9, 9, 255]));
        let mut out = Vec::new();
        encode_image(&png(&img), &mut out, &RenderConfig::default(), false).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert_eq!(s.lines().next().unwrap().matches('▀').count(), 80);
    }
}
