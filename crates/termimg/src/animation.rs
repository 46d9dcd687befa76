//! Sixel playback of animated GIFs.
//!
//! Frames are drawn in place: rows are reserved below the cursor once, the cursor position is
//! saved, and every frame restores it before printing.

use std::{
    io::{Cursor, Write},
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use image::{AnimationDecoder, RgbaImage, codecs::gif::GifDecoder};
use tracing::debug;

use crate::{
    error::{Error, Result},
    sixel_encoder::{self, IndexedImage},
    term_misc::{self, RESTORE_CURSOR, SAVE_CURSOR, Winsize},
};

/// how an animation is played
#[derive(Debug, Default, Clone, Copy)]
pub struct Playback<'a> {
    /// whether the output stream is a terminal, the window size is only queried if it is
    pub output_is_tty: bool,
    /// raised from the outside to stop playing, checked before every frame
    pub stop: Option<&'a AtomicBool>,
    /// known window size, queried from the output when absent
    pub winsize: Option<Winsize>,
}

impl Playback<'_> {
    fn should_stop(&self) -> bool {
        self.stop.is_some_and(|s| s.load(Ordering::Relaxed))
    }

    fn winsize(&self) -> Winsize {
        self.winsize
            .unwrap_or_else(|| term_misc::winsize_or_default(self.output_is_tty))
    }
}

/// how many times the whole frame sequence is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Infinite,
    Finite(u16),
}

impl LoopCount {
    /// 0 means forever, like the NETSCAPE2.0 extension
    pub fn from_gif(count: u16) -> Self {
        match count {
            0 => LoopCount::Infinite,
            n => LoopCount::Finite(n),
        }
    }
}

/// the parts of a GIF the `image` decoder doesn't expose
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GifMeta {
    pub width: u16,
    pub height: u16,
    pub background_index: u8,
    pub global_palette: Option<Vec<[u8; 3]>>,
    pub loop_count: LoopCount,
}

impl Default for GifMeta {
    fn default() -> Self {
        GifMeta {
            width: 0,
            height: 0,
            background_index: 0,
            global_palette: None,
            loop_count: LoopCount::Finite(1),
        }
    }
}

impl GifMeta {
    /// reads the logical screen descriptor, the global color table and the loop count.
    /// anything malformed leaves the defaults in place, decoding errors are left for the decoder
    /// to report.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut meta = GifMeta::default();
        if bytes.len() < 13 || !(bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")) {
            return meta;
        }

        meta.width = u16::from_le_bytes([bytes[6], bytes[7]]);
        meta.height = u16::from_le_bytes([bytes[8], bytes[9]]);
        let packed = bytes[10];
        meta.background_index = bytes[11];

        let mut pos = 13;
        if packed & 0x80 != 0 {
            let len = 3 * (1usize << ((packed & 0x07) + 1));
            let Some(table) = bytes.get(pos..pos + len) else {
                return meta;
            };
            meta.global_palette = Some(table.chunks(3).map(|c| [c[0], c[1], c[2]]).collect());
            pos += len;
        }

        if let Some(count) = find_loop_count(bytes, pos) {
            meta.loop_count = LoopCount::from_gif(count);
        }
        meta
    }

    /// the declared background color, if there is a global palette to take it from
    pub fn background(&self) -> Option<[u8; 3]> {
        self.global_palette
            .as_ref()?
            .get(self.background_index as usize)
            .copied()
    }
}

// walks the block structure looking for a NETSCAPE2.0 / ANIMEXTS1.0 extension
fn find_loop_count(bytes: &[u8], mut pos: usize) -> Option<u16> {
    loop {
        match *bytes.get(pos)? {
            // extension
            0x21 => {
                let label = *bytes.get(pos + 1)?;
                pos += 2;
                if label == 0xff {
                    let size = *bytes.get(pos)? as usize;
                    let app = bytes.get(pos + 1..pos + 1 + size)?;
                    pos += 1 + size;
                    if app == b"NETSCAPE2.0" || app == b"ANIMEXTS1.0" {
                        let sub = bytes.get(pos..pos + 4)?;
                        if sub[0] >= 3 && sub[1] == 1 {
                            return Some(u16::from_le_bytes([sub[2], sub[3]]));
                        }
                    }
                }
                pos = skip_sub_blocks(bytes, pos)?;
            }
            // image descriptor
            0x2c => {
                let packed = *bytes.get(pos + 9)?;
                pos += 10;
                if packed & 0x80 != 0 {
                    pos += 3 * (1usize << ((packed & 0x07) + 1));
                }
                // lzw minimum code size
                pos += 1;
                pos = skip_sub_blocks(bytes, pos)?;
            }
            _ => return None,
        }
    }
}

fn skip_sub_blocks(bytes: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let size = *bytes.get(pos)? as usize;
        pos += 1;
        if size == 0 {
            return Some(pos);
        }
        pos += size;
    }
}

/// the 216 color web safe palette, red major
pub fn web_safe_palette() -> Vec<[u8; 3]> {
    let mut palette = Vec::with_capacity(216);
    for r in 0..6u8 {
        for g in 0..6u8 {
            for b in 0..6u8 {
                palette.push([r * 0x33, g * 0x33, b * 0x33]);
            }
        }
    }
    palette
}

/// index of the closest web safe color
pub fn web_safe_index([r, g, b]: [u8; 3]) -> u8 {
    let level = |c: u8| (c as u16 + 25) / 51;
    (level(r) * 36 + level(g) * 6 + level(b)) as u8
}

/// draws a frame onto a web safe canvas.
/// the canvas starts filled with `background` (or transparent), opaque frame pixels go on top.
pub fn composite(frame: &RgbaImage, background: Option<[u8; 3]>, palette: &[[u8; 3]]) -> IndexedImage {
    let fill = background.map(web_safe_index);
    let pixels = frame
        .pixels()
        .map(|p| {
            if p[3] == 0 {
                fill
            } else {
                Some(web_safe_index([p[0], p[1], p[2]]))
            }
        })
        .collect();

    IndexedImage {
        width: frame.width() as usize,
        height: frame.height() as usize,
        palette: palette.to_vec(),
        pixels,
    }
}

struct DecodedFrame {
    canvas: IndexedImage,
    delay: Duration,
}

/// plays a GIF with sixel graphics, returns how many frames were printed.
/// a single frame GIF is printed once, like a still image.
pub fn play(img: &[u8], mut out: impl Write, playback: &Playback) -> Result<usize> {
    let decoder = GifDecoder::new(Cursor::new(img))?;
    let frames = decoder.into_frames().collect_frames()?;
    let meta = GifMeta::parse(img);

    let Some(first) = frames.first() else {
        return Err(Error::EmptyImage);
    };
    if frames.len() == 1 {
        sixel_encoder::encode_rgba(first.buffer(), &mut out)?;
        out.flush()?;
        return Ok(1);
    }
    let height = first.buffer().height();

    let palette = web_safe_palette();
    let background = meta.background();
    let frames: Vec<DecodedFrame> = frames
        .iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            DecodedFrame {
                canvas: composite(frame.buffer(), background, &palette),
                delay: Duration::from_secs_f64(numer as f64 / denom.max(1) as f64 / 1000.0),
            }
        })
        .collect();
    debug!(frames = frames.len(), loop_count = ?meta.loop_count, "playing animation");

    let winsize = playback.winsize();
    if let Some(lines) = winsize.rows_for_height(height) {
        out.write_all("\n".repeat(lines as usize).as_bytes())?;
        out.write_all(term_misc::cursor_up(lines).as_bytes())?;
    }
    out.write_all(SAVE_CURSOR.as_bytes())?;

    let mut remaining = meta.loop_count;
    let mut printed = 0;
    loop {
        for frame in &frames {
            if playback.should_stop() {
                debug!(printed, "animation stopped");
                return Ok(printed);
            }
            let started = Instant::now();
            out.write_all(RESTORE_CURSOR.as_bytes())?;
            sixel_encoder::write_sixel(&mut out, &frame.canvas)?;
            out.flush()?;
            printed += 1;

            if let Some(left) = frame.delay.checked_sub(started.elapsed()) {
                thread::sleep(left);
            }
        }

        if let LoopCount::Finite(n) = remaining {
            if n <= 1 {
                break;
            }
            remaining = LoopCount::Finite(n - 1);
        }
    }

    Ok(printed)
}
