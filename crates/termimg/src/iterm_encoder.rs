use crate::{
    config::RenderConfig,
    error::Result,
    term_misc::{self, EnvIdentifiers},
};
use std::io::Write;

/// encode image bytes into an inline image.
/// the bytes are sent untouched, so anything iTerm2 can show works (GIF, PNG, JPEG..).
/// inside tmux the sequence is wrapped so tmux hands it to the outer terminal.
/// # example:
/// ```
/// use termimg::config::RenderConfig;
/// use termimg::iterm_encoder::encode_image;
///
/// let mut out = Vec::new();
/// encode_image(b"GIF89a", &mut out, &RenderConfig::default(), false).unwrap();
/// assert!(out.starts_with(b"\x1b]1337;File=inline=1;preserveAspectRatio=1;size=6:"));
/// ```
pub fn encode_image(
    img: &[u8],
    mut out: impl Write,
    config: &RenderConfig,
    tmux: bool,
) -> Result<()> {
    let base64_encoded = term_misc::image_to_base64(img);

    let (prefix, suffix): (&[u8], &[u8]) = if tmux {
        (b"\x1bPtmux;\x1b\x1b]", b"\x07\x1b\\")
    } else {
        (b"\x1b]", b"\x07")
    };

    out.write_all(prefix)?;
    write!(
        out,
        "1337;File=inline=1;preserveAspectRatio={};size={}",
        config.preserve_aspect_ratio as u8,
        img.len()
    )?;
    if let Some(width) = config.width {
        write!(out, ";width={width}")?;
    }
    if let Some(height) = config.height {
        write!(out, ";height={height}")?;
    }
    out.write_all(b":")?;
    out.write_all(base64_encoded.as_bytes())?;
    out.write_all(suffix)?;
    out.write_all(b"\n")?;

    Ok(())
}

/// checks if the current terminal supports the iTerm2 graphic protocol
pub fn is_iterm_capable(env: &EnvIdentifiers) -> bool {
    env.has_key("ITERM_SESSION_ID")
}
