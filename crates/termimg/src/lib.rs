use std::{
    fmt,
    io::{self, Write},
    str::FromStr,
    sync::{Arc, atomic::AtomicBool},
};

use crossterm::tty::IsTty;
use tracing::debug;

pub mod animation;
pub mod blocks_encoder;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod image_extended;
pub mod iterm_encoder;
pub mod kitty_encoder;
pub mod sixel_encoder;
pub mod term_misc;

pub use error::{Error, Result};

use animation::Playback;
use capabilities::{Capabilities, DeviceProbe, TtyProbe};
use config::{BackendSet, RenderConfig};
use term_misc::EnvIdentifiers;

/// the graphics protocol used to print an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Iterm,
    Kitty,
    Sixel,
    Blocks,
}

impl Backend {
    /// in order of precedence
    pub const ALL: [Backend; 4] = [
        Backend::Iterm,
        Backend::Kitty,
        Backend::Sixel,
        Backend::Blocks,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Iterm => "iterm",
            Backend::Kitty => "kitty",
            Backend::Sixel => "sixel",
            Backend::Blocks => "blocks",
        }
    }

    /// picks exactly one backend out of the enabled ones that the terminal supports.
    /// kitty and sixel are never picked inside tmux.
    /// # example:
    /// ```
    /// use termimg::Backend;
    /// use termimg::capabilities::Capabilities;
    /// use termimg::config::BackendSet;
    ///
    /// let caps = Capabilities { sixel: true, blocks: true, multiplexer: true, ..Default::default() };
    /// assert_eq!(Backend::select(&BackendSet::all(), &caps).unwrap(), Backend::Blocks);
    /// ```
    pub fn select(enabled: &BackendSet, caps: &Capabilities) -> Result<Self> {
        let selected = if enabled.iterm && caps.iterm {
            Backend::Iterm
        } else if enabled.kitty && caps.kitty && !caps.multiplexer {
            Backend::Kitty
        } else if enabled.sixel && caps.sixel && !caps.multiplexer {
            Backend::Sixel
        } else if enabled.blocks {
            Backend::Blocks
        } else {
            return Err(Error::NoBackendAvailable);
        };
        debug!(backend = %selected, "selected backend");
        Ok(selected)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        Backend::ALL
            .into_iter()
            .find(|b| b.name() == lower)
            .ok_or_else(|| Error::UnknownBackend(s.to_string()))
    }
}

/// everything a render needs to know about the terminal it prints to
pub struct TermContext {
    pub env: EnvIdentifiers,
    pub probe: Box<dyn DeviceProbe>,
    pub output_is_tty: bool,
    /// stops animations when raised
    pub stop: Option<Arc<AtomicBool>>,
}

impl TermContext {
    /// the terminal behind this process' stdout
    pub fn from_process(config: &RenderConfig) -> Self {
        TermContext {
            env: EnvIdentifiers::new(),
            probe: Box::new(TtyProbe::new(config.probe_timeout)),
            output_is_tty: io::stdout().is_tty(),
            stop: None,
        }
    }

    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn capabilities(&mut self, config: &RenderConfig) -> Capabilities {
        Capabilities::detect(&self.env, self.probe.as_mut(), config)
    }
}

/// prints an image into the terminal using the best backend available.
/// returns the backend that was used.
/// # example:
/// ```no_run
/// use std::io::Write;
/// use termimg::{TermContext, render, config::RenderConfig};
///
/// let bytes = std::fs::read("image.png").unwrap();
/// let config = RenderConfig::default();
/// let mut ctx = TermContext::from_process(&config);
/// let mut stdout = std::io::stdout();
/// render(&bytes, &mut stdout, &config, &mut ctx).unwrap();
/// stdout.flush().unwrap();
/// ```
pub fn render(
    img: &[u8],
    out: &mut impl Write,
    config: &RenderConfig,
    ctx: &mut TermContext,
) -> Result<Backend> {
    if let Some(at) = config.position() {
        out.write_all(term_misc::loc_to_terminal(Some(at)).as_bytes())?;
    }

    let caps = ctx.capabilities(config);
    let backend = Backend::select(&config.backends, &caps)?;
    encode_with(backend, img, out, config, ctx, caps.multiplexer)?;
    Ok(backend)
}

/// encodes with a specific backend, skipping detection
pub fn encode_with(
    backend: Backend,
    img: &[u8],
    out: &mut impl Write,
    config: &RenderConfig,
    ctx: &TermContext,
    tmux: bool,
) -> Result<()> {
    match backend {
        Backend::Iterm => iterm_encoder::encode_image(img, out, config, tmux),
        Backend::Kitty => kitty_encoder::encode_image(img, out),
        Backend::Sixel => {
            let playback = Playback {
                output_is_tty: ctx.output_is_tty,
                stop: ctx.stop.as_deref(),
                winsize: None,
            };
            sixel_encoder::encode_image(img, out, &playback)
        }
        Backend::Blocks => blocks_encoder::encode_image(img, out, config, ctx.output_is_tty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::tests::FakeProbe;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn ctx(pairs: &[(&str, &str)], probe: FakeProbe) -> TermContext {
        TermContext {
            env: EnvIdentifiers::from_pairs(pairs.iter().copied()),
            probe: Box::new(probe),
            output_is_tty: false,
            stop: None,
        }
    }

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(3, 3, image::Rgba([1, 2, 3, 255]))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn caps_strategy() -> impl Strategy<Value = Capabilities> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(iterm, kitty, sixel, multiplexer)| Capabilities {
                iterm,
                kitty,
                sixel,
                blocks: true,
                multiplexer,
            },
        )
    }

    #[test]
    fn test_backend_names() {
        for backend in Backend::ALL {
            assert_eq!(backend.name().parse::<Backend>().unwrap(), backend);
            assert_eq!(backend.to_string(), backend.name());
        }
        assert_eq!("Blocks".parse::<Backend>().unwrap(), Backend::Blocks);
        assert!(matches!(
            "ascii".parse::<Backend>(),
            Err(Error::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_precedence() {
        let caps = Capabilities {
            iterm: true,
            kitty: true,
            sixel: true,
            blocks: true,
            multiplexer: false,
        };
        assert_eq!(
            Backend::select(&BackendSet::all(), &caps).unwrap(),
            Backend::Iterm
        );
        let caps = Capabilities {
            iterm: false,
            ..caps
        };
        assert_eq!(
            Backend::select(&BackendSet::all(), &caps).unwrap(),
            Backend::Kitty
        );
        let caps = Capabilities {
            kitty: false,
            ..caps
        };
        assert_eq!(
            Backend::select(&BackendSet::all(), &caps).unwrap(),
            Backend::Sixel
        );
    }

    #[test]
    fn test_no_backend_available() {
        let caps = Capabilities {
            blocks: true,
            ..Default::default()
        };
        let err = Backend::select(&BackendSet::only(Backend::Sixel), &caps).unwrap_err();
        assert!(matches!(err, Error::NoBackendAvailable));
    }

    proptest! {
        #[test]
        fn prop_single_supported_backend_is_selected(
            idx in 0usize..4,
            caps in caps_strategy(),
        ) {
            let backend = Backend::ALL[idx];
            let mut caps = caps;
            caps.multiplexer = false;
            match backend {
                Backend::Iterm => caps.iterm = true,
                Backend::Kitty => caps.kitty = true,
                Backend::Sixel => caps.sixel = true,
                Backend::Blocks => {}
            }
            let selected = Backend::select(&BackendSet::only(backend), &caps).unwrap();
            prop_assert_eq!(selected, backend);
        }

        #[test]
        fn prop_multiplexer_never_pixel_or_cell(
            enabled in (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()),
            caps in caps_strategy(),
        ) {
            let enabled = BackendSet {
                iterm: enabled.0,
                kitty: enabled.1,
                sixel: enabled.2,
                blocks: enabled.3,
            };
            let caps = Capabilities { multiplexer: true, ..caps };
            if let Ok(selected) = Backend::select(&enabled, &caps) {
                prop_assert!(selected != Backend::Sixel && selected != Backend::Kitty);
            }
        }
    }

    #[test]
    fn test_render_blocks_with_position() {
        let config = RenderConfig::default().with_position(4, 2);
        let mut ctx = ctx(&[("TERM", "linux")], FakeProbe::failing());
        let mut out = Vec::new();
        let backend = render(&png(), &mut out, &config, &mut ctx).unwrap();
        assert_eq!(backend, Backend::Blocks);
        assert!(out.starts_with(b"\x1b[2;4H"));
        assert!(String::from_utf8(out).unwrap().contains('▀'));
    }

    #[test]
    fn test_render_iterm_sends_raw_bytes() {
        let bytes = png();
        let mut ctx = ctx(&[("ITERM_SESSION_ID", "w0")], FakeProbe::failing());
        let mut out = Vec::new();
        let backend = render(&bytes, &mut out, &RenderConfig::default(), &mut ctx).unwrap();
        assert_eq!(backend, Backend::Iterm);
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains(&format!(";size={}:", bytes.len())));
    }

    #[test]
    fn test_render_iterm_inside_tmux_is_wrapped() {
        let mut ctx = ctx(
            &[("ITERM_SESSION_ID", "w0"), ("TERM_PROGRAM", "tmux")],
            FakeProbe::failing(),
        );
        let mut out = Vec::new();
        render(&png(), &mut out, &RenderConfig::default(), &mut ctx).unwrap();
        assert!(out.starts_with(b"\x1bPtmux;"));
    }

    #[test]
    fn test_render_sixel_after_probe() {
        let mut ctx = ctx(
            &[("TERM", "xterm-256color")],
            FakeProbe::answering("\x1b[?62;4;22c"),
        );
        let mut out = Vec::new();
        let backend = render(&png(), &mut out, &RenderConfig::default(), &mut ctx).unwrap();
        assert_eq!(backend, Backend::Sixel);
        assert!(out.starts_with(b"\x1bP0;1q"));
    }

    #[test]
    fn test_render_tmux_falls_back_to_blocks() {
        let mut ctx = ctx(
            &[("TERM", "foot"), ("TERM_PROGRAM", "tmux")],
            FakeProbe::failing(),
        );
        let mut out = Vec::new();
        let backend = render(&png(), &mut out, &RenderConfig::default(), &mut ctx).unwrap();
        assert_eq!(backend, Backend::Blocks);
    }

    #[test]
    fn test_render_kitty_is_not_implemented() {
        let mut ctx = ctx(&[("TERM", "xterm-kitty")], FakeProbe::failing());
        let mut out = Vec::new();
        let err = render(&png(), &mut out, &RenderConfig::default(), &mut ctx).unwrap_err();
        assert!(matches!(err, Error::NotImplemented(Backend::Kitty)));
    }

    #[test]
    fn test_render_nothing_supported() {
        let mut ctx = ctx(&[("TERM", "linux")], FakeProbe::failing());
        let config = RenderConfig::default().with_backend("iterm").unwrap();
        let mut out = Vec::new();
        let err = render(&png(), &mut out, &config, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::NoBackendAvailable));
        assert!(out.is_empty());
    }

    #[test]
    fn test_render_decode_failure() {
        let mut ctx = ctx(&[("TERM", "foot")], FakeProbe::failing());
        let mut out = Vec::new();
        let err = render(b"not an image", &mut out, &RenderConfig::default(), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
