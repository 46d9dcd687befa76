use std::{
    io::{self, Read, Write},
    sync::mpsc,
    thread,
    time::Duration,
};

use crossterm::{
    terminal::{disable_raw_mode, enable_raw_mode},
    tty::IsTty,
};
use tracing::debug;

use crate::{
    config::{Profile, RenderConfig},
    error::{Error, Result},
    iterm_encoder, kitty_encoder, sixel_encoder,
    term_misc::{self, EnvIdentifiers},
};

const DEVICE_ATTRIBUTES_REQUEST: &[u8] = b"\x1b[c";

/// what the attached terminal plausibly supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub iterm: bool,
    pub kitty: bool,
    pub sixel: bool,
    pub blocks: bool,
    /// running inside tmux; sixel and kitty can't go through it
    pub multiplexer: bool,
}

impl Capabilities {
    /// detects the capabilities of the terminal described by `env`.
    /// the device attributes probe is only sent when the selection could actually land on sixel.
    /// # example:
    /// ```
    /// use termimg::capabilities::{Capabilities, DeviceProbe};
    /// use termimg::config::RenderConfig;
    /// use termimg::term_misc::EnvIdentifiers;
    ///
    /// struct Silent;
    /// impl DeviceProbe for Silent {
    ///     fn device_attributes(&mut self) -> termimg::Result<String> {
    ///         Ok(String::new())
    ///     }
    /// }
    ///
    /// let env = EnvIdentifiers::from_pairs([("ITERM_SESSION_ID", "w0t0p0")]);
    /// let caps = Capabilities::detect(&env, &mut Silent, &RenderConfig::default());
    /// assert!(caps.iterm);
    /// ```
    pub fn detect(env: &EnvIdentifiers, probe: &mut dyn DeviceProbe, config: &RenderConfig) -> Self {
        let wanted = config.backends;
        let multiplexer = term_misc::is_tmux(env);
        let iterm = iterm_encoder::is_iterm_capable(env);
        let kitty = match config.profile {
            Profile::Probed => kitty_encoder::is_kitty_capable(env),
            Profile::Minimal => false,
        };

        let decided_before_sixel =
            (wanted.iterm && iterm) || (wanted.kitty && kitty && !multiplexer);
        let sixel = if wanted.sixel && !multiplexer && !decided_before_sixel {
            sixel_encoder::is_sixel_capable(env, probe)
        } else {
            false
        };

        let caps = Capabilities {
            iterm,
            kitty,
            sixel,
            blocks: true,
            multiplexer,
        };
        debug!(?caps, "detected terminal capabilities");
        caps
    }
}

/// a round trip with the terminal asking for its device attributes
pub trait DeviceProbe {
    /// sends the request and returns the raw reply
    fn device_attributes(&mut self) -> Result<String>;
}

/// probes the terminal attached to stdin / stdout.
///
/// After a timeout the reader thread stays blocked on stdin and will swallow the terminal's late
/// reply, so stdin must not be read again by the process. The probe itself gives up for good:
/// every later call fails with `ProbeTimeout` without touching the terminal.
pub struct TtyProbe {
    timeout: Option<Duration>,
    timed_out: bool,
}

impl TtyProbe {
    /// `None` blocks until the terminal answers
    pub fn new(timeout: Option<Duration>) -> Self {
        TtyProbe {
            timeout,
            timed_out: false,
        }
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

impl DeviceProbe for TtyProbe {
    fn device_attributes(&mut self) -> Result<String> {
        if self.timed_out {
            return Err(Error::ProbeTimeout(self.timeout.unwrap_or_default()));
        }

        let mut stdout = io::stdout();
        if !io::stdin().is_tty() || !stdout.is_tty() {
            return Err(Error::NotATerminal);
        }

        let _raw = RawModeGuard::enable().map_err(Error::Probe)?;
        request_device_attributes(&mut stdout).map_err(Error::Probe)?;

        let Some(timeout) = self.timeout else {
            return read_reply(&mut io::stdin().lock()).map_err(Error::Probe);
        };

        let reply = read_reply_within(io::stdin(), timeout);
        if matches!(reply, Err(Error::ProbeTimeout(_))) {
            self.timed_out = true;
        }
        reply
    }
}

/// like `read_reply`, but stops waiting after `timeout`.
/// the read happens on a helper thread that is abandoned if the input never answers.
pub fn read_reply_within<R: Read + Send + 'static>(mut input: R, timeout: Duration) -> Result<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(read_reply(&mut input));
    });
    match rx.recv_timeout(timeout) {
        Ok(reply) => reply.map_err(Error::Probe),
        Err(_) => Err(Error::ProbeTimeout(timeout)),
    }
}

/// writes the "report device attributes" request
pub fn request_device_attributes(out: &mut impl Write) -> io::Result<()> {
    out.write_all(DEVICE_ATTRIBUTES_REQUEST)?;
    out.flush()
}

/// reads a reply byte by byte until the closing `c` or the end of the input
pub fn read_reply(input: &mut impl Read) -> io::Result<String> {
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                reply.push(byte[0]);
                if byte[0] == b'c' {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

/// a reply advertising attribute 4 means sixel graphics
pub fn reply_supports_sixel(reply: &str) -> bool {
    reply.contains(";4;") || reply.contains(";4c")
}
