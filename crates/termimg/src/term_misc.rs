use std::{
    collections::HashMap,
    env, io,
    sync::{Arc, atomic::AtomicBool},
};

use base64::{Engine, engine::general_purpose};
use crossterm::terminal::window_size;
use signal_hook::consts::signal::*;
use signal_hook::flag;
use tracing::debug;

use crate::error::{Error, Result};

pub const SAVE_CURSOR: &str = "\x1b[s";
pub const RESTORE_CURSOR: &str = "\x1b[u";

/// converts image bytes into base64
pub fn image_to_base64(img: &[u8]) -> String {
    general_purpose::STANDARD.encode(img)
}

/// turns an absolute location into the escape sequence that moves the cursor there.
/// x is the column and y the row, both 1-indexed.
pub fn loc_to_terminal(at: Option<(u16, u16)>) -> String {
    match at {
        Some((x, y)) => format!("\x1b[{y};{x}H"),
        None => "".to_string(),
    }
}

/// moves the cursor up by `lines` rows
pub fn cursor_up(lines: u16) -> String {
    format!("\x1b[{lines}A")
}

/// size of the terminal window, in cells and in pixels.
/// pixel sizes are 0 when the terminal doesn't report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Winsize {
    pub columns: u16,
    pub rows: u16,
    pub px_width: u16,
    pub px_height: u16,
}

impl Default for Winsize {
    fn default() -> Self {
        Winsize {
            columns: 80,
            rows: 24,
            px_width: 0,
            px_height: 0,
        }
    }
}

impl Winsize {
    /// pixel height of a single text row, when known
    pub fn cell_height(&self) -> Option<f32> {
        if self.px_height == 0 || self.rows == 0 {
            return None;
        }
        Some(self.px_height as f32 / self.rows as f32)
    }

    /// how many text rows an image of `height` pixels covers
    pub fn rows_for_height(&self, height: u32) -> Option<u16> {
        let cell = self.cell_height()?;
        Some((height as f32 / cell).ceil() as u16)
    }
}

/// queries the window size of the terminal behind the output stream.
/// fails with `UnknownWindowSize` when the output isn't a terminal.
pub fn query_winsize(output_is_tty: bool) -> Result<Winsize> {
    if !output_is_tty {
        return Err(Error::UnknownWindowSize);
    }
    let res = window_size()?;
    Ok(Winsize {
        columns: res.columns,
        rows: res.rows,
        px_width: res.width,
        px_height: res.height,
    })
}

/// same as `query_winsize` but falls back to 80x24 instead of failing
pub fn winsize_or_default(output_is_tty: bool) -> Winsize {
    match query_winsize(output_is_tty) {
        Ok(ws) if ws.columns > 0 && ws.rows > 0 => ws,
        Ok(ws) => {
            debug!(?ws, "terminal reported an empty window, using default");
            Winsize::default()
        }
        Err(err) => {
            debug!(%err, "using default window size");
            Winsize::default()
        }
    }
}

/// snapshot of the environment variables used to identify the terminal.
/// values are normalized into lowercase.
#[derive(Debug, Clone, Default)]
pub struct EnvIdentifiers {
    pub data: HashMap<String, String>,
}

const ENV_KEYS: [&str; 4] = ["TERM", "TERM_PROGRAM", "ITERM_SESSION_ID", "TMUX"];

impl EnvIdentifiers {
    /// reads the current process environment
    pub fn new() -> Self {
        let mut result = HashMap::new();

        for &key in &ENV_KEYS {
            if let Ok(value) = env::var(key) {
                result.insert(key.to_string(), value.to_lowercase());
            }
        }

        EnvIdentifiers { data: result }
    }

    /// builds a snapshot from explicit pairs, without touching the process environment
    /// # example:
    /// ```
    /// use termimg::term_misc::EnvIdentifiers;
    ///
    /// let env = EnvIdentifiers::from_pairs([("TERM", "foot")]);
    /// assert!(env.equals("TERM", "foot"));
    /// ```
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let data = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_lowercase()))
            .collect();
        EnvIdentifiers { data }
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|v| !v.is_empty())
    }

    /// pass the substr as lowercase
    pub fn contains(&self, key: &str, substr: &str) -> bool {
        self.data.get(key).is_some_and(|f| f.contains(substr))
    }

    /// pass the value as lowercase
    pub fn equals(&self, key: &str, value: &str) -> bool {
        self.data.get(key).is_some_and(|f| f == value)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|f| f.as_str())
    }
}

/// whether we are running inside tmux
pub fn is_tmux(env: &EnvIdentifiers) -> bool {
    env.contains("TERM_PROGRAM", "tmux") || env.has_key("TMUX")
}

/// get a handle to when the program is killed.
/// the first signal only raises the flag so animations can stop on their own,
/// a second one terminates the process.
pub fn setup_signal_handler() -> io::Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut signals = vec![SIGINT, SIGTERM];
    #[cfg(unix)]
    signals.extend([SIGHUP, SIGQUIT]);

    for signal in signals {
        flag::register_conditional_shutdown(signal, 1, Arc::clone(&shutdown))?;
        flag::register(signal, Arc::clone(&shutdown))?;
    }

    Ok(shutdown)
}
