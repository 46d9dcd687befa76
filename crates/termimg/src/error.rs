//! Error types for rendering images into the terminal

use std::{io, time::Duration};
use thiserror::Error;

use crate::Backend;

#[derive(Error, Debug)]
pub enum Error {
    /// a backend name outside of iterm / kitty / sixel / blocks
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// every enabled backend is unsupported by the current terminal
    #[error("no backend available")]
    NoBackendAvailable,

    /// window size was queried against something that isn't a terminal
    #[error("unknown window size")]
    UnknownWindowSize,

    #[error(transparent)]
    Decode(#[from] image::ImageError),

    #[error("device attributes probe failed: {0}")]
    Probe(#[source] io::Error),

    #[error("device attributes probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("not a terminal")]
    NotATerminal,

    #[error("invalid {0}: must be a positive number")]
    InvalidDimension(&'static str),

    #[error("image is empty")]
    EmptyImage,

    #[error("failed to resize image: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("{0} backend is not implemented")]
    NotImplemented(Backend),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
