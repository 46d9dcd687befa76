use std::{num::NonZeroU32, time::Duration};

use crate::{
    Backend,
    error::{Error, Result},
};

/// which backends a render is allowed to pick from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSet {
    pub iterm: bool,
    pub kitty: bool,
    pub sixel: bool,
    pub blocks: bool,
}

impl BackendSet {
    /// every backend enabled, auto detect picks one
    pub fn all() -> Self {
        BackendSet {
            iterm: true,
            kitty: true,
            sixel: true,
            blocks: true,
        }
    }

    pub fn none() -> Self {
        BackendSet {
            iterm: false,
            kitty: false,
            sixel: false,
            blocks: false,
        }
    }

    pub fn only(backend: Backend) -> Self {
        let mut set = Self::none();
        set.enable(backend);
        set
    }

    /// parses a backend name (case insensitive) into a set with only that backend enabled
    /// # example:
    /// ```
    /// use termimg::{Backend, config::BackendSet};
    ///
    /// let set = BackendSet::from_name("Sixel").unwrap();
    /// assert_eq!(set, BackendSet::only(Backend::Sixel));
    /// assert!(BackendSet::from_name("vt340").is_err());
    /// ```
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(Self::only(name.parse()?))
    }

    pub fn enable(&mut self, backend: Backend) {
        match backend {
            Backend::Iterm => self.iterm = true,
            Backend::Kitty => self.kitty = true,
            Backend::Sixel => self.sixel = true,
            Backend::Blocks => self.blocks = true,
        }
    }

    pub fn contains(&self, backend: Backend) -> bool {
        match backend {
            Backend::Iterm => self.iterm,
            Backend::Kitty => self.kitty,
            Backend::Sixel => self.sixel,
            Backend::Blocks => self.blocks,
        }
    }
}

impl Default for BackendSet {
    fn default() -> Self {
        Self::all()
    }
}

/// The two default behaviours a renderer can start from.
/// `Probed` enables every backend and detects kitty from `TERM`,
/// `Minimal` only enables blocks and never reports kitty support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Probed,
    Minimal,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub backends: BackendSet,
    pub profile: Profile,
    /// move the cursor to (x, y) before printing
    pub absolute: bool,
    /// column, 1-indexed
    pub x: u16,
    /// row, 1-indexed
    pub y: u16,
    pub width: Option<NonZeroU32>,
    pub height: Option<NonZeroU32>,
    pub preserve_aspect_ratio: bool,
    /// how long to wait for the terminal to answer a device attributes query.
    /// `None` waits forever.
    pub probe_timeout: Option<Duration>,
}

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            backends: BackendSet::all(),
            profile: Profile::Probed,
            absolute: false,
            x: 0,
            y: 0,
            width: None,
            height: None,
            preserve_aspect_ratio: true,
            probe_timeout: Some(DEFAULT_PROBE_TIMEOUT),
        }
    }
}

impl RenderConfig {
    /// blocks only, kitty is never detected
    pub fn minimal() -> Self {
        RenderConfig {
            backends: BackendSet::only(Backend::Blocks),
            profile: Profile::Minimal,
            ..Default::default()
        }
    }

    /// restricts the render to a single named backend
    pub fn with_backend(mut self, name: &str) -> Result<Self> {
        self.backends = BackendSet::from_name(name)?;
        Ok(self)
    }

    /// sets the width hint, 0 is rejected
    pub fn with_width(mut self, width: u32) -> Result<Self> {
        self.width = Some(NonZeroU32::new(width).ok_or(Error::InvalidDimension("width"))?);
        Ok(self)
    }

    /// sets the height hint, 0 is rejected
    pub fn with_height(mut self, height: u32) -> Result<Self> {
        self.height = Some(NonZeroU32::new(height).ok_or(Error::InvalidDimension("height"))?);
        Ok(self)
    }

    pub fn with_position(mut self, x: u16, y: u16) -> Self {
        self.absolute = true;
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_preserve_aspect_ratio(mut self, preserve: bool) -> Self {
        self.preserve_aspect_ratio = preserve;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// where the cursor should be moved before printing, if anywhere
    pub fn position(&self) -> Option<(u16, u16)> {
        self.absolute.then_some((self.x, self.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let cfg = RenderConfig::default();
        assert_eq!(cfg.backends, BackendSet::all());
        assert_eq!(cfg.profile, Profile::Probed);
        assert!(cfg.preserve_aspect_ratio);
        assert!(!cfg.absolute);
        assert!(cfg.width.is_none() && cfg.height.is_none());
    }

    #[test]
    fn test_minimal_only_blocks() {
        let cfg = RenderConfig::minimal();
        assert_eq!(cfg.backends, BackendSet::only(Backend::Blocks));
        assert_eq!(cfg.profile, Profile::Minimal);
    }

    #[test]
    fn test_with_backend_is_case_insensitive() {
        let cfg = RenderConfig::default().with_backend("ITERM").unwrap();
        assert_eq!(cfg.backends, BackendSet::only(Backend::Iterm));
    }

    #[test]
    fn test_unknown_backend() {
        let err = RenderConfig::default().with_backend("ascii").unwrap_err();
        assert!(matches!(err, Error::UnknownBackend(name) if name == "ascii"));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            RenderConfig::default().with_width(0),
            Err(Error::InvalidDimension("width"))
        ));
        assert!(matches!(
            RenderConfig::default().with_height(0),
            Err(Error::InvalidDimension("height"))
        ));
        let cfg = RenderConfig::default()
            .with_width(100)
            .and_then(|c| c.with_height(50))
            .unwrap();
        assert_eq!(cfg.width.map(NonZeroU32::get), Some(100));
        assert_eq!(cfg.height.map(NonZeroU32::get), Some(50));
    }

    #[test]
    fn test_position() {
        assert_eq!(RenderConfig::default().position(), None);
        assert_eq!(
            RenderConfig::default().with_position(3, 7).position(),
            Some((3, 7))
        );
    }
}
