use std::io::Write;

use crate::{
    Backend,
    error::{Error, Result},
    term_misc::EnvIdentifiers,
};

/// the kitty graphics protocol isn't implemented yet.
/// always fails with `Error::NotImplemented` and writes nothing.
pub fn encode_image(_img: &[u8], _out: impl Write) -> Result<()> {
    Err(Error::NotImplemented(Backend::Kitty))
}

/// checks if the current terminal supports the kitty graphic protocol
pub fn is_kitty_capable(env: &EnvIdentifiers) -> bool {
    env.contains("TERM", "kitty")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_not_implemented() {
        let mut out = Vec::new();
        let err = encode_image(b"\x89PNG", &mut out).unwrap_err();
        assert!(matches!(err, Error::NotImplemented(Backend::Kitty)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_is_kitty_capable() {
        assert!(is_kitty_capable(&EnvIdentifiers::from_pairs([(
            "TERM",
            "xterm-kitty"
        )])));
        assert!(!is_kitty_capable(&EnvIdentifiers::from_pairs([(
            "TERM",
            "xterm-256color"
        )])));
    }
}
