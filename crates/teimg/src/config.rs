use std::{env, time::Duration};

use clap::ArgMatches;
use termimg::config::RenderConfig;

#[derive(Debug, Clone, Default)]
pub struct TeimgConfig {
    pub input: Option<String>,
    pub report: bool,
    pub render: RenderConfig,
    backend_force: Option<String>,
}

impl TeimgConfig {
    pub fn extend_from_env(&mut self) -> &mut Self {
        if let Ok(v) = env::var("TEIMG_BACKEND")
            && !v.is_empty()
        {
            self.backend_force = Some(v);
        }
        self
    }

    /// flags override the environment.
    /// an unknown backend name fails here, before anything touches the terminal.
    pub fn extend_from_args(&mut self, opts: &ArgMatches) -> termimg::Result<&mut Self> {
        self.input = opts.get_one::<String>("input").cloned();
        self.report = opts.get_flag("report");

        let mut render = if opts.get_flag("minimal") {
            RenderConfig::minimal()
        } else {
            RenderConfig::default()
        };

        if let Some(backend) = opts.get_one::<String>("backend") {
            self.backend_force = Some(backend.clone());
        }
        if let Some(backend) = &self.backend_force {
            render = render.with_backend(backend)?;
        }

        render.absolute = opts.get_flag("absolute");
        render.x = opts.get_one::<u16>("x").copied().unwrap_or_default();
        render.y = opts.get_one::<u16>("y").copied().unwrap_or_default();
        if let Some(&width) = opts.get_one::<u32>("width") {
            render = render.with_width(width)?;
        }
        if let Some(&height) = opts.get_one::<u32>("height") {
            render = render.with_height(height)?;
        }
        if let Some(&preserve) = opts.get_one::<bool>("preserve-ratio") {
            render = render.with_preserve_aspect_ratio(preserve);
        }
        if let Some(&ms) = opts.get_one::<u64>("probe-timeout") {
            let timeout = (ms > 0).then(|| Duration::from_millis(ms));
            render = render.with_probe_timeout(timeout);
        }

        self.render = render;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_cli;
    use termimg::{Backend, Error, config::BackendSet};

    fn parse(args: &[&str]) -> termimg::Result<TeimgConfig> {
        let opts = build_cli(false)
            .try_get_matches_from(std::iter::once("teimg").chain(args.iter().copied()))
            .unwrap();
        let mut config = TeimgConfig::default();
        config.extend_from_args(&opts)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["cat.png"]).unwrap();
        assert_eq!(config.input.as_deref(), Some("cat.png"));
        assert_eq!(config.render.backends, BackendSet::all());
        assert!(config.render.preserve_aspect_ratio);
        assert!(!config.render.absolute);
        assert_eq!(config.render.probe_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_all_flags() {
        let config = parse(&[
            "-b", "Sixel", "-a", "-x", "3", "-y", "9", "-w", "100", "-h", "50", "-p", "false",
            "cat.gif",
        ])
        .unwrap();
        let render = &config.render;
        assert_eq!(render.backends, BackendSet::only(Backend::Sixel));
        assert_eq!(render.position(), Some((3, 9)));
        assert_eq!(render.width.map(|w| w.get()), Some(100));
        assert_eq!(render.height.map(|h| h.get()), Some(50));
        assert!(!render.preserve_aspect_ratio);
    }

    #[test]
    fn test_unknown_backend() {
        let err = parse(&["--backend", "vt340", "cat.png"]).unwrap_err();
        assert!(matches!(err, Error::UnknownBackend(name) if name == "vt340"));
    }

    #[test]
    fn test_zero_width_is_rejected() {
        let err = parse(&["-w", "0", "cat.png"]).unwrap_err();
        assert!(matches!(err, Error::InvalidDimension("width")));
    }

    #[test]
    fn test_minimal_and_probe_timeout() {
        let config = parse(&["--minimal", "--probe-timeout", "0", "cat.png"]).unwrap();
        assert_eq!(config.render.backends, BackendSet::only(Backend::Blocks));
        assert_eq!(config.render.probe_timeout, None);

        let config = parse(&["--probe-timeout", "250", "cat.png"]).unwrap();
        assert_eq!(
            config.render.probe_timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_backend_help_points_kitty_to_blocks() {
        let help = build_cli(false).render_help().to_string();
        assert!(help.contains("on kitty pass `-b blocks`"), "{help}");
    }

    #[test]
    fn test_report_needs_no_input() {
        let config = parse(&["--report"]).unwrap();
        assert!(config.report);
        assert!(config.input.is_none());
    }
}
