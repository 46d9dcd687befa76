mod config;

use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::{Styles, styling::AnsiColor},
    error::ErrorKind,
};
use config::TeimgConfig;
use crossterm::tty::IsTty;
use dirs::home_dir;
use std::{
    io::{BufWriter, Read, Write},
    path::Path,
};
use termimg::{Backend, TermContext, term_misc};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn build_render_args() -> Vec<Arg> {
    vec![
        Arg::new("backend")
            .long("backend")
            .short('b')
            .value_name("name")
            .help(
                "Backend to render the image. Available backends: [iterm, kitty, sixel, blocks]. \
                 kitty can't be drawn yet, on kitty pass `-b blocks`",
            ),
        Arg::new("minimal")
            .long("minimal")
            .help("Only enable blocks unless a backend is given, and never detect kitty")
            .action(ArgAction::SetTrue),
        Arg::new("probe-timeout")
            .long("probe-timeout")
            .value_name("ms")
            .help("How long to wait for the terminal to report sixel support, 0 waits forever [default: 1000]")
            .value_parser(clap::value_parser!(u64)),
    ]
}

fn build_placement_args() -> Vec<Arg> {
    vec![
        Arg::new("absolute")
            .long("absolute")
            .short('a')
            .help("Absolute positioning")
            .action(ArgAction::SetTrue),
        Arg::new("preserve-ratio")
            .long("preserve-ratio")
            .short('p')
            .value_name("bool")
            .help("Preserve image aspect ratio")
            .value_parser(clap::value_parser!(bool))
            .default_value("true"),
        Arg::new("x")
            .short('x')
            .value_name("col")
            .help("X position")
            .value_parser(clap::value_parser!(u16)),
        Arg::new("y")
            .short('y')
            .value_name("row")
            .help("Y position")
            .value_parser(clap::value_parser!(u16)),
        Arg::new("width")
            .long("width")
            .short('w')
            .value_name("n")
            .help("Image width")
            .value_parser(clap::value_parser!(u32)),
        Arg::new("height")
            .long("height")
            .short('h')
            .value_name("n")
            .help("Image height")
            .value_parser(clap::value_parser!(u32)),
    ]
}

fn build_input_arg(stdin_streamed: bool) -> Arg {
    let mut input_arg = Arg::new("input").index(1).help("Image file");

    if !stdin_streamed {
        input_arg = input_arg.required_unless_present("report");
    }
    input_arg
}

fn build_cli(stdin_streamed: bool) -> Command {
    Command::new("teimg")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Display images in the terminal")
        .color(ColorChoice::Always)
        .styles(
            Styles::styled()
                .header(AnsiColor::Green.on_default().bold())
                .literal(AnsiColor::Blue.on_default()),
        )
        // -h belongs to height
        .disable_help_flag(true)
        .arg(
            Arg::new("help")
                .long("help")
                .help("Print usage")
                .action(ArgAction::Help),
        )
        .arg(build_input_arg(stdin_streamed))
        .arg(
            Arg::new("report")
                .long("report")
                .help("Report which backends the terminal supports")
                .action(ArgAction::SetTrue),
        )
        .next_help_heading("Backend")
        .args(build_render_args())
        .next_help_heading("Placement")
        .args(build_placement_args())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("TEIMG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

fn main() {
    init_logging();

    let stdin_streamed = !std::io::stdin().is_tty();
    let opts = match build_cli(stdin_streamed).try_get_matches() {
        Ok(opts) => opts,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                std::process::exit(1);
            }
        },
    };

    let mut config = TeimgConfig::default();
    config.extend_from_env();
    config.extend_from_args(&opts).unwrap_or_exit();

    let mut ctx = TermContext::from_process(&config.render);
    if config.report {
        report(&mut ctx, &config);
        return;
    }

    let bytes = read_input(config.input.as_deref(), stdin_streamed).unwrap_or_exit();

    // raising the flag stops gifs that loop forever
    let shutdown = term_misc::setup_signal_handler().unwrap_or_exit();
    let mut ctx = ctx.with_stop(shutdown);

    let stdout = std::io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    let backend = termimg::render(&bytes, &mut out, &config.render, &mut ctx).unwrap_or_exit();
    debug!(%backend, "done");
    out.flush().unwrap_or_exit();
}

fn read_input(input: Option<&str>, stdin_streamed: bool) -> std::io::Result<Vec<u8>> {
    match input {
        Some(path) if path != "-" => {
            let path = expand_tilde(path);
            std::fs::read(Path::new(&path))
                .map_err(|e| std::io::Error::new(e.kind(), format!("{path}: {e}")))
        }
        _ if stdin_streamed => {
            let mut buffer = Vec::new();
            std::io::stdin().read_to_end(&mut buffer)?;
            Ok(buffer)
        }
        _ => Err(std::io::Error::other("no input given")),
    }
}

trait UnwrapOrExit<T> {
    fn unwrap_or_exit(self) -> T;
}

impl<T, E: std::fmt::Display> UnwrapOrExit<T> for Result<T, E> {
    fn unwrap_or_exit(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                eprintln!("{}", err);
                std::process::exit(1);
            }
        }
    }
}

fn expand_tilde(path: &str) -> String {
    if path.starts_with("~")
        && let Some(home) = home_dir()
    {
        return path.replacen("~", &home.to_string_lossy(), 1);
    }
    path.to_string()
}

fn report(ctx: &mut TermContext, config: &TeimgConfig) {
    let caps = ctx.capabilities(&config.render);
    let selected = Backend::select(&config.render.backends, &caps);
    let winsize = term_misc::winsize_or_default(ctx.output_is_tty);
    let env = &ctx.env;

    fn green(text: &str) -> String {
        format!("\x1b[32m{}\x1b[0m", text)
    }

    fn red(text: &str) -> String {
        format!("\x1b[31m{}\x1b[0m", text)
    }

    fn format_capability(status: bool) -> String {
        if status {
            green("✓ SUPPORTED")
        } else {
            red("× UNSUPPORTED")
        }
    }

    fn format_info(status: bool) -> String {
        if status { green("✓ YES") } else { red("× NO") }
    }

    println!("┌────────────────────────────────────────────────────┐");
    println!("│               TERMINAL CAPABILITIES                │");
    println!("├────────────────────────────────────────────────────┤");
    println!("│ Graphics Support:                                  │");
    println!("│   iTerm2:   {:<47} │", format_capability(caps.iterm));
    println!("│   Kitty:    {:<47} │", format_capability(caps.kitty));
    println!("│   Sixel:    {:<47} │", format_capability(caps.sixel));
    println!("│   Blocks:   {:<47} │", format_capability(caps.blocks));
    println!("├────────────────────────────────────────────────────┤");
    println!("│ Terminal Info:                                     │");
    println!("│   Columns:        {:<32} │", winsize.columns);
    println!("│   Rows:           {:<32} │", winsize.rows);
    println!("│   Pixel Width:    {:<32} │", winsize.px_width);
    println!("│   Pixel Height:   {:<32} │", winsize.px_height);
    println!("├────────────────────────────────────────────────────┤");
    println!("│ Others:                                            │");
    println!("│   Tmux:       {:<45} │", format_info(caps.multiplexer));
    println!(
        "│   TERM:       {:<36} │",
        env.get("TERM").unwrap_or("Unknown")
    );
    println!(
        "│   PROGRAM:    {:<36} │",
        env.get("TERM_PROGRAM").unwrap_or("Unknown")
    );
    match selected {
        Ok(backend) => println!("│   Backend:    {:<36} │", backend),
        Err(err) => println!("│   Backend:    {:<36} │", err.to_string()),
    }
    println!("│   Version:    {:<36} │", env!("CARGO_PKG_VERSION"));
    println!("└────────────────────────────────────────────────────┘");
}
