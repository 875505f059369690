// SPDX-License-Identifier: MIT

use std::io::IsTerminal;
use std::process::{Command, Stdio};

use clap::Args;
use termcolor::{ColorChoice, StandardStream, WriteColor};

#[derive(Debug, Clone, Default, Args)]
pub struct Options {
    /// Whether the output should be run through a pager
    #[clap(long)]
    pub pager: Option<bool>,

    /// Whether the output should be colored
    #[clap(long)]
    pub color: Option<bool>,

    /// Log progress to stderr
    #[clap(short, long)]
    pub verbose: bool,
}

/// Set up `tracing` output on stderr.
///
/// `RUST_LOG` takes precedence over the level chosen by `verbose`.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second initialization only happens in tests and is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).without_time())
        .try_init();
}

pub struct Cli {
    stream: Box<dyn WriteColor>,
    pager: Option<std::process::Child>,
}
impl Cli {
    pub fn new(options: &Options) -> Cli {
        let is_terminal = std::io::stdout().is_terminal();

        let use_pager = options.pager.unwrap_or(is_terminal);
        let use_color = options.color.unwrap_or(is_terminal);

        let mut pager = use_pager
            .then(|| {
                Command::new("less")
                    .arg("-FR")
                    .stdin(Stdio::piped())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .ok()
            })
            .flatten();

        let pipe = pager.as_mut().and_then(|pager| pager.stdin.take());
        let stream: Box<dyn WriteColor> = match pipe {
            Some(pipe) if use_color => Box::new(termcolor::Ansi::new(pipe)),
            Some(pipe) => Box::new(termcolor::NoColor::new(pipe)),
            None => {
                let color = if use_color { ColorChoice::Always } else { ColorChoice::Never };
                Box::new(StandardStream::stdout(color))
            }
        };

        Cli { stream, pager }
    }

    pub fn stream(&mut self) -> &mut dyn WriteColor {
        self.stream.as_mut()
    }
}

impl Drop for Cli {
    fn drop(&mut self) {
        // Close the stream to signal EOF to the pager, if any.
        self.stream = Box::new(termcolor::NoColor::new(std::io::sink()));

        // Wait for the pager to exit, otherwise it ends up killed by the shell
        // and leaves the terminal in a bad state.
        if let Some(pager) = &mut self.pager {
            pager.wait().unwrap_or_default();
        }
    }
}
