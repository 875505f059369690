// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use trace_diff::*;
use diff::{DiffConfig, DiffContext, RenderOptions, Renderer, SearchPolicy};
use filter::{filter_unmatchable, FilterPaths};
use logfile::MappedLog;
use names::NameTable;
use utils::{with_path, Result};

/// Show the differences between two trace logs that share a name table.
#[derive(Parser, Debug)]
#[clap(name = "difftool")]
struct Args {
    /// Prefix of the name table files (<prefix>.index and <prefix>.strings)
    name_prefix: PathBuf,
    log_a: PathBuf,
    log_b: PathBuf,

    /// Number of common entries shown around each change
    #[clap(long, default_value_t = 3)]
    context: usize,

    /// Give up when the logs differ by more than this many entries
    #[clap(long, default_value_t = 1_000_000)]
    max_d: usize,

    /// Settle for a possibly non-minimal diff after this many search steps
    #[clap(long)]
    heuristic: Option<usize>,

    /// Capacity of each log window, in entries
    #[clap(long, default_value_t = 4096)]
    window: usize,

    #[clap(flatten)]
    cli: cli::Options,
}

fn do_main(args: Args) -> Result<()> {
    let names = NameTable::open(&args.name_prefix)?;

    let scratch = tempfile::tempdir()?;
    let paths = FilterPaths::in_dir(scratch.path());
    let inputs = [args.log_a.as_path(), args.log_b.as_path()];
    let filtered = filter_unmatchable(inputs, &paths)?;

    let originals = [
        with_path(inputs[0], || Ok(MappedLog::open(inputs[0])?))?,
        with_path(inputs[1], || Ok(MappedLog::open(inputs[1])?))?,
    ];

    let config = DiffConfig {
        max_d: args.max_d,
        search: match args.heuristic {
            Some(threshold) => SearchPolicy::Heuristic { threshold },
            None => SearchPolicy::Exact,
        },
        compare_window: args.window,
        display_window: args.window,
        prefetch: (args.window / 8).max(1),
    };
    let mut context = DiffContext::open(&paths.cleaned[0], &paths.cleaned[1], config)?;

    let mut cli = cli::Cli::new(&args.cli);
    let mut renderer = Renderer::new(
        cli.stream(),
        &names,
        [&originals[0], &originals[1]],
        [&paths.removed[0], &paths.removed[1]],
        &RenderOptions { context: args.context },
    )?;
    let stats = context.run(&mut renderer)?;

    info!(
        "edit distance {} over {} + {} matchable entries ({} + {} unmatchable)",
        stats.edit_distance,
        filtered.kept[0],
        filtered.kept[1],
        filtered.removed[0],
        filtered.removed[1]
    );

    Ok(())
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };
    cli::init_logging(args.cli.verbose);

    if let Err(err) = do_main(args) {
        eprintln!("difftool: {}", err);
        std::process::exit(1);
    }
}
