// SPDX-License-Identifier: MIT

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use trace_diff::*;
use depth::DepthTracker;
use logfile::MappedLog;
use names::NameTable;
use utils::{with_path, Result};

/// Print a trace log, one entry per line, indented by call depth.
#[derive(Parser, Debug)]
#[clap(name = "tracedump")]
struct Args {
    /// Prefix of the name table files (<prefix>.index and <prefix>.strings)
    name_prefix: PathBuf,
    log: PathBuf,

    #[clap(flatten)]
    cli: cli::Options,
}

fn do_main(args: Args) -> Result<()> {
    let names = NameTable::open(&args.name_prefix)?;
    let log = with_path(&args.log, || Ok(MappedLog::open(&args.log)?))?;

    let mut cli = cli::Cli::new(&args.cli);
    let out = cli.stream();
    let mut tracker = DepthTracker::new();
    for (seq, record) in log.iter().enumerate() {
        let record = with_path(&args.log, || Ok(record?))?;
        let depth = tracker.observe(seq as u64, &record) as usize;
        writeln!(
            out,
            "{:indent$}{:<6} {}",
            "",
            record.tag,
            names.display(record.name_index()),
            indent = depth * 2
        )?;
    }
    out.flush()?;

    if tracker.mismatches() != 0 {
        warn!("{} exits without a matching entry", tracker.mismatches());
    }
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
        eprintln!("tracedump: {}", err);
        std::process::exit(1);
    }
}
