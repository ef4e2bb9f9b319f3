use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use edgeprof::propagate::{self, PropagateOptions};

/// Propagate the weights recorded by edge instrumentation back over each
/// function's control-flow graph. With the graphs in `x.graph` and the
/// profile in `x.prof`, point this at the matching info file and profile.
#[derive(Parser)]
#[command(name = "propagate", version)]
struct Args {
    /// Metadata file listing each instrumented function and its chord count
    info_file: PathBuf,

    /// Recorded profile stream of `<index> <count>` pairs
    prof_file: PathBuf,

    /// Write `<fn><ext>.edges` and `<fn><ext>.bb` instead of printing
    #[arg(short = 'o', value_name = "extension")]
    output_extension: Option<String>,

    /// Enable debug messages
    #[arg(short = 'd')]
    debug: bool,

    /// Do separate profilings for each function execution
    #[arg(short = 's')]
    separate: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    let options = PropagateOptions {
        output_extension: args.output_extension,
        separate: args.separate,
    };

    propagate::run(&args.info_file, &args.prof_file, &options)
        .with_context(|| format!("propagating {}", args.prof_file.display()))?;

    Ok(())
}
