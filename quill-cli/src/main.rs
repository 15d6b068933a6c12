use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

// argument parser and configuration
pub mod cli;
pub mod manifest;
pub mod status;
pub mod translations;

// command implementations
pub mod compile;
pub mod dump;
pub mod new;
pub mod run;

use crate::{cli::Quill, status::Status};

pub const MANIFEST: &str = "quill.toml";
/// Extension of encoded containers.
pub const CONTAINER: &str = "qsc";

/// Sets up logging, honoring `RUST_LOG` when it is set.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let subcommand = Quill::from_args();
    let verbose = matches!(subcommand, Quill::Run { verbose: true, .. });
    init_logging(verbose);

    let result = match subcommand {
        Quill::New(package) => new::new(package.path),
        Quill::Run { package, language, .. } => run::run(package.path, language),
        Quill::Compile { file, output } => compile::compile(file, output),
        Quill::Dump { file } => dump::dump(file),
    };

    if let Err(r) = result {
        Status::fatal().log(&r);
        std::process::exit(1);
    }
}
