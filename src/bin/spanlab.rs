//! spanlab CLI binary.

use std::io::Write;
use std::process;

use clap::Parser;
use env_logger::Builder;

use spanlab::cli::args::*;
use spanlab::cli::commands::*;

fn main() {
    let args = SpanlabArgs::parse();

    // RUST_LOG, when set, refines the level chosen by -v/-q.
    Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
