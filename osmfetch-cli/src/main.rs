//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use osmfetch_cli::CliError;

fn main() {
    if let Err(err) = osmfetch_cli::init_logging() {
        eprintln!("osmfetch: logging unavailable: {err}");
    }
    match osmfetch_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("osmfetch: {err}");
            std::process::exit(1);
        }
    }
}
