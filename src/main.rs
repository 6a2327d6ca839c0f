//! Binary entrypoint that launches the Aurora server bootstrap.

use std::process::ExitCode;

use aurora_chat::start_aurora;

/// Start the Aurora server.
fn main() -> ExitCode {
    start_aurora::run()
}
