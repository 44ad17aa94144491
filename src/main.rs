//! `wxpay` command-line client.
//!
//! Creates, queries and refunds orders against the merchant payment gateway, verifies
//! stored notification bodies, and signs ad-hoc field sets.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` selects the JSON configuration file (default `config.json`)
//! - `RUST_LOG` controls log verbosity
//!
//! Exit status is `0` on success, `2` when a response or notification fails signature
//! verification, and `1` on any other error.

mod cli;

use std::process;

#[tokio::main]
async fn main() {
    let result = cli::run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(cli::exit_code(e.as_ref()))
    }
}
