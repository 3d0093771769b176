//! # Replystage CLI
//!
//! The binary is intentionally thin: the CLI lives in `src/cli/`, while this file
//! only invokes `cli::run()` and handles process termination.
//!
//! ## Layering
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  CLI Layer (crates/replystage/src/cli/)                  │
//! │  - clap argument parsing (setup.rs)                      │
//! │  - dispatch + tracing setup (commands.rs)                │
//! │  - terminal and JSON rendering (render.rs)               │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  API Layer (crates/replystageapp/src/api.rs)             │
//! │  - parses selectors and targets                          │
//! │  - owns the store, reconciled once at startup            │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  Command Layer (crates/replystageapp/src/commands/*)     │
//! │  - business logic, returns structured `CmdResult`        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each invocation is a cold start: the store is rebuilt from disk, which also
//! discards anything a crashed submission left taken.

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
