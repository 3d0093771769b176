//! # CLI Behavior
//!
//! This is **one possible UI client** for replystage. The CLI is the only place
//! that knows about terminal I/O, exit codes, and output formatting.
//!
//! Running `replystage` with no subcommand lists the staged files.
//!
//! Files are addressed by the position shown in `list` (`1`, `2`, ...), by uuid,
//! or by a uuid prefix of at least four characters. Submission targets are
//! written `site/board` for a new thread or `site/board/123` for a reply.
//!
//! `--json` prints the structured command result instead of styled text.
//!
//! ## Module Structure
//!
//! - `setup`: Argument parsing via clap
//! - `commands`: Startup, dispatch to the API, exit status
//! - `render`: Text and JSON output

mod commands;
mod render;
pub mod setup;

pub use commands::run;
