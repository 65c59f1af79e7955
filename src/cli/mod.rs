//! # Command-Line Interface
//!
//! Loads a machine file and plans or runs its reconciliation.
//!
//! ## Commands
//!
//! | Command | Purpose | Example |
//! |---------|---------|---------|
//! | `check` | Validate a machine file | `taskgraph check deploy.toml` |
//! | `plan` | Show planned paths without firing edges | `taskgraph plan deploy.toml --item web` |
//! | `run` | Reconcile until settled | `taskgraph run deploy.toml --passes 3` |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Library logging goes to stderr through `env_logger`. `--verbose` lowers
//! the default filter to `debug`; `RUST_LOG` overrides both.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod machine_cmd;
mod output;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
