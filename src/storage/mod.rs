//! # Storage Layer
//!
//! File formats read by taskgraph. Nothing is written back: machine files
//! are inputs and item state lives only for the duration of a run.
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Machine (states, edges, items) | TOML | any path given on the command line |
//! | User config | TOML | `~/.config/taskgraph/config.toml` or `--config` |
//!
//! ## Key Types
//!
//! - [`MachineFile`] - Parsed machine description, built into a reconciler
//! - [`Config`] - Locates and loads the user config
//! - [`ReconcilerSettings`] - One layer of reconciler settings

mod config;
mod machine;

pub use config::{Config, ConfigError, ReconcilerSettings, UserConfig};
pub use machine::{EdgeSpec, ItemSpec, MachineError, MachineFile, Trace};
