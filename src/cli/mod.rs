//! Command line front end over the document store

pub mod args;
pub mod commands;

pub use args::{Cli, Command};
pub use commands::run;
