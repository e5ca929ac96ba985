//! Host-level error types
//!
//! These describe failures of the tool itself: a program file that cannot be
//! read or decoded, a bad configuration, a terminal that cannot be set up.
//! Undefined behavior in the interpreted program is never an [`Error`]; it is
//! reported through [`Event::UndefinedBehavior`](crate::events::Event).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A file named on the command line could not be read
    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The program document is not a valid compiled program
    #[error("Invalid program: {0}")]
    InvalidProgram(#[from] serde_json::Error),

    /// The configuration file is not valid TOML for [`SimulationConfig`](crate::config::SimulationConfig)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] toml::de::Error),

    /// The memory layout leaves no room for one of the regions
    #[error("Invalid memory layout: {0}")]
    InvalidLayout(String),

    /// The program defines no free function named `main`
    #[error("Program has no main function")]
    NoMainFunction,

    /// Neither a program file nor a demo was given
    #[error("No program file or demo given")]
    NoProgram,

    /// The event log could not be written as JSON
    #[error("Failed to write events: {0}")]
    WriteEvents(serde_json::Error),

    /// `--demo` named a program that does not exist
    #[error("Unknown demo program: {0}")]
    UnknownDemo(String),

    /// Terminal setup or drawing failed
    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
