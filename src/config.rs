//! Simulation configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! random_seed = 0
//! stdin = "3 4\n"
//! max_steps = 1000000
//!
//! [memory]
//! capacity = 100000
//! static_percent = 10
//! temporary_offset = 100
//! temporary_capacity = 100000
//! ```

use crate::error::{Error, Result};
use crate::memory::constants::{
    DEFAULT_CAPACITY, DEFAULT_STATIC_PERCENT, DEFAULT_TEMPORARY_CAPACITY, DEFAULT_TEMPORARY_OFFSET,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sizes of the simulated address space regions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub capacity: usize,
    pub static_percent: usize,
    pub temporary_offset: u64,
    /// Initial size of the temporary region; it grows on demand
    pub temporary_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            capacity: DEFAULT_CAPACITY,
            static_percent: DEFAULT_STATIC_PERCENT,
            temporary_offset: DEFAULT_TEMPORARY_OFFSET,
            temporary_capacity: DEFAULT_TEMPORARY_CAPACITY,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.static_percent == 0 || self.static_percent >= 100 {
            return Err(Error::InvalidLayout(format!(
                "static_percent must be between 1 and 99, got {}",
                self.static_percent
            )));
        }
        if self.capacity < 64 {
            return Err(Error::InvalidLayout(format!(
                "capacity {} is too small",
                self.capacity
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub memory: MemoryConfig,
    /// Seed for `rand()` and for the garbage bytes of fresh memory
    pub random_seed: u64,
    /// Text queued for `cin` before the program starts
    pub stdin: String,
    /// Upper bound on steps taken by run-to-end
    pub max_steps: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            memory: MemoryConfig::default(),
            random_seed: 0,
            stdin: String::new(),
            max_steps: 1_000_000,
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)?;
        config.memory.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SimulationConfig::from_toml_str("").expect("empty config should parse");
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_partial_memory_table() {
        let config = SimulationConfig::from_toml_str("random_seed = 7\n[memory]\ncapacity = 2000\n")
            .expect("config should parse");
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.memory.capacity, 2000);
        assert_eq!(config.memory.static_percent, DEFAULT_STATIC_PERCENT);
    }

    #[test]
    fn test_bad_static_percent_is_rejected() {
        let result = SimulationConfig::from_toml_str("[memory]\nstatic_percent = 0\n");
        assert!(matches!(result, Err(Error::InvalidLayout(_))));
    }
}
