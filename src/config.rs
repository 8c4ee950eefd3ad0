//! Testbench configuration.
//!
//! Every key is optional; the defaults match the capitalizer's hardware
//! configuration (10 MHz clock, 9600 baud).
//!
//! ```toml
//! baud_rate = 115200
//! num_tests = 3
//! seed = 42
//! ```

use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TbConfig {
    pub clk_freq_hz: u64,
    pub baud_rate: u64,
    /// Random strings sent per test run.
    pub num_tests: u32,
    pub min_len: usize,
    pub max_len: usize,
    /// Clock periods `rst_n` is held low.
    pub reset_cycles: u32,
    /// Rising clock edges to wait after reset release.
    pub settle_cycles: u32,
    /// Idle baud periods between two transmitted characters.
    pub char_gap_bauds: u64,
    pub test_gap_ns: u64,
    /// Baud periods the receiver may lag behind the last transmitted character.
    pub rx_timeout_bauds: u64,
    /// Fixed seed for the string generator, random if unset.
    pub seed: Option<u64>,
    /// Simulated time after which a test is failed.
    pub test_timeout_ns: Option<u64>,
    pub results_xml: Option<PathBuf>,
    pub log_level: String,
}

impl Default for TbConfig {
    fn default() -> Self {
        TbConfig {
            clk_freq_hz: 10_000_000,
            baud_rate: 9600,
            num_tests: 10,
            min_len: 5,
            max_len: 20,
            reset_cycles: 100,
            settle_cycles: 10,
            char_gap_bauds: 2,
            test_gap_ns: 1000,
            rx_timeout_bauds: 40,
            seed: None,
            test_timeout_ns: None,
            results_xml: Some(PathBuf::from("results.xml")),
            log_level: "info".to_string(),
        }
    }
}

impl TbConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TbConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 || self.clk_freq_hz == 0 {
            return Err(ConfigError::Invalid(
                "clock frequency and baud rate must be non-zero".to_string(),
            ));
        }
        if self.clk_freq_hz < 2 * self.baud_rate {
            return Err(ConfigError::Invalid(format!(
                "baud rate {} is too fast for a {} Hz clock",
                self.baud_rate, self.clk_freq_hz
            )));
        }
        if 1_000_000_000_000 % self.clk_freq_hz != 0 {
            return Err(ConfigError::Invalid(format!(
                "clock period of {} Hz is not a whole number of picoseconds",
                self.clk_freq_hz
            )));
        }
        if self.min_len == 0 || self.min_len > self.max_len {
            return Err(ConfigError::Invalid(format!(
                "string length range {}..={} is empty",
                self.min_len, self.max_len
            )));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn clk_period_ps(&self) -> u64 {
        1_000_000_000_000 / self.clk_freq_hz
    }

    /// Baud period rounded to whole nanoseconds.
    pub fn baud_period_ns(&self) -> u64 {
        (1e9 / self.baud_rate as f64).round() as u64
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }
}
