//! Error types shared by the simulator interface, the kernel and the configuration layer.

use std::io;
use std::path::PathBuf;

/// Errors raised while talking to the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// No object with this full name exists in the hierarchy.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A handle that does not belong to the attached simulator.
    #[error("invalid object handle {0}")]
    InvalidHandle(usize),

    /// The object is a scope and carries no value.
    #[error("{name} is not a signal")]
    NotASignal { name: String },

    /// An object with this full name was declared twice with different widths.
    #[error("width mismatch on {name}: expected {expected} bits, got {got}")]
    WidthMismatch {
        name: String,
        expected: u32,
        got: u32,
    },

    /// The signal holds X or Z bits where a plain integer was requested.
    #[error("value of {name} is not resolvable: {value}")]
    Unresolvable { name: String, value: String },

    /// A string could not be parsed as a logic vector.
    #[error("invalid logic value '{0}'")]
    InvalidValue(String),

    #[error("unknown time unit '{0}'")]
    TimeUnit(String),

    /// The requested time is not a whole number of simulator steps.
    #[error("can't convert {time} {unit} to sim steps without rounding (sim precision: {precision})")]
    TimePrecision {
        time: f64,
        unit: String,
        precision: String,
    },

    /// Signals can't be written while read-only callbacks run.
    #[error("write to {name} during the read-only phase")]
    ReadOnlyPhase { name: String },

    #[error("unknown callback handle {0}")]
    UnknownCallback(usize),

    /// Zero-delay activity did not settle, usually a combinational loop in a model.
    #[error("delta cycle limit exceeded at {time} steps (max {max} deltas)")]
    DeltaCycleLimit { time: u64, max: u32 },

    #[error("failed to write report: {0}")]
    Report(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type SimResult<T> = Result<T, SimError>;

/// Errors raised while loading or validating the testbench configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
