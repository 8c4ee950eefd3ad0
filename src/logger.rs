use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::sim_if;

/// Routes `log` records through the attached simulator's log sink, which
/// prefixes them with the simulation time.
pub struct SimLogger;

static LOGGER: SimLogger = SimLogger;

/// Installs the logger. Fails if another logger is already installed.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

impl Log for SimLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = format!("{:<5} {}", record.level(), record.args());
        match sim_if::try_current() {
            Some(sim) => sim.log(&msg),
            None => eprintln!("{}", msg),
        }
    }

    fn flush(&self) {}
}
