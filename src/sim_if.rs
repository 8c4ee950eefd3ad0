use crate::error::{SimError, SimResult};
use crate::logic::LogicVec;
use crate::signal::SimObject;
use std::cell::RefCell;
use std::rc::Rc;

// The simulation is single threaded. Every thread gets its own simulator so
// independent simulations (e.g. parallel tests) don't share state.
thread_local! {
    static SIM_IF: RefCell<Option<Rc<dyn SimIf>>> = RefCell::new(None);
}

pub fn attach(sim: Rc<dyn SimIf>) {
    SIM_IF.with(|s| s.borrow_mut().replace(sim));
}

pub fn detach() {
    SIM_IF.with(|s| s.borrow_mut().take());
}

pub fn try_current() -> Option<Rc<dyn SimIf>> {
    SIM_IF.with(|s| s.borrow().clone())
}

/// The simulator attached to this thread.
///
/// Only called from code that runs inside a simulation callback, where a
/// simulator is attached by construction.
pub fn current() -> Rc<dyn SimIf> {
    try_current().expect("no simulator attached to this thread")
}

pub fn log(msg: &str) {
    current().log(msg)
}

pub fn sim_time(unit: &str) -> SimResult<f64> {
    current().get_sim_time(unit)
}

pub fn sim_steps(time: f64, unit: &str) -> SimResult<u64> {
    current().get_sim_steps(time, unit)
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    /// Relative delay when registering, absolute time when reported back.
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

pub trait SimIf {
    fn set_value(&self, obj: &SimObject, value: LogicVec) -> SimResult<()>;
    fn get_value(&self, obj: &SimObject) -> SimResult<LogicVec>;
    fn get_object_by_name(&self, name: &str) -> SimResult<SimObject>;
    fn get_root_object(&self) -> SimResult<SimObject>;
    fn get_full_name(&self, obj: &SimObject) -> SimResult<String>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn log(&self, msg: &str);
    fn register_callback(&self, cb: SimCallback) -> SimResult<usize>;
    fn cancel_callback(&self, cb_hdl: usize) -> SimResult<()>;

    fn get_sim_time(&self, unit: &str) -> SimResult<f64> {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        Ok(ldexp10(t, self.get_sim_precision() - time_scale(unit)?))
    }

    fn get_sim_steps(&self, time: f64, unit: &str) -> SimResult<u64> {
        let precision = self.get_sim_precision();
        let steps = ldexp10(time, time_scale(unit)? - precision);
        if steps >= 0.0 && steps % 1.0 == 0.0 {
            Ok(steps as u64)
        } else {
            Err(SimError::TimePrecision {
                time,
                unit: unit.to_string(),
                precision: scale_time(precision)?.to_string(),
            })
        }
    }
}

fn time_scale(unit: &str) -> SimResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(SimError::TimeUnit(unit.to_string())),
    }
}

fn scale_time(scale: i8) -> SimResult<&'static str> {
    match scale {
        -15 => Ok("fs"),
        -12 => Ok("ps"),
        -9 => Ok("ns"),
        -6 => Ok("us"),
        -3 => Ok("ms"),
        0 => Ok("sec"),
        _ => Err(SimError::TimeUnit(format!("1e{}", scale))),
    }
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_between_units() {
        assert_eq!(ldexp10(52_083.5, 3), 52_083_500.0);
        assert_eq!(ldexp10(100_000.0, -3), 100.0);
        assert_eq!(time_scale("us").unwrap(), -6);
        assert!(time_scale("min").is_err());
        assert_eq!(scale_time(-12).unwrap(), "ps");
    }
}
