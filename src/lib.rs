pub mod capitalizer;
pub mod config;
pub mod error;
mod executor;
mod junit;
pub mod kernel;
pub mod logger;
pub mod logic;
pub mod prelude;
mod rstb_obj;
mod signal;
pub mod sim_if;
pub mod tb;
pub mod test;
pub mod testbench;
mod trigger;
pub mod uart;
pub mod utils;
mod value;

use error::SimResult;
use executor::Task;
use kernel::Kernel;
use prettytable::{Cell, Row, Table};
use signal::SimObject;
use sim_if::SimIf;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time;
use test::RstbTests;
use value::Val;

pub type RstbResult = Result<Val, Val>;

struct CurrentTest {
    task: Arc<Task>,
    result: Option<RstbResult>,
}

thread_local! {
    static CURRENT_TEST: RefCell<Option<CurrentTest>> = RefCell::new(None);
}

/// Passes the running test, unless it already passed or failed, and stops all its tasks.
pub fn pass_test(msg: &str) {
    finish_test(Ok(Val::String(msg.to_string())));
}

/// Fails the running test, unless it already passed or failed, and stops all its tasks.
pub fn fail_test(msg: &str) {
    finish_test(Err(Val::String(msg.to_string())));
}

fn finish_test(result: RstbResult) {
    let task = CURRENT_TEST.with(|c| match c.borrow_mut().as_mut() {
        Some(current) if current.result.is_none() => {
            current.result = Some(result);
            Some(current.task.clone())
        }
        _ => None,
    });
    if let Some(task) = task {
        tear_down_test(task);
    }
}

fn tear_down_test(test: Arc<Task>) {
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
    test.cancel();
}

fn take_test_result() -> Option<RstbResult> {
    CURRENT_TEST.with(|c| {
        let mut current = c.borrow_mut();
        match current.as_ref().map(|t| t.result.is_some()) {
            Some(true) => current.take().and_then(|t| t.result),
            _ => None,
        }
    })
}

/// Options for [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Name of the JUnit test suite.
    pub suite: String,
    /// Simulated time after which a test is failed.
    pub test_timeout_ns: Option<u64>,
    pub results_xml: Option<PathBuf>,
}

/// Runs `tests` one after another on `kernel` and reports the results.
///
/// Simulation time carries over from one test to the next. A test ends when its
/// future completes, when it calls [`pass_test`]/[`fail_test`], when it exceeds
/// the timeout or when the simulation runs out of events.
pub fn run(kernel: &Rc<Kernel>, mut tests: RstbTests, opts: &RunOptions) -> SimResult<RstbTests> {
    sim_if::attach(kernel.clone());
    let result = run_attached(kernel, &mut tests, opts);
    sim_if::detach();
    result.map(|()| tests)
}

fn run_attached(kernel: &Rc<Kernel>, tests: &mut RstbTests, opts: &RunOptions) -> SimResult<()> {
    let sim_start = time::Instant::now();
    let dut = SimObject::get_root()?;

    for test in tests.iter_mut() {
        start_of_test(kernel, dut, test, opts)?;
    }
    end_of_simulation(kernel, tests, sim_start.elapsed().as_secs_f64(), opts)
}

fn start_of_test(
    kernel: &Rc<Kernel>,
    dut: SimObject,
    test: &mut test::Test,
    opts: &RunOptions,
) -> SimResult<()> {
    log::info!("Running test {}", test.name);
    let time_start = time::Instant::now();
    let sim_time_start = sim_if::sim_time("ns")?;
    let deadline = match opts.test_timeout_ns {
        Some(ns) => Some(kernel.get_sim_time_steps() + sim_if::sim_steps(ns as f64, "ns")?),
        None => None,
    };

    let generator = test.start(dut);
    let handle = Task::spawn(
        async move {
            match generator.await {
                Ok(val) => pass_test(&val.to_string()),
                Err(val) => fail_test(&val.to_string()),
            }
            Ok(Val::None)
        },
        &test.name,
    );
    let task = handle.task().expect("spawned task has a handle");
    CURRENT_TEST.with(|c| c.borrow_mut().replace(CurrentTest { task, result: None }));

    // first tick
    executor::run_once();
    let mut outcome = kernel.settle();
    let result = loop {
        if let Err(e) = outcome {
            fail_test(&e.to_string());
        }
        if let Some(result) = take_test_result() {
            break result;
        }
        outcome = match (deadline, kernel.next_event_time()) {
            (Some(deadline), Some(next)) if next > deadline => {
                fail_test(&format!(
                    "test exceeded {} ns of simulated time",
                    opts.test_timeout_ns.unwrap_or_default()
                ));
                Ok(())
            }
            _ => match kernel.step() {
                Ok(true) => Ok(()),
                Ok(false) => {
                    fail_test("simulation ran out of events before the test finished");
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
    };

    test.time_secs = time_start.elapsed().as_secs_f64();
    test.sim_time_ns = sim_if::sim_time("ns")? - sim_time_start;
    match &result {
        Ok(val) => log::info!("Test {} passed: {}", test.name, val),
        Err(val) => log::error!("Test {} failed: {}", test.name, val),
    }
    test.result = Some(result);
    Ok(())
}

fn end_of_simulation(
    kernel: &Kernel,
    tests: &RstbTests,
    duration: f64,
    opts: &RunOptions,
) -> SimResult<()> {
    let final_sim_time = kernel.get_sim_time("ns")?;

    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("TEST"),
        Cell::new("RESULT"),
        Cell::new("REAL TIME (s)"),
        Cell::new("SIM TIME (ns)"),
        Cell::new("SIM SPEED (ns/s)"),
    ]));
    for test in tests.iter() {
        let result_str = if test.passed() { "passed" } else { "failed" };
        table.add_row(Row::new(vec![
            Cell::new(&test.name),
            Cell::new(result_str),
            Cell::new(&format!("{:.3}", test.time_secs)),
            Cell::new(&format!("{:.0}", test.sim_time_ns)),
            Cell::new(&format!("{:.3}", test.sim_time_ns / test.time_secs.max(f64::EPSILON))),
        ]));
    }
    log::info!("Test summary\n{}", table);
    log::info!("Simulation time: {:.3} ns", final_sim_time);
    log::info!("Real time: {:.3} s", duration);
    log::info!(
        "Simulation speed: {:.3} ns/s",
        final_sim_time / duration.max(f64::EPSILON)
    );

    if let Some(path) = &opts.results_xml {
        junit::create_junit_xml(&opts.suite, tests, path)?;
    }
    Ok(())
}

