//! Testbench for the UART capitalizer.
//!
//! Random printable strings are sent into `rx_serial` one character at a time
//! while a forked receive task collects the device's answer from `tx_serial`.
//! Every received byte must be the capitalized version of the byte sent.

use futures::future::{self, Either};
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, Rng};
use std::rc::Rc;

use crate::capitalizer::{capitalize, CapitalizerModel};
use crate::config::TbConfig;
use crate::kernel::{Kernel, KernelBuilder, Model};
use crate::prelude::*;
use crate::testbench::{self, Scoreboard};
use crate::uart::{uart_rx, uart_tx, UartTiming};
use crate::RunOptions;

/// Name of the top-level scope the device's pins live in.
pub const ROOT: &str = "uart_capitalizer";

const PUNCTUATION: &[u8] = br##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;

static CHARSET: Lazy<Vec<u8>> = Lazy::new(|| {
    (b'a'..=b'z')
        .chain(b'A'..=b'Z')
        .chain(b'0'..=b'9')
        .chain(PUNCTUATION.iter().copied())
        .collect()
});

/// Elaborates a kernel with the capitalizer model.
pub fn build_kernel(cfg: &TbConfig) -> SimResult<Rc<Kernel>> {
    build_kernel_with(CapitalizerModel::new(cfg.clk_freq_hz, cfg.baud_rate))
}

/// Elaborates a kernel with `model` standing in for the capitalizer.
pub fn build_kernel_with(model: impl Model + 'static) -> SimResult<Rc<Kernel>> {
    let mut builder = KernelBuilder::new(ROOT);
    builder.model(model)?;
    Ok(builder.build())
}

pub fn capitalizer_tests(cfg: &TbConfig) -> RstbTests {
    let cfg = cfg.clone();
    let mut tests = RstbTests::new();
    tests.push(Test::new("uart_capitalizer_test", move |dut| {
        uart_capitalizer_test(dut, cfg.clone()).boxed()
    }));
    tests
}

pub fn run_options(cfg: &TbConfig) -> RunOptions {
    RunOptions {
        suite: ROOT.to_string(),
        test_timeout_ns: cfg.test_timeout_ns,
        results_xml: cfg.results_xml.clone(),
    }
}

/// Outcome of sending one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRecord {
    pub input: String,
    pub expected: Vec<u8>,
    pub received: Vec<u8>,
    /// Mismatched plus missing bytes.
    pub errors: usize,
}

pub struct CapitalizerTb {
    pub clk: SimObject,
    pub rst_n: SimObject,
    pub ena: SimObject,
    pub rx_serial: SimObject,
    pub tx_serial: SimObject,
    cfg: TbConfig,
    timing: UartTiming,
    clk_period: u64,
    rng: StdRng,
}

impl CapitalizerTb {
    pub fn new(dut: SimObject, cfg: TbConfig) -> SimResult<Self> {
        let (rng, seed) = utils::seeded_rng(cfg.seed);
        log::info!("Random seed: {}", seed);
        Ok(CapitalizerTb {
            clk: dut.c("clk")?,
            rst_n: dut.c("rst_n")?,
            ena: dut.c("ena")?,
            rx_serial: dut.c("rx_serial")?,
            tx_serial: dut.c("tx_serial")?,
            timing: UartTiming::new(cfg.baud_period_ns())?,
            clk_period: sim_if::sim_steps(cfg.clk_period_ps() as f64, "ps")?,
            cfg,
            rng,
        })
    }

    pub fn clk_period(&self) -> u64 {
        self.clk_period
    }

    pub async fn reset(&self) -> SimResult<()> {
        self.rst_n.set(0)?;
        self.ena.set(1)?;
        self.rx_serial.set(1)?;
        Trigger::timer_steps(self.clk_period * self.cfg.reset_cycles as u64).await;
        self.rst_n.set(1)?;
        utils::clock_cycles(self.clk, self.cfg.settle_cycles).await;
        Ok(())
    }

    /// Letters, digits and punctuation, length within the configured range.
    pub fn random_string(&mut self) -> String {
        let len = self.rng.gen_range(self.cfg.min_len..=self.cfg.max_len);
        (0..len)
            .map(|_| CHARSET[self.rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    }

    /// Sends one random string and checks the device's answer.
    ///
    /// A frame the receiver can't decode fails the whole test.
    pub async fn run_iteration(&mut self, index: u32) -> Result<TestRecord, Val> {
        let n = index + 1;
        let input = self.random_string();
        let expected: Vec<u8> = input.bytes().map(capitalize).collect();
        log::info!("Test {}: sending '{}' ({} chars)", n, input, input.len());

        let received = RstbObj::new(Vec::with_capacity(expected.len()));
        let rx = Task::fork(receive_bytes(
            n,
            self.tx_serial,
            self.timing,
            expected.len(),
            received.clone(),
        ));

        for byte in input.bytes() {
            log::info!("Test {}: Sending char: {} ({:#04x})", n, byte as char, byte);
            uart_tx(self.rx_serial, byte, self.timing).await?;
            if self.cfg.char_gap_bauds > 0 {
                Trigger::timer_steps(self.timing.baud * self.cfg.char_gap_bauds).await;
            }
        }

        let timeout = Trigger::timer_steps(self.timing.baud * self.cfg.rx_timeout_bauds.max(1));
        match future::select(rx, timeout).await {
            Either::Left((Ok(_), _)) => {}
            Either::Left((Err(e), _)) => return Err(e),
            Either::Right(((), rx)) => {
                log::error!(
                    "Test {}: Timed out after {} baud periods waiting for the answer",
                    n,
                    self.cfg.rx_timeout_bauds
                );
                rx.cancel();
            }
        }
        let received = received.get().clone();

        let mut sb = Scoreboard::new();
        for (i, &exp) in expected.iter().enumerate() {
            sb.add_exp(exp);
            match received.get(i) {
                Some(&recv) => {
                    sb.add_recv(recv);
                    if recv == exp {
                        log::info!("Test {}: Match at index {}: {} ({:#04x})", n, i, recv as char, recv);
                    } else {
                        log::error!(
                            "Test {}: Mismatch at index {}: expected {} ({:#04x}), got {} ({:#04x})",
                            n,
                            i,
                            exp as char,
                            exp,
                            recv as char,
                            recv
                        );
                    }
                }
                None => log::error!(
                    "Test {}: Missing byte at index {}: expected {} ({:#04x})",
                    n,
                    i,
                    exp as char,
                    exp
                ),
            }
        }
        let errors = sb.errors() as usize + sb.missing() + sb.unexpected();
        if errors == 0 {
            log::info!("Test {} passed: {}", n, sb.result_str());
        } else {
            log::error!("Test {} failed with {} errors: {}", n, errors, sb.result_str());
        }

        Trigger::timer(self.cfg.test_gap_ns, "ns")?.await;
        Ok(TestRecord {
            input,
            expected,
            received,
            errors,
        })
    }
}

// A frame that can't be decoded ends the test right away, even while the
// transmitter is still sending.
async fn receive_bytes(
    n: u32,
    line: SimObject,
    timing: UartTiming,
    count: usize,
    received: RstbObj<Vec<u8>>,
) -> RstbResult {
    for _ in 0..count {
        let byte = match uart_rx(line, timing).await {
            Ok(byte) => byte,
            Err(e) => {
                log::error!("Test {}: {}", n, e);
                fail_test(&e.to_string());
                return Err(e.into());
            }
        };
        log::info!("Test {}: Received char: {} ({:#04x})", n, byte as char, byte);
        received.get().push(byte);
    }
    Ok(Val::Int(count as i64))
}

/// Sends `num_tests` random strings through the device and fails if any byte
/// came back wrong or not at all.
pub async fn uart_capitalizer_test(dut: SimObject, cfg: TbConfig) -> RstbResult {
    let num_tests = cfg.num_tests;
    let mut tb = CapitalizerTb::new(dut, cfg)?;
    Task::fork(testbench::clock(tb.clk, tb.clk_period()));
    tb.reset().await?;

    let mut total_errors = 0;
    for i in 0..num_tests {
        let record = tb.run_iteration(i).await?;
        total_errors += record.errors;
    }

    if total_errors == 0 {
        Ok(Val::String(format!("All {} tests passed", num_tests)))
    } else {
        Err(Val::String(format!(
            "Total errors: {} across {} tests.",
            total_errors, num_tests
        )))
    }
}
