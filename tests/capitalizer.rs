use uart_capitalizer_tb::capitalizer::CapitalizerModel;
use uart_capitalizer_tb::config::TbConfig;
use uart_capitalizer_tb::error::SimResult;
use uart_capitalizer_tb::kernel::{Elaboration, Model, ModelContext};
use uart_capitalizer_tb::logic::{Logic, LogicVec};
use uart_capitalizer_tb::test::RstbTests;
use uart_capitalizer_tb::{run, tb, RstbResult};

fn fast_config(num_tests: u32) -> TbConfig {
    TbConfig {
        baud_rate: 115_200,
        num_tests,
        seed: Some(1234),
        results_xml: None,
        ..TbConfig::default()
    }
}

fn run_with(cfg: &TbConfig, model: impl Model + 'static) -> RstbTests {
    let kernel = tb::build_kernel_with(model).unwrap();
    run(&kernel, tb::capitalizer_tests(cfg), &tb::run_options(cfg)).unwrap()
}

fn only_result(tests: &RstbTests) -> RstbResult {
    assert_eq!(tests.len(), 1);
    tests.iter().next().unwrap().result.clone().unwrap()
}

// Has the pins but never answers.
struct SilentModel;

impl Model for SilentModel {
    fn elaborate(&mut self, elab: &mut Elaboration<'_>) -> SimResult<()> {
        for name in ["clk", "rst_n", "ena", "rx_serial", "tx_serial"] {
            elab.net(name, 1)?;
        }
        Ok(())
    }

    fn evaluate(&mut self, _ctx: &mut ModelContext<'_>) {}
}

// Pulls tx_serial low for good once the first start bit arrives.
#[derive(Default)]
struct StuckLowModel {
    clk: usize,
    rst_n: usize,
    rx_serial: usize,
    tx_serial: usize,
    stuck: bool,
}

impl Model for StuckLowModel {
    fn elaborate(&mut self, elab: &mut Elaboration<'_>) -> SimResult<()> {
        self.clk = elab.net("clk", 1)?;
        self.rst_n = elab.net("rst_n", 1)?;
        elab.net("ena", 1)?;
        self.rx_serial = elab.net("rx_serial", 1)?;
        self.tx_serial = elab.net("tx_serial", 1)?;
        elab.sensitive_to(self.clk);
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut ModelContext<'_>) {
        if !ctx.rose(self.clk) {
            return;
        }
        if ctx.level(self.rst_n) != Logic::One {
            self.stuck = false;
            ctx.drive(self.tx_serial, LogicVec::from_bit(Logic::One));
        } else if !self.stuck && ctx.level(self.rx_serial) == Logic::Zero {
            self.stuck = true;
            ctx.drive(self.tx_serial, LogicVec::from_bit(Logic::Zero));
        }
    }
}

#[test]
fn passes_against_the_capitalizer() {
    let cfg = fast_config(3);
    let tests = run_with(&cfg, CapitalizerModel::new(cfg.clk_freq_hz, cfg.baud_rate));
    let result = only_result(&tests);
    assert_eq!(result.unwrap().to_string(), "All 3 tests passed");
    let test = tests.iter().next().unwrap();
    assert!(test.passed());
    assert!(test.sim_time_ns > 0.0);
}

#[test]
fn passes_at_the_default_baud_rate() {
    let cfg = TbConfig {
        num_tests: 1,
        min_len: 5,
        max_len: 5,
        seed: Some(99),
        results_xml: None,
        ..TbConfig::default()
    };
    let kernel = tb::build_kernel(&cfg).unwrap();
    let tests = run(&kernel, tb::capitalizer_tests(&cfg), &tb::run_options(&cfg)).unwrap();
    assert!(only_result(&tests).is_ok());
}

#[test]
fn fails_when_nothing_is_capitalized() {
    // long strings, so lowercase letters are all but certain
    let cfg = TbConfig {
        min_len: 30,
        max_len: 30,
        ..fast_config(2)
    };
    let model = CapitalizerModel::with_transform(cfg.clk_freq_hz, cfg.baud_rate, |b| b);
    let err = only_result(&run_with(&cfg, model)).unwrap_err().to_string();
    assert!(err.starts_with("Total errors: "), "{}", err);
    assert!(err.ends_with(" across 2 tests."), "{}", err);
}

#[test]
fn counts_every_corrupted_byte() {
    let cfg = TbConfig {
        min_len: 6,
        max_len: 6,
        ..fast_config(2)
    };
    let model = CapitalizerModel::with_transform(cfg.clk_freq_hz, cfg.baud_rate, |b| b ^ 0x01);
    let err = only_result(&run_with(&cfg, model)).unwrap_err();
    assert_eq!(err.to_string(), "Total errors: 12 across 2 tests.");
}

#[test]
fn missing_answers_time_out() {
    let cfg = TbConfig {
        min_len: 5,
        max_len: 5,
        ..fast_config(1)
    };
    let err = only_result(&run_with(&cfg, SilentModel)).unwrap_err();
    assert_eq!(err.to_string(), "Total errors: 5 across 1 tests.");
}

#[test]
fn bad_stop_bit_fails_the_test_at_once() {
    let cfg = TbConfig {
        min_len: 5,
        max_len: 5,
        ..fast_config(3)
    };
    let tests = run_with(&cfg, StuckLowModel::default());
    let err = only_result(&tests).unwrap_err();
    assert_eq!(err.to_string(), "Stop bit not detected or undefined");
    // well before the first 5 characters are even sent
    let test = tests.iter().next().unwrap();
    assert!(!test.passed());
    assert!(test.sim_time_ns < 200_000.0, "{}", test.sim_time_ns);
}

#[test]
fn fails_a_test_that_runs_too_long() {
    let cfg = TbConfig {
        test_timeout_ns: Some(5_000),
        ..fast_config(1)
    };
    let tests = run_with(&cfg, CapitalizerModel::new(cfg.clk_freq_hz, cfg.baud_rate));
    let err = only_result(&tests).unwrap_err();
    assert_eq!(err.to_string(), "test exceeded 5000 ns of simulated time");
}

#[test]
fn writes_a_junit_report() {
    let path = std::env::temp_dir()
        .join(format!("uart_capitalizer_tb_{}", std::process::id()))
        .join("results.xml");
    let cfg = TbConfig {
        results_xml: Some(path.clone()),
        ..fast_config(1)
    };
    run_with(&cfg, CapitalizerModel::new(cfg.clk_freq_hz, cfg.baud_rate));
    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("uart_capitalizer_test"));
    assert!(xml.contains("uart_capitalizer"));
    std::fs::remove_file(&path).unwrap();
}
