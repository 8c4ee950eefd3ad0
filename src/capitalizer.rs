//! Behavioral model of the UART capitalizer.
//!
//! The device receives 8N1 frames on `rx_serial`, upper-cases ASCII letters
//! and sends the result back out on `tx_serial`. Everything happens on the
//! rising edge of `clk`; `rst_n` is an active-low synchronous reset and `ena`
//! freezes both state machines while low.

use std::collections::VecDeque;

use crate::error::SimResult;
use crate::kernel::{Elaboration, Model, ModelContext};
use crate::logic::{Logic, LogicVec};

pub const FIFO_DEPTH: usize = 16;

/// `b'a'..=b'z'` become upper case, every other byte passes unchanged.
pub fn capitalize(b: u8) -> u8 {
    match b {
        b'a'..=b'z' => b - 32,
        _ => b,
    }
}

#[derive(Default, Clone, Copy)]
struct Ports {
    clk: usize,
    rst_n: usize,
    ena: usize,
    rx_serial: usize,
    tx_serial: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    StartBit,
    Data { bit: u8 },
    StopBit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    StartBit { byte: u8 },
    Data { byte: u8, bit: u8 },
    StopBit,
}

pub struct CapitalizerModel {
    clks_per_bit: u32,
    transform: fn(u8) -> u8,
    ports: Ports,
    rx_state: RxState,
    rx_count: u32,
    rx_byte: u8,
    tx_state: TxState,
    tx_count: u32,
    tx_level: Option<bool>,
    fifo: VecDeque<u8>,
}

impl CapitalizerModel {
    pub fn new(clk_freq_hz: u64, baud_rate: u64) -> Self {
        CapitalizerModel::with_transform(clk_freq_hz, baud_rate, capitalize)
    }

    /// A model that applies `transform` instead of [`capitalize`] to every byte.
    pub fn with_transform(clk_freq_hz: u64, baud_rate: u64, transform: fn(u8) -> u8) -> Self {
        let clks_per_bit = (clk_freq_hz / baud_rate.max(1)).max(2) as u32;
        CapitalizerModel {
            clks_per_bit,
            transform,
            ports: Ports::default(),
            rx_state: RxState::Idle,
            rx_count: 0,
            rx_byte: 0,
            tx_state: TxState::Idle,
            tx_count: 0,
            tx_level: None,
            fifo: VecDeque::with_capacity(FIFO_DEPTH),
        }
    }

    pub fn clks_per_bit(&self) -> u32 {
        self.clks_per_bit
    }

    fn reset(&mut self) {
        self.rx_state = RxState::Idle;
        self.rx_count = 0;
        self.rx_byte = 0;
        self.tx_state = TxState::Idle;
        self.tx_count = 0;
        self.fifo.clear();
    }

    // Counts clock cycles within a bit. Returns true once the bit time is over.
    fn bit_done(count: &mut u32, limit: u32) -> bool {
        if *count < limit - 1 {
            *count += 1;
            false
        } else {
            *count = 0;
            true
        }
    }

    fn step_rx(&mut self, rx: Logic) {
        let cpb = self.clks_per_bit;
        match self.rx_state {
            RxState::Idle => {
                self.rx_count = 0;
                if rx == Logic::Zero {
                    self.rx_state = RxState::StartBit;
                }
            }
            RxState::StartBit => {
                // check the middle of the start bit
                if self.rx_count == (cpb - 1) / 2 {
                    self.rx_count = 0;
                    self.rx_byte = 0;
                    self.rx_state = match rx {
                        Logic::Zero => RxState::Data { bit: 0 },
                        _ => RxState::Idle,
                    };
                } else {
                    self.rx_count += 1;
                }
            }
            RxState::Data { bit } => {
                if Self::bit_done(&mut self.rx_count, cpb) {
                    if rx == Logic::One {
                        self.rx_byte |= 1 << bit;
                    }
                    self.rx_state = match bit {
                        7 => RxState::StopBit,
                        _ => RxState::Data { bit: bit + 1 },
                    };
                }
            }
            RxState::StopBit => {
                if Self::bit_done(&mut self.rx_count, cpb) {
                    self.rx_state = RxState::Idle;
                    if rx == Logic::One {
                        self.push((self.transform)(self.rx_byte));
                    } else {
                        log::debug!("Framing error, dropping byte {:#04x}", self.rx_byte);
                    }
                }
            }
        }
    }

    fn push(&mut self, byte: u8) {
        if self.fifo.len() < FIFO_DEPTH {
            self.fifo.push_back(byte);
        } else {
            log::warn!("Capitalizer FIFO full, dropping byte {:#04x}", byte);
        }
    }

    // Returns the level tx_serial has to show after this clock edge.
    fn step_tx(&mut self) -> bool {
        let cpb = self.clks_per_bit;
        match self.tx_state {
            TxState::Idle => {
                if let Some(byte) = self.fifo.pop_front() {
                    self.tx_count = 0;
                    self.tx_state = TxState::StartBit { byte };
                    return false;
                }
                true
            }
            TxState::StartBit { byte } => {
                if Self::bit_done(&mut self.tx_count, cpb) {
                    self.tx_state = TxState::Data { byte, bit: 0 };
                    return byte & 1 == 1;
                }
                false
            }
            TxState::Data { byte, bit } => {
                if Self::bit_done(&mut self.tx_count, cpb) {
                    if bit == 7 {
                        self.tx_state = TxState::StopBit;
                        return true;
                    }
                    self.tx_state = TxState::Data { byte, bit: bit + 1 };
                    return (byte >> (bit + 1)) & 1 == 1;
                }
                (byte >> bit) & 1 == 1
            }
            TxState::StopBit => {
                if Self::bit_done(&mut self.tx_count, cpb) {
                    self.tx_state = TxState::Idle;
                }
                true
            }
        }
    }

    fn drive_tx(&mut self, ctx: &mut ModelContext<'_>, level: bool) {
        if self.tx_level != Some(level) {
            self.tx_level = Some(level);
            ctx.drive(self.ports.tx_serial, LogicVec::from_bit(level.into()));
        }
    }
}

impl Model for CapitalizerModel {
    fn elaborate(&mut self, elab: &mut Elaboration<'_>) -> SimResult<()> {
        self.ports = Ports {
            clk: elab.net("clk", 1)?,
            rst_n: elab.net("rst_n", 1)?,
            ena: elab.net("ena", 1)?,
            rx_serial: elab.net("rx_serial", 1)?,
            tx_serial: elab.net("tx_serial", 1)?,
        };
        elab.sensitive_to(self.ports.clk);
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut ModelContext<'_>) {
        if !ctx.rose(self.ports.clk) {
            return;
        }
        if ctx.level(self.ports.rst_n) != Logic::One {
            self.reset();
            self.drive_tx(ctx, true);
            return;
        }
        if ctx.level(self.ports.ena) != Logic::One {
            return;
        }
        let rx = ctx.level(self.ports.rx_serial);
        self.step_rx(rx);
        let level = self.step_tx();
        self.drive_tx(ctx, level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, KernelBuilder};
    use crate::signal::SimObject;
    use crate::sim_if::SimIf;
    use std::rc::Rc;
    use test_case::test_case;

    fn frame_of(byte: u8) -> Vec<bool> {
        let mut levels = vec![false];
        levels.extend((0..8).map(|i| (byte >> i) & 1 == 1));
        levels.push(true);
        levels
    }

    // Samples a frame in the middle of every bit, 4 clocks per bit.
    fn decode(tx: &[Logic]) -> Option<u8> {
        let start = tx.iter().position(|&l| l == Logic::Zero)?;
        let sampled: Vec<Logic> = (0..10).map(|i| tx[start + 2 + 4 * i]).collect();
        if sampled[0] != Logic::Zero || sampled[9] != Logic::One {
            return None;
        }
        sampled[1..9]
            .iter()
            .rev()
            .try_fold(0u8, |b, l| l.to_bool().map(|l| b << 1 | l as u8))
    }

    /// The model elaborated in a kernel at 4 clocks per bit, clocked by hand.
    struct Bench {
        kernel: Rc<Kernel>,
        clk: SimObject,
        rst_n: SimObject,
        ena: SimObject,
        rx_serial: SimObject,
        tx_serial: SimObject,
    }

    impl Bench {
        fn new() -> Self {
            let mut kb = KernelBuilder::new("dut");
            kb.model(CapitalizerModel::new(4, 1)).unwrap();
            let kernel = kb.build();
            let obj = |name: &str| kernel.get_object_by_name(&format!("dut.{}", name)).unwrap();
            let (clk, rst_n, ena) = (obj("clk"), obj("rst_n"), obj("ena"));
            let (rx_serial, tx_serial) = (obj("rx_serial"), obj("tx_serial"));
            Bench {
                kernel,
                clk,
                rst_n,
                ena,
                rx_serial,
                tx_serial,
            }
        }

        fn set(&self, obj: SimObject, val: u32) {
            self.kernel.set_value(&obj, LogicVec::from_u32(val, 1)).unwrap();
            self.kernel.settle().unwrap();
        }

        fn tx(&self) -> Logic {
            self.kernel.get_value(&self.tx_serial).unwrap().lsb()
        }

        /// One clock cycle, returns `tx_serial` after the rising edge.
        fn tick(&self) -> Logic {
            self.set(self.clk, 0);
            self.set(self.clk, 1);
            self.tx()
        }

        fn reset(&self) {
            self.set(self.rst_n, 0);
            self.set(self.ena, 1);
            self.set(self.rx_serial, 1);
            self.tick();
            self.set(self.rst_n, 1);
        }

        /// Holds every level on `rx_serial` for one bit time.
        fn send(&self, levels: &[bool]) -> Vec<Logic> {
            let mut tx = Vec::new();
            for &level in levels {
                self.set(self.rx_serial, level as u32);
                tx.extend((0..4).map(|_| self.tick()));
            }
            tx
        }
    }

    #[test_case(b'a', b'A' ; "first lowercase")]
    #[test_case(b'z', b'Z' ; "last lowercase")]
    #[test_case(b'm', b'M' ; "middle lowercase")]
    #[test_case(b'A', b'A' ; "uppercase")]
    #[test_case(b'0', b'0' ; "digit")]
    #[test_case(b'{', b'{' ; "just above lowercase")]
    #[test_case(b'`', b'`' ; "just below lowercase")]
    #[test_case(0xe1, 0xe1 ; "non ascii")]
    fn capitalizes(input: u8, expected: u8) {
        assert_eq!(capitalize(input), expected);
    }

    #[test]
    fn only_lowercase_letters_change() {
        for b in 0..=255u8 {
            match b {
                b'a'..=b'z' => assert_eq!(capitalize(b), b - 32),
                _ => assert_eq!(capitalize(b), b),
            }
        }
    }

    #[test_case(10_000_000, 9600, 1041 ; "default baud")]
    #[test_case(10_000_000, 115_200, 86 ; "fast baud")]
    #[test_case(1000, 1000, 2 ; "clamped")]
    fn clocks_per_bit(clk: u64, baud: u64, expected: u32) {
        assert_eq!(CapitalizerModel::new(clk, baud).clks_per_bit(), expected);
    }

    // Drives the state machines directly, one call per clock cycle.
    #[test]
    fn loops_a_frame_back() {
        let mut model = CapitalizerModel::new(4, 1);
        let mut levels = vec![true; 3];
        let frame = [false, true, false, false, false, false, true, true, false, true];
        // b'a' = 0x61, LSB first: 1 0 0 0 0 1 1 0
        assert_eq!(frame[1..9].iter().rev().fold(0u8, |b, &l| b << 1 | l as u8), b'a');
        for level in frame.iter().chain([true; 4].iter()) {
            for _ in 0..4 {
                model.step_rx(Logic::from(*level));
                levels.push(model.step_tx());
            }
        }
        assert_eq!(model.fifo.len(), 0);
        for _ in 0..48 {
            levels.push(model.step_tx());
        }
        // sample the transmitted frame in the middle of every bit
        let start = levels.iter().position(|l| !l).unwrap();
        let sampled: Vec<bool> = (0..10).map(|i| levels[start + 2 + 4 * i]).collect();
        let byte = sampled[1..9].iter().rev().fold(0u8, |b, &l| b << 1 | l as u8);
        assert!(!sampled[0]);
        assert!(sampled[9]);
        assert_eq!(byte, b'A');
    }

    #[test]
    fn full_fifo_drops_bytes() {
        let mut model = CapitalizerModel::new(4, 1);
        for byte in b'a'..=b'q' {
            for &level in frame_of(byte).iter().chain([true].iter()) {
                for _ in 0..4 {
                    model.step_rx(Logic::from(level));
                }
            }
        }
        assert_eq!(model.fifo.len(), FIFO_DEPTH);
        assert_eq!(model.fifo.front(), Some(&b'A'));
        assert_eq!(model.fifo.back(), Some(&b'P'));

        model.push(b'!');
        assert_eq!(model.fifo.len(), FIFO_DEPTH);
        assert_eq!(model.fifo.back(), Some(&b'P'));
    }

    #[test]
    fn answers_through_the_kernel() {
        let bench = Bench::new();
        assert_eq!(bench.tx(), Logic::X);
        bench.reset();
        assert_eq!(bench.tx(), Logic::One);
        let mut tx = bench.send(&frame_of(b'z'));
        tx.extend(bench.send(&[true; 12]));
        assert_eq!(decode(&tx), Some(b'Z'));
    }

    #[test]
    fn low_enable_freezes_both_directions() {
        let bench = Bench::new();
        bench.reset();
        let frame = frame_of(b'a');

        // receiver halfway through the frame
        let mut tx = bench.send(&frame[..5]);
        bench.set(bench.ena, 0);
        for _ in 0..10 {
            assert_eq!(bench.tick(), Logic::One);
        }
        bench.set(bench.ena, 1);
        tx.extend(bench.send(&frame[5..]));

        // transmitter in the middle of the answer
        tx.extend(bench.send(&[true; 2]));
        assert!(tx.contains(&Logic::Zero));
        bench.set(bench.ena, 0);
        let frozen = bench.tx();
        for _ in 0..10 {
            assert_eq!(bench.tick(), frozen);
        }
        bench.set(bench.ena, 1);
        tx.extend(bench.send(&[true; 15]));

        assert_eq!(decode(&tx), Some(b'A'));
    }

    #[test]
    fn reset_while_receiving_discards_the_frame() {
        let bench = Bench::new();
        bench.reset();
        bench.send(&frame_of(b'a')[..4]);
        bench.set(bench.rst_n, 0);
        assert_eq!(bench.tick(), Logic::One);
        bench.set(bench.rst_n, 1);
        assert!(bench.send(&[true; 20]).iter().all(|&l| l == Logic::One));
    }

    #[test]
    fn reset_while_transmitting_idles_the_line() {
        let bench = Bench::new();
        bench.reset();
        let mut tx = bench.send(&frame_of(b'a'));
        tx.extend(bench.send(&[true; 2]));
        assert!(tx.contains(&Logic::Zero));
        bench.set(bench.rst_n, 0);
        assert_eq!(bench.tick(), Logic::One);
        bench.set(bench.rst_n, 1);
        assert!(bench.send(&[true; 20]).iter().all(|&l| l == Logic::One));
    }
}
