//! UART transmit and receive emulation (8 data bits, no parity, 1 stop bit).

use crate::prelude::*;

/// Line bits per frame: start, eight data bits, stop.
pub const FRAME_BITS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum UartError {
    #[error("Undefined value on data bit {position}")]
    UndefinedBit { position: u8 },

    #[error("Stop bit not detected or undefined")]
    StopBit,

    #[error("Start bit not detected")]
    StartBit,

    #[error("Frame has {0} bits, expected {FRAME_BITS}")]
    FrameLength(usize),

    #[error(transparent)]
    Sim(#[from] SimError),
}

impl From<UartError> for Val {
    fn from(e: UartError) -> Self {
        Val::String(e.to_string())
    }
}

/// Line levels of one frame, in the order they are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartFrame([bool; FRAME_BITS]);

impl UartFrame {
    pub fn encode(byte: u8) -> Self {
        let mut levels = [true; FRAME_BITS];
        levels[0] = false;
        for (i, level) in levels[1..9].iter_mut().enumerate() {
            *level = (byte >> i) & 1 == 1;
        }
        UartFrame(levels)
    }

    pub fn levels(&self) -> &[bool; FRAME_BITS] {
        &self.0
    }

    pub fn decode(levels: &[bool]) -> Result<u8, UartError> {
        if levels.len() != FRAME_BITS {
            return Err(UartError::FrameLength(levels.len()));
        }
        if levels[0] {
            return Err(UartError::StartBit);
        }
        if !levels[FRAME_BITS - 1] {
            return Err(UartError::StopBit);
        }
        Ok(levels[1..9]
            .iter()
            .enumerate()
            .fold(0u8, |byte, (i, &level)| byte | (level as u8) << i))
    }
}

/// Bit timing in simulator steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartTiming {
    pub baud: u64,
    /// Wait from the start bit's falling edge to the middle of the start bit.
    pub half_baud: u64,
    /// Delay before an undefined data bit is sampled again.
    pub resample: u64,
}

impl UartTiming {
    /// Timing for a baud period of `baud_ns` on the attached simulator.
    pub fn new(baud_ns: u64) -> SimResult<Self> {
        let baud = sim_if::sim_steps(baud_ns as f64, "ns")?;
        Ok(UartTiming {
            baud,
            half_baud: sim_if::sim_steps(baud_ns as f64 / 2.0, "ns")?,
            resample: baud / 8,
        })
    }

    pub fn from_steps(baud: u64) -> Self {
        UartTiming {
            baud,
            half_baud: baud / 2,
            resample: baud / 8,
        }
    }
}

/// Sends `byte` on `line`, one baud period per bit, and leaves the line idle
/// for one more period.
pub async fn uart_tx(line: SimObject, byte: u8, timing: UartTiming) -> Result<(), UartError> {
    for &level in UartFrame::encode(byte).levels() {
        line.set(level as u32)?;
        Trigger::timer_steps(timing.baud).await;
    }
    line.set(1)?;
    Trigger::timer_steps(timing.baud).await;
    Ok(())
}

/// Waits for a start bit on `line` and receives one byte, sampling every bit
/// in its middle.
///
/// An undefined data bit is sampled once more a short while later; the stop
/// bit must be a defined 1.
pub async fn uart_rx(line: SimObject, timing: UartTiming) -> Result<u8, UartError> {
    line.falling_edge().await;
    Trigger::timer_steps(timing.half_baud).await;

    let mut levels = [false; FRAME_BITS];
    let mut wait = timing.baud;
    for position in 0..8u8 {
        Trigger::timer_steps(wait).await;
        wait = timing.baud;
        let mut bit = line.value()?.lsb();
        if !bit.is_resolvable() {
            log::warn!(
                "Undefined value on data bit {}, sampling again in {} steps",
                position,
                timing.resample
            );
            Trigger::timer_steps(timing.resample).await;
            wait = timing.baud - timing.resample;
            bit = line.value()?.lsb();
        }
        levels[position as usize + 1] = bit
            .to_bool()
            .ok_or(UartError::UndefinedBit { position })?;
    }

    Trigger::timer_steps(wait).await;
    levels[FRAME_BITS - 1] = line.value()?.lsb() == Logic::One;
    UartFrame::decode(&levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelBuilder;
    use crate::RunOptions;
    use test_case::test_case;

    #[test]
    fn frames_every_byte() {
        for byte in 0..=255u8 {
            let frame = UartFrame::encode(byte);
            let levels = frame.levels();
            assert!(!levels[0]);
            assert!(levels[9]);
            for i in 0..8 {
                assert_eq!(levels[i + 1], (byte >> i) & 1 == 1);
            }
            assert_eq!(UartFrame::decode(levels).unwrap(), byte);
        }
    }

    #[test]
    fn frame_of_a() {
        let levels = UartFrame::encode(b'a').levels().map(|l| l as u8);
        assert_eq!(levels, [0, 1, 0, 0, 0, 0, 1, 1, 0, 1]);
    }

    #[test_case(&[false; 10], "Stop bit not detected or undefined" ; "stop bit low")]
    #[test_case(&[true; 10], "Start bit not detected" ; "start bit high")]
    #[test_case(&[false, true, true], "Frame has 3 bits, expected 10" ; "short frame")]
    fn rejects_frame(levels: &[bool], msg: &str) {
        assert_eq!(UartFrame::decode(levels).unwrap_err().to_string(), msg);
    }

    const BAUD: u64 = 800;

    // Idles the line, then drives (binary value, duration in steps) pairs.
    async fn drive(line: SimObject, bits: Vec<(&'static str, u64)>) -> RstbResult {
        line.set(1)?;
        Trigger::timer_steps(BAUD).await;
        for (value, steps) in bits {
            line.set_bin(value)?;
            Trigger::timer_steps(steps).await;
        }
        Ok(Val::None)
    }

    fn frame_bits(byte: u8) -> Vec<(&'static str, u64)> {
        UartFrame::encode(byte)
            .levels()
            .iter()
            .map(|&l| (if l { "1" } else { "0" }, BAUD))
            .collect()
    }

    async fn receive_on(
        dut: SimObject,
        bits: Vec<(&'static str, u64)>,
        received: RstbObj<Option<Result<u8, String>>>,
    ) -> RstbResult {
        let line = dut.c("line")?;
        Task::fork(drive(line, bits));
        let result = uart_rx(line, UartTiming::from_steps(BAUD)).await;
        *received.get() = Some(result.map_err(|e| e.to_string()));
        Ok(Val::None)
    }

    /// Runs `uart_rx` against a line driven with `bits` and returns its result.
    fn receive(bits: Vec<(&'static str, u64)>) -> Result<u8, String> {
        let mut kb = KernelBuilder::new("top");
        kb.net("line", 1).unwrap();
        let kernel = kb.build();
        let received = RstbObj::new(None);
        let rx_result = received.clone();

        let mut tests = RstbTests::new();
        tests.push(Test::new("receive", move |dut| {
            receive_on(dut, bits.clone(), rx_result.clone()).boxed()
        }));
        let tests = crate::run(&kernel, tests, &RunOptions::default()).unwrap();
        assert!(tests.iter().all(|t| t.passed()));
        let result = received.get().take().unwrap();
        result
    }

    #[test]
    fn receives_a_byte() {
        assert_eq!(receive(frame_bits(b'k')), Ok(b'k'));
    }

    #[test]
    fn rejects_a_low_stop_bit() {
        let mut bits = frame_bits(b'k');
        bits[9] = ("0", BAUD);
        assert_eq!(
            receive(bits),
            Err("Stop bit not detected or undefined".to_string())
        );
    }

    #[test]
    fn rejects_an_undefined_stop_bit() {
        let mut bits = frame_bits(b'k');
        bits[9] = ("x", BAUD);
        assert_eq!(
            receive(bits),
            Err("Stop bit not detected or undefined".to_string())
        );
    }

    #[test]
    fn samples_an_undefined_bit_again() {
        // b'k' = 0x6b, data bit 2 is 0. It is undefined for the first
        // 450 steps, past the first sample in the middle of the bit.
        let mut bits = frame_bits(b'k');
        bits[3] = ("x", 450);
        bits.insert(4, ("0", BAUD - 450));
        assert_eq!(receive(bits), Ok(b'k'));
    }

    #[test]
    fn fails_on_a_bit_undefined_twice() {
        let mut bits = frame_bits(b'k');
        bits[3] = ("z", BAUD);
        assert_eq!(
            receive(bits),
            Err("Undefined value on data bit 2".to_string())
        );
    }
}
