use crate::prelude::*;
use std::collections::VecDeque;
use std::fmt::Debug;

/// An expected/received pair that did not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch<T> {
    pub index: usize,
    pub expected: T,
    pub received: T,
}

/// In-order scoreboard: expected and received items are compared as soon as
/// both queues hold one.
pub struct Scoreboard<T: PartialEq> {
    exp_q: VecDeque<T>,
    recv_q: VecDeque<T>,
    errors: u32,
    expected: u32,
    received: u32,
    matched: u32,
    mismatches: Vec<Mismatch<T>>,
}

impl<T: PartialEq + Clone + Debug> Scoreboard<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Scoreboard {
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            errors: 0,
            expected: 0,
            received: 0,
            matched: 0,
            mismatches: Vec::new(),
        }
    }

    pub fn add_exp(&mut self, data: T) {
        self.exp_q.push_back(data);
        self.expected += 1;
        self.compare();
    }

    pub fn add_recv(&mut self, data: T) {
        self.recv_q.push_back(data);
        self.received += 1;
        self.compare();
    }

    fn compare(&mut self) {
        while let (Some(exp), Some(recv)) = (self.exp_q.front(), self.recv_q.front()) {
            let index = (self.matched + self.errors) as usize;
            if exp == recv {
                self.matched += 1;
            } else {
                self.errors += 1;
                self.mismatches.push(Mismatch {
                    index,
                    expected: exp.clone(),
                    received: recv.clone(),
                });
            }
            self.exp_q.pop_front();
            self.recv_q.pop_front();
        }
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn matched(&self) -> u32 {
        self.matched
    }

    /// Expected items nothing was received for (yet).
    pub fn missing(&self) -> usize {
        self.exp_q.len()
    }

    /// Received items nothing was expected for.
    pub fn unexpected(&self) -> usize {
        self.recv_q.len()
    }

    pub fn mismatches(&self) -> &[Mismatch<T>] {
        &self.mismatches
    }

    pub fn passed(&self) -> bool {
        self.expected > 0
            && self.received == self.expected
            && self.matched == self.received
            && self.errors == 0
            && self.exp_q.is_empty()
            && self.recv_q.is_empty()
    }

    pub fn result_str(&self) -> String {
        format!(
            "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            self.expected,
            self.received,
            self.matched,
            self.errors,
            self.exp_q.len(),
            self.recv_q.len()
        )
    }

    pub fn result(&self) -> RstbResult {
        match self.passed() {
            true => Ok(Val::String(self.result_str())),
            false => Err(Val::String(self.result_str())),
        }
    }
}

/*
 * CLOCK
 */
/// Free-running clock on `clk`, starting low. Runs until the test ends.
pub async fn clock(clk: SimObject, period_steps: u64) -> RstbResult {
    let high_t = period_steps / 2;
    let low_t = period_steps - high_t;
    if period_steps % 2 != 0 {
        log::warn!(
            "Clock period {} steps not dividable by 2. High time will be {} steps; low time will be {} steps.",
            period_steps,
            high_t,
            low_t
        );
    }
    loop {
        clk.set(0)?;
        Trigger::timer_steps(low_t).await;
        clk.set(1)?;
        Trigger::timer_steps(high_t).await;
    }
}
