//! Four-state signal values.

use crate::error::SimError;
use std::fmt;
use std::str::FromStr;

/// A single bit as seen on a simulated net.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Logic {
    Zero,
    One,
    /// Unknown or uninitialized.
    X,
    /// High impedance.
    Z,
}

impl Logic {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Logic::Zero),
            '1' => Some(Logic::One),
            'x' | 'X' => Some(Logic::X),
            'z' | 'Z' => Some(Logic::Z),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'x',
            Logic::Z => 'z',
        }
    }

    pub fn is_resolvable(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }

    pub fn to_bool(self) -> Option<bool> {
        match self {
            Logic::Zero => Some(false),
            Logic::One => Some(true),
            _ => None,
        }
    }
}

impl From<bool> for Logic {
    fn from(b: bool) -> Self {
        if b {
            Logic::One
        } else {
            Logic::Zero
        }
    }
}

/// A vector of [`Logic`] bits, most significant bit first (the order a
/// binary string is written in).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct LogicVec(Vec<Logic>);

impl LogicVec {
    pub fn filled(width: u32, bit: Logic) -> Self {
        LogicVec(vec![bit; width as usize])
    }

    /// All bits X, the value of a net nobody has driven yet.
    pub fn unknown(width: u32) -> Self {
        Self::filled(width, Logic::X)
    }

    pub fn from_u32(value: u32, width: u32) -> Self {
        let bits = (0..width)
            .rev()
            .map(|i| Logic::from(i < 32 && (value >> i) & 1 == 1))
            .collect();
        LogicVec(bits)
    }

    pub fn from_bit(bit: Logic) -> Self {
        LogicVec(vec![bit])
    }

    pub fn width(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn bits(&self) -> &[Logic] {
        &self.0
    }

    pub fn lsb(&self) -> Logic {
        self.0.last().copied().unwrap_or(Logic::X)
    }

    pub fn is_resolvable(&self) -> bool {
        self.0.iter().all(|b| b.is_resolvable())
    }

    /// Integer value, `None` if any bit is X/Z or the vector is wider than 32 bits.
    pub fn to_u32(&self) -> Option<u32> {
        if self.0.len() > 32 {
            return None;
        }
        self.0.iter().try_fold(0u32, |acc, bit| {
            bit.to_bool().map(|b| (acc << 1) | u32::from(b))
        })
    }

    /// Level of a single-bit value.
    pub fn to_bool(&self) -> Option<bool> {
        match self.0.as_slice() {
            [bit] => bit.to_bool(),
            _ => None,
        }
    }
}

impl FromStr for LogicVec {
    type Err = SimError;

    /// Parses `0b1010`, `10_10`, `x1z0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.trim_start_matches("0b").replace('_', "");
        if stripped.is_empty() {
            return Err(SimError::InvalidValue(s.to_string()));
        }
        stripped
            .chars()
            .map(Logic::from_char)
            .collect::<Option<Vec<_>>>()
            .map(LogicVec)
            .ok_or_else(|| SimError::InvalidValue(s.to_string()))
    }
}

impl fmt::Display for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.0 {
            write!(f, "{}", bit.to_char())?;
        }
        Ok(())
    }
}
