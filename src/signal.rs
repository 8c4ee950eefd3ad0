use crate::error::{SimError, SimResult};
use crate::logic::LogicVec;
use crate::sim_if;
use crate::trigger::Trigger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// A net or variable of the given width in bits.
    Net(u32),
    /// A module instance or other scope.
    Hier,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> SimResult<String> {
        sim_if::current().get_full_name(self)
    }

    pub fn size(&self) -> SimResult<u32> {
        match self.kind {
            ObjectKind::Net(size) => Ok(size),
            ObjectKind::Hier => Err(SimError::NotASignal { name: self.name()? }),
        }
    }

    pub fn get_root() -> SimResult<Self> {
        sim_if::current().get_root_object()
    }

    pub fn from_name(full_name: &str) -> SimResult<Self> {
        sim_if::current().get_object_by_name(full_name)
    }

    /// Child object `name` below this scope.
    pub fn c(&self, name: &str) -> SimResult<Self> {
        let mut child_name = self.name()?;
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    pub fn get_child(&self, name: &str) -> SimResult<Self> {
        self.c(name)
    }

    pub fn value(&self) -> SimResult<LogicVec> {
        sim_if::current().get_value(self)
    }

    pub fn is_resolvable(&self) -> SimResult<bool> {
        Ok(self.value()?.is_resolvable())
    }

    pub fn u32(&self) -> SimResult<u32> {
        let value = self.value()?;
        match value.to_u32() {
            Some(v) => Ok(v),
            None => Err(SimError::Unresolvable {
                name: self.name()?,
                value: value.to_string(),
            }),
        }
    }

    pub fn bin(&self) -> SimResult<String> {
        Ok(self.value()?.to_string())
    }

    pub fn set(&self, val: u32) -> SimResult<()> {
        let width = self.size()?;
        sim_if::current().set_value(self, LogicVec::from_u32(val, width))
    }

    /// Sets the signal from a binary string, `0b` prefix and `_` separators allowed.
    pub fn set_bin(&self, val: &str) -> SimResult<()> {
        let width = self.size()?;
        let value: LogicVec = val.parse()?;
        if value.width() != width {
            return Err(SimError::WidthMismatch {
                name: self.name()?,
                expected: width,
                got: value.width(),
            });
        }
        sim_if::current().set_value(self, value)
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}
