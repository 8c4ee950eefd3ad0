//! Native event-driven simulation kernel.
//!
//! The kernel plays the part an HDL simulator plays for a VPI testbench: it owns
//! the signal hierarchy and simulation time and calls back into the trigger
//! machinery when a registered event happens. Designs are expressed as
//! behavioral [`Model`]s that are evaluated when a net they are sensitive to
//! changes.
//!
//! Each time step runs as follows:
//! 1. timer callbacks due at this time are fired,
//! 2. delta cycles: pending writes are applied, models sensitive to the changed
//!    nets are evaluated (their writes land in the next delta), value-change
//!    callbacks fire,
//! 3. when no writes are pending, read-write callbacks fire (and may write),
//! 4. when nothing else is left, read-only callbacks fire. Writes are rejected
//!    in this phase.

use intmap::IntMap;
use num_format::{Locale, ToFormattedString};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use crate::error::{SimError, SimResult};
use crate::logic::{Logic, LogicVec};
use crate::signal::{ObjectKind, SimObject};
use crate::sim_if::{SimCallback, SimIf};
use crate::trigger::{self, EdgeKind};

pub const ROOT_HANDLE: usize = 1;
/// Time precision in powers of ten of a second (1 ps).
pub const PRECISION: i8 = -12;
const DEFAULT_MAX_DELTAS: u32 = 10_000;

/// A behavioral model of (part of) a design.
pub trait Model {
    /// Declares the nets the model uses. Called once while the kernel is built.
    fn elaborate(&mut self, elab: &mut Elaboration<'_>) -> SimResult<()>;

    /// Called in every delta cycle in which a net from the sensitivity list changed.
    fn evaluate(&mut self, ctx: &mut ModelContext<'_>);
}

enum Object {
    Scope { name: String },
    Net { name: String, value: LogicVec },
}

impl Object {
    fn name(&self) -> &str {
        match self {
            Object::Scope { name } | Object::Net { name, .. } => name,
        }
    }

    fn kind(&self) -> ObjectKind {
        match self {
            Object::Scope { .. } => ObjectKind::Hier,
            Object::Net { value, .. } => ObjectKind::Net(value.width()),
        }
    }
}

struct ModelSlot {
    model: Box<dyn Model>,
    sensitivity: Vec<usize>,
}

#[derive(Clone, Copy, Debug)]
enum Registered {
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

/// A net that changed in the current delta cycle.
#[derive(Clone, Debug)]
pub struct Change {
    pub net: usize,
    pub old: LogicVec,
    pub new: LogicVec,
}

impl Change {
    fn edge_kind(&self) -> EdgeKind {
        if self.new.width() != 1 {
            return EdgeKind::Any;
        }
        match self.new.lsb() {
            Logic::One => EdgeKind::Rising,
            Logic::Zero => EdgeKind::Falling,
            _ => EdgeKind::Any,
        }
    }
}

/// Builds the object hierarchy and elaborates models.
pub struct KernelBuilder {
    objects: Vec<Object>,
    names: HashMap<String, usize>,
    models: Vec<ModelSlot>,
    max_deltas: u32,
}

impl KernelBuilder {
    pub fn new(root: &str) -> Self {
        let mut names = HashMap::new();
        names.insert(root.to_string(), ROOT_HANDLE);
        KernelBuilder {
            objects: vec![Object::Scope {
                name: root.to_string(),
            }],
            names,
            models: Vec::new(),
            max_deltas: DEFAULT_MAX_DELTAS,
        }
    }

    fn root_name(&self) -> &str {
        self.objects[0].name()
    }

    /// Declares net `name` below the root scope, or returns the existing one.
    pub fn net(&mut self, name: &str, width: u32) -> SimResult<usize> {
        let full_name = format!("{}.{}", self.root_name(), name);
        if let Some(&handle) = self.names.get(&full_name) {
            return match &self.objects[handle - 1] {
                Object::Net { value, .. } if value.width() == width => Ok(handle),
                Object::Net { value, .. } => Err(SimError::WidthMismatch {
                    name: full_name,
                    expected: value.width(),
                    got: width,
                }),
                Object::Scope { .. } => Err(SimError::NotASignal { name: full_name }),
            };
        }
        self.objects.push(Object::Net {
            name: full_name.clone(),
            value: LogicVec::unknown(width),
        });
        let handle = self.objects.len();
        self.names.insert(full_name, handle);
        Ok(handle)
    }

    pub fn model(&mut self, mut model: impl Model + 'static) -> SimResult<&mut Self> {
        let mut elab = Elaboration {
            builder: self,
            sensitivity: Vec::new(),
        };
        model.elaborate(&mut elab)?;
        let sensitivity = elab.sensitivity;
        self.models.push(ModelSlot {
            model: Box::new(model),
            sensitivity,
        });
        Ok(self)
    }

    pub fn max_deltas(&mut self, max: u32) -> &mut Self {
        self.max_deltas = max;
        self
    }

    pub fn build(self) -> Rc<Kernel> {
        Rc::new(Kernel {
            max_deltas: self.max_deltas,
            time: Cell::new(0),
            state: RefCell::new(KernelState {
                objects: self.objects,
                names: self.names,
                models: self.models,
                pending: Vec::new(),
                callbacks: IntMap::new(),
                next_cb: 1,
                timers: BTreeMap::new(),
                watchers: IntMap::new(),
                read_write: Vec::new(),
                read_only: Vec::new(),
                in_read_only: false,
            }),
        })
    }
}

/// Handed to [`Model::elaborate`].
pub struct Elaboration<'a> {
    builder: &'a mut KernelBuilder,
    sensitivity: Vec<usize>,
}

impl Elaboration<'_> {
    pub fn net(&mut self, name: &str, width: u32) -> SimResult<usize> {
        self.builder.net(name, width)
    }

    /// Evaluate the model whenever `net` changes.
    pub fn sensitive_to(&mut self, net: usize) {
        if !self.sensitivity.contains(&net) {
            self.sensitivity.push(net);
        }
    }
}

/// Handed to [`Model::evaluate`]. Reads see the values of the current delta,
/// drives are applied in the next one.
pub struct ModelContext<'a> {
    objects: &'a [Object],
    changes: &'a [Change],
    drives: &'a mut Vec<(usize, LogicVec)>,
}

impl ModelContext<'_> {
    pub fn value(&self, net: usize) -> Option<&LogicVec> {
        match self.objects.get(net.wrapping_sub(1)) {
            Some(Object::Net { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Level of a single-bit net, X for unknown handles.
    pub fn level(&self, net: usize) -> Logic {
        self.value(net).map_or(Logic::X, LogicVec::lsb)
    }

    pub fn changes(&self) -> &[Change] {
        self.changes
    }

    /// True if `net` went to 1 from anything else in this delta.
    pub fn rose(&self, net: usize) -> bool {
        self.changes
            .iter()
            .any(|c| c.net == net && c.new.lsb() == Logic::One && c.old.lsb() != Logic::One)
    }

    pub fn drive(&mut self, net: usize, value: LogicVec) {
        self.drives.push((net, value));
    }
}

struct KernelState {
    objects: Vec<Object>,
    names: HashMap<String, usize>,
    models: Vec<ModelSlot>,
    pending: Vec<(usize, LogicVec)>,
    callbacks: IntMap<Registered>,
    next_cb: usize,
    timers: BTreeMap<u64, VecDeque<usize>>,
    // key is net handle
    watchers: IntMap<Vec<usize>>,
    read_write: Vec<usize>,
    read_only: Vec<usize>,
    in_read_only: bool,
}

impl KernelState {
    fn object(&self, handle: usize) -> SimResult<&Object> {
        self.objects
            .get(handle.wrapping_sub(1))
            .ok_or(SimError::InvalidHandle(handle))
    }

    fn net_width(&self, handle: usize) -> SimResult<u32> {
        match self.object(handle)? {
            Object::Net { value, .. } => Ok(value.width()),
            Object::Scope { name } => Err(SimError::NotASignal { name: name.clone() }),
        }
    }

    fn is_registered(&self, cb: usize) -> bool {
        self.callbacks.get(cb as u64).is_some()
    }

    /// Applies pending writes and evaluates models. Returns the nets that changed.
    fn apply_pending(&mut self) -> Vec<Change> {
        let writes = std::mem::take(&mut self.pending);
        let mut changes: Vec<Change> = Vec::new();
        for (net, value) in writes {
            let Some(Object::Net { value: current, .. }) = self.objects.get_mut(net - 1) else {
                continue;
            };
            if *current == value {
                continue;
            }
            let old = std::mem::replace(current, value.clone());
            match changes.iter_mut().find(|c| c.net == net) {
                Some(change) => change.new = value,
                None => changes.push(Change {
                    net,
                    old,
                    new: value,
                }),
            }
        }
        changes.retain(|c| c.old != c.new);

        for slot in self.models.iter_mut() {
            if changes.iter().any(|c| slot.sensitivity.contains(&c.net)) {
                let mut ctx = ModelContext {
                    objects: &self.objects,
                    changes: &changes,
                    drives: &mut self.pending,
                };
                slot.model.evaluate(&mut ctx);
            }
        }
        changes
    }
}

/// Formats a time in ps steps as ns with a thousands separator, e.g. `1,234.500ns`.
fn format_ns(ps: u64) -> String {
    format!(
        "{}.{:03}ns",
        (ps / 1000).to_formatted_string(&Locale::en),
        ps % 1000
    )
}

pub struct Kernel {
    max_deltas: u32,
    // kept outside the state so logging works while models are evaluated
    time: Cell<u64>,
    state: RefCell<KernelState>,
}

// The state is never borrowed while a callback is dispatched, since the woken
// tasks call straight back into the kernel.
impl Kernel {
    pub fn root_name(&self) -> String {
        self.state.borrow().objects[0].name().to_string()
    }

    /// Time of the next scheduled timer callback.
    pub fn next_event_time(&self) -> Option<u64> {
        self.state.borrow().timers.keys().next().copied()
    }

    /// Advances to the next scheduled time, fires its timer callbacks and runs
    /// the time step to completion. Returns `false` if nothing is scheduled.
    pub fn step(&self) -> SimResult<bool> {
        let (time, cbs) = {
            let mut st = self.state.borrow_mut();
            match st.timers.pop_first() {
                Some((time, cbs)) => {
                    self.time.set(time);
                    (time, cbs)
                }
                None => return Ok(false),
            }
        };
        for cb in cbs {
            let live = self.state.borrow_mut().callbacks.remove(cb as u64).is_some();
            if live {
                trigger::react(SimCallback::Time(time), EdgeKind::Any);
            }
        }
        self.settle()?;
        Ok(true)
    }

    /// Runs delta cycles and synchronisation callbacks at the current time until
    /// nothing is left to do.
    pub fn settle(&self) -> SimResult<()> {
        let mut deltas = 0;
        loop {
            let progressed = self.delta() || self.fire_sync(false) || self.fire_sync(true);
            if !progressed {
                return Ok(());
            }
            deltas += 1;
            if deltas > self.max_deltas {
                return Err(SimError::DeltaCycleLimit {
                    time: self.get_sim_time_steps(),
                    max: self.max_deltas,
                });
            }
        }
    }

    fn delta(&self) -> bool {
        let fire = {
            let mut st = self.state.borrow_mut();
            if st.pending.is_empty() {
                return false;
            }
            let changes = st.apply_pending();
            let mut fire = Vec::new();
            for change in &changes {
                if let Some(cbs) = st.watchers.get(change.net as u64) {
                    fire.extend(cbs.iter().map(|&cb| (cb, change.net, change.edge_kind())));
                }
            }
            fire
        };
        for (cb, net, edge) in fire {
            // an earlier callback may have cancelled this one
            if self.state.borrow().is_registered(cb) {
                trigger::react(SimCallback::Edge(net), edge);
            }
        }
        true
    }

    fn fire_sync(&self, read_only: bool) -> bool {
        let cbs = {
            let mut st = self.state.borrow_mut();
            let cbs = match read_only {
                true => std::mem::take(&mut st.read_only),
                false => std::mem::take(&mut st.read_write),
            };
            for cb in &cbs {
                st.callbacks.remove(*cb as u64);
            }
            st.in_read_only = read_only && !cbs.is_empty();
            cbs
        };
        if cbs.is_empty() {
            return false;
        }
        let cb = match read_only {
            true => SimCallback::ReadOnly,
            false => SimCallback::ReadWrite,
        };
        for _ in &cbs {
            trigger::react(cb, EdgeKind::Any);
        }
        self.state.borrow_mut().in_read_only = false;
        true
    }
}

impl SimIf for Kernel {
    fn set_value(&self, obj: &SimObject, value: LogicVec) -> SimResult<()> {
        let mut st = self.state.borrow_mut();
        let width = st.net_width(obj.handle)?;
        if st.in_read_only {
            return Err(SimError::ReadOnlyPhase {
                name: st.object(obj.handle)?.name().to_string(),
            });
        }
        if value.width() != width {
            return Err(SimError::WidthMismatch {
                name: st.object(obj.handle)?.name().to_string(),
                expected: width,
                got: value.width(),
            });
        }
        st.pending.push((obj.handle, value));
        Ok(())
    }

    fn get_value(&self, obj: &SimObject) -> SimResult<LogicVec> {
        match self.state.borrow().object(obj.handle)? {
            Object::Net { value, .. } => Ok(value.clone()),
            Object::Scope { name } => Err(SimError::NotASignal { name: name.clone() }),
        }
    }

    fn get_object_by_name(&self, name: &str) -> SimResult<SimObject> {
        let st = self.state.borrow();
        let handle = *st
            .names
            .get(name)
            .ok_or_else(|| SimError::ObjectNotFound(name.to_string()))?;
        Ok(SimObject {
            handle,
            kind: st.object(handle)?.kind(),
        })
    }

    fn get_root_object(&self) -> SimResult<SimObject> {
        Ok(SimObject {
            handle: ROOT_HANDLE,
            kind: ObjectKind::Hier,
        })
    }

    fn get_full_name(&self, obj: &SimObject) -> SimResult<String> {
        Ok(self.state.borrow().object(obj.handle)?.name().to_string())
    }

    fn get_sim_time_steps(&self) -> u64 {
        self.time.get()
    }

    fn get_sim_precision(&self) -> i8 {
        PRECISION
    }

    fn log(&self, msg: &str) {
        eprintln!("{} {}", format_ns(self.time.get()), msg);
    }

    fn register_callback(&self, cb: SimCallback) -> SimResult<usize> {
        let mut guard = self.state.borrow_mut();
        let st = &mut *guard;
        let handle = st.next_cb;
        let registered = match cb {
            SimCallback::Time(delay) => {
                let abs_time = self.time.get() + delay;
                st.timers.entry(abs_time).or_default().push_back(handle);
                Registered::Time(abs_time)
            }
            SimCallback::Edge(net) => {
                st.net_width(net)?;
                match st.watchers.get_mut(net as u64) {
                    Some(cbs) => cbs.push(handle),
                    None => {
                        st.watchers.insert(net as u64, vec![handle]);
                    }
                }
                Registered::Edge(net)
            }
            SimCallback::ReadWrite => {
                st.read_write.push(handle);
                Registered::ReadWrite
            }
            SimCallback::ReadOnly => {
                st.read_only.push(handle);
                Registered::ReadOnly
            }
        };
        st.callbacks.insert(handle as u64, registered);
        st.next_cb += 1;
        Ok(handle)
    }

    fn cancel_callback(&self, cb_hdl: usize) -> SimResult<()> {
        let mut guard = self.state.borrow_mut();
        let st = &mut *guard;
        let registered = st
            .callbacks
            .remove(cb_hdl as u64)
            .ok_or(SimError::UnknownCallback(cb_hdl))?;
        match registered {
            Registered::Time(abs_time) => {
                if let Some(cbs) = st.timers.get_mut(&abs_time) {
                    cbs.retain(|&cb| cb != cb_hdl);
                    if cbs.is_empty() {
                        st.timers.remove(&abs_time);
                    }
                }
            }
            Registered::Edge(net) => {
                if let Some(cbs) = st.watchers.get_mut(net as u64) {
                    cbs.retain(|&cb| cb != cb_hdl);
                }
            }
            Registered::ReadWrite => st.read_write.retain(|&cb| cb != cb_hdl),
            Registered::ReadOnly => st.read_only.retain(|&cb| cb != cb_hdl),
        }
        Ok(())
    }
}
