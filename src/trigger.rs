use intmap::IntMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::error::SimResult;
use crate::executor;
use crate::signal::SimObject;
use crate::sim_if::{self, SimCallback};

// IntMap specializes on u64 keys and doesn't need to hash.
thread_local! {
    // key is signal handle
    static EDGE_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    // key is absolute callback time in sim steps
    static TIMER_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    static READ_ONLY: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
    static READ_WRITE: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::default());
}

#[derive(Default)]
struct CallbackHandles {
    handle: Option<usize>,
    waiters: VecDeque<Waiter>,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum EdgeKind {
    /// Any value change. Also reported for transitions to X or Z.
    Any,
    Rising,
    Falling,
}

struct Waiter {
    waker: Waker,
    // An existing edge callback serves waiters for both edge kinds, so react needs to
    // know which of them to wake.
    edge_kind: EdgeKind,
    fired: Arc<AtomicBool>,
}

impl Waiter {
    fn wake(self) {
        self.fired.store(true, Ordering::Release);
        self.waker.wake();
    }
}

pub(crate) fn cancel_all_triggers() {
    let sim = sim_if::current();
    let mut handles = Vec::new();
    for sync in [&READ_ONLY, &READ_WRITE] {
        sync.with(|cb| {
            let mut cb = cb.borrow_mut();
            cb.waiters.clear();
            handles.extend(cb.handle.take());
        });
    }
    for map in [&TIMER_MAP, &EDGE_MAP] {
        map.with(|m| {
            // waiters are dropped along with the map entries
            for (_, cb) in m.borrow_mut().drain() {
                handles.extend(cb.handle);
            }
        });
    }
    for handle in handles {
        if let Err(e) = sim.cancel_callback(handle) {
            log::debug!("Cancelling callback {}: {}", handle, e);
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
}

/// Suspends the awaiting task until the simulator reports the event.
#[must_use = "triggers do nothing unless awaited"]
pub struct Trigger {
    kind: TrigKind,
    fired: Option<Arc<AtomicBool>>,
}

impl Trigger {
    fn new(kind: TrigKind) -> Self {
        Trigger { kind, fired: None }
    }

    pub fn timer(time: u64, unit: &str) -> SimResult<Self> {
        Ok(Trigger::timer_steps(sim_if::sim_steps(time as f64, unit)?))
    }
    pub fn timer_steps(steps: u64) -> Self {
        Trigger::new(TrigKind::Timer(steps))
    }
    pub fn edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    pub fn read_write() -> Self {
        Trigger::new(TrigKind::ReadWrite)
    }
    pub fn read_only() -> Self {
        Trigger::new(TrigKind::ReadOnly)
    }
}

impl Future for Trigger {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A task can be polled for other reasons (e.g. inside a select), so only a
        // fired trigger is ready.
        if let Some(fired) = &self.fired {
            return match fired.load(Ordering::Acquire) {
                true => Poll::Ready(()),
                false => Poll::Pending,
            };
        }
        let fired = Arc::new(AtomicBool::new(false));
        let waiter = Waiter {
            waker: cx.waker().clone(),
            edge_kind: EdgeKind::Any,
            fired: fired.clone(),
        };
        if let Err(e) = register(self.kind, waiter) {
            panic!("Failed to register {:?} callback: {}", self.kind, e);
        }
        self.fired = Some(fired);
        Poll::Pending
    }
}

fn register(kind: TrigKind, mut waiter: Waiter) -> SimResult<()> {
    let sim = sim_if::current();
    match kind {
        TrigKind::ReadWrite | TrigKind::ReadOnly => {
            let (sync, cb) = match kind {
                TrigKind::ReadWrite => (&READ_WRITE, SimCallback::ReadWrite),
                _ => (&READ_ONLY, SimCallback::ReadOnly),
            };
            sync.with(|s| -> SimResult<()> {
                let mut s = s.borrow_mut();
                s.waiters.push_back(waiter);
                if s.handle.is_none() {
                    s.handle = Some(sim.register_callback(cb)?);
                }
                Ok(())
            })
        }
        TrigKind::Timer(t) => {
            // the simulator reports absolute time, not the delay
            let abs_time = t + sim.get_sim_time_steps();
            TIMER_MAP.with(|m| -> SimResult<()> {
                let mut m = m.borrow_mut();
                if let Some(callbacks) = m.get_mut(abs_time) {
                    callbacks.waiters.push_back(waiter);
                } else {
                    let handle = sim.register_callback(SimCallback::Time(t))?;
                    let callbacks = CallbackHandles {
                        handle: Some(handle),
                        waiters: VecDeque::from([waiter]),
                    };
                    m.insert(abs_time, callbacks);
                }
                Ok(())
            })
        }
        TrigKind::Edge(sig_hdl, edge_kind) => {
            waiter.edge_kind = edge_kind;
            EDGE_MAP.with(|m| -> SimResult<()> {
                let mut m = m.borrow_mut();
                if let Some(callbacks) = m.get_mut(sig_hdl as u64) {
                    callbacks.waiters.push_back(waiter);
                } else {
                    let handle = sim.register_callback(SimCallback::Edge(sig_hdl))?;
                    let callbacks = CallbackHandles {
                        handle: Some(handle),
                        waiters: VecDeque::from([waiter]),
                    };
                    m.insert(sig_hdl as u64, callbacks);
                }
                Ok(())
            })
        }
    }
}

/// Called by the simulator for every callback registered through a trigger.
/// Wakes the waiting tasks and runs them.
pub(crate) fn react(cb: SimCallback, edge: EdgeKind) {
    let woken: Vec<Waiter> = match cb {
        SimCallback::ReadWrite => take_sync(&READ_WRITE),
        SimCallback::ReadOnly => take_sync(&READ_ONLY),
        SimCallback::Time(t) => TIMER_MAP
            .with(|m| m.borrow_mut().remove(t))
            .map(|callbacks| callbacks.waiters.into())
            .unwrap_or_default(),
        SimCallback::Edge(sig_hdl) => react_edge(sig_hdl, edge),
    };

    if woken.is_empty() {
        log::trace!("No waiters for {:?}", cb);
        return;
    }
    for waiter in woken {
        waiter.wake();
    }
    // execute woken tasks
    executor::run_once();
}

fn take_sync(sync: &'static std::thread::LocalKey<RefCell<CallbackHandles>>) -> Vec<Waiter> {
    sync.with(|s| {
        let mut s = s.borrow_mut();
        // callback is done
        s.handle = None;
        s.waiters.drain(..).collect()
    })
}

fn react_edge(sig_hdl: usize, edge: EdgeKind) -> Vec<Waiter> {
    let Some(mut callbacks) = EDGE_MAP.with(|m| m.borrow_mut().remove(sig_hdl as u64)) else {
        return Vec::new();
    };
    let (wake, resched): (Vec<Waiter>, Vec<Waiter>) = callbacks
        .waiters
        .drain(..)
        .partition(|w| w.edge_kind == EdgeKind::Any || w.edge_kind == edge);

    if resched.is_empty() {
        // no waiters remaining, cancel
        if let Some(handle) = callbacks.handle {
            if let Err(e) = sim_if::current().cancel_callback(handle) {
                log::debug!("Cancelling edge callback {}: {}", handle, e);
            }
        }
    } else {
        callbacks.waiters = resched.into();
        EDGE_MAP.with(|m| m.borrow_mut().insert(sig_hdl as u64, callbacks));
    }
    wake
}
