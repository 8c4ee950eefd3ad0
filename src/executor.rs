use futures::{
    future::{BoxFuture, FutureExt},
    task::{waker_ref, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use crate::value::Val;
use crate::RstbResult;

thread_local! {
    static READY_QUEUE: RefCell<Queue<Arc<Task>>> = RefCell::new(Queue::new());
}

pub(crate) fn schedule_task(task: Arc<Task>) {
    READY_QUEUE.with(|q| {
        q.borrow_mut().add(task).expect("Error queueing task.");
    });
}

fn next_task() -> Option<Arc<Task>> {
    READY_QUEUE.with(|q| q.borrow_mut().remove().ok())
}

pub(crate) fn clear_ready_queue() {
    READY_QUEUE.with(|q| *q.borrow_mut() = Queue::new());
}

/// Polls woken tasks until none is ready.
#[inline]
pub(crate) fn run_once() {
    while let Some(task) = next_task() {
        process_task(task);
    }
}

#[inline]
fn process_task(task: Arc<Task>) {
    if *task.state.lock().unwrap() != TaskState::Pending {
        // cancelled or already done, will be dropped once all references disappear
        return;
    }

    let mut fut_slot = task.future.lock().unwrap();
    let Some(mut fut) = fut_slot.take() else {
        return;
    };
    let waker = waker_ref(&task);
    let context = &mut Context::from_waker(&waker);
    match fut.as_mut().poll(context) {
        Poll::Pending => {
            *fut_slot = Some(fut);
        }
        Poll::Ready(result) => {
            log::trace!("Task '{}' complete", task.name);
            *task.state.lock().unwrap() = TaskState::Done;
            if let Some(tx) = task.join_tx.lock().unwrap().take() {
                let _ = tx.send(result);
            }
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum TaskState {
    Pending,
    Done,
    Cancelled,
}

pub struct Task {
    future: Mutex<Option<BoxFuture<'static, RstbResult>>>,
    state: Mutex<TaskState>,
    name: String,
    join_tx: Mutex<Option<oneshot::Sender<RstbResult>>>,
}

impl Task {
    /// Runs `future` concurrently with the calling task.
    pub fn fork(future: impl Future<Output = RstbResult> + Send + 'static) -> JoinHandle {
        Task::spawn(future, "forked")
    }

    pub fn spawn(
        future: impl Future<Output = RstbResult> + Send + 'static,
        name: &str,
    ) -> JoinHandle {
        let (task, join_handle) = Task::new(future.boxed(), name);
        schedule_task(task);
        join_handle
    }

    fn new(fut: BoxFuture<'static, RstbResult>, name: &str) -> (Arc<Self>, JoinHandle) {
        let (tx, rx) = oneshot::channel::<RstbResult>();
        let task = Arc::new(Self {
            future: Mutex::new(Some(fut)),
            state: Mutex::new(TaskState::Pending),
            name: name.to_string(),
            join_tx: Mutex::new(Some(tx)),
        });
        let join_handle = JoinHandle {
            awaited_task: Some(task.clone()),
            join_rx: rx,
        };
        (task, join_handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        // The executor drops a cancelled task without polling it again. Dropping the
        // sender resolves any JoinHandle waiting on it.
        let mut state = self.state.lock().unwrap();
        if *state == TaskState::Pending {
            *state = TaskState::Cancelled;
            self.join_tx.lock().unwrap().take();
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.clone());
    }
}

pub struct JoinHandle {
    awaited_task: Option<Arc<Task>>,
    join_rx: oneshot::Receiver<RstbResult>,
}

impl JoinHandle {
    pub(crate) fn task(&self) -> Option<Arc<Task>> {
        self.awaited_task.clone()
    }

    pub fn cancel(mut self) {
        if let Some(task) = self.awaited_task.take() {
            task.cancel();
        }
    }
}

impl Future for JoinHandle {
    type Output = RstbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => {
                let name = self
                    .awaited_task
                    .as_ref()
                    .map_or("unknown", |t| t.name.as_str())
                    .to_string();
                Poll::Ready(Err(Val::String(format!("task '{}' was cancelled", name))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
