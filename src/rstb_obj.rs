use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// RstbObj shall allow the user to mutably share test objects (such as a Scoreboard, etc.)
// between Tasks. Tasks must be Send, so the object is reference counted with Arc even
// though everything runs on the simulation thread.
pub struct RstbObj<T>(Arc<Mutex<T>>);

impl<T> RstbObj<T> {
    pub fn new(data: T) -> RstbObj<T> {
        RstbObj(Arc::new(Mutex::new(data)))
    }

    /// Locks the object. Don't hold the guard across an `.await`.
    pub fn get(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for RstbObj<T> {
    fn clone(&self) -> Self {
        RstbObj(self.0.clone())
    }
}
