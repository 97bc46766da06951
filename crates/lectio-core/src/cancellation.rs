use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Monotonic generation counter shared between the owner of asynchronous work
/// and the tasks performing it.
///
/// Work captures [`Generation::current`] (or the value returned by
/// [`Generation::bump`]) when it starts and checks [`Generation::is_current`]
/// before acting on its result. Bumping the counter cancels every older task
/// without terminating it.
#[derive(Clone, Debug, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate all outstanding tokens and return the new one.
    pub fn bump(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.current() == token
    }
}
