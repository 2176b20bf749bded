use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// cancellation signal shared between the caller, a Ctrl-C handler and the collector
///
/// clones share the abort flag; the deadline (if any) is copied
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    aborted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// token that also cancels itself once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// what a Ctrl-C should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// stop the running collection and let it report `Cancelled`
    Cancel,
    /// nothing is left to cancel gracefully, end the process
    Exit,
}

/// Ctrl-C policy: the first interrupt during collection cancels it, any other
/// interrupt (a repeat, or one after collection) exits
#[derive(Debug, Clone)]
pub struct InterruptHandler {
    token: CancelToken,
    collecting: Arc<AtomicBool>,
}

impl InterruptHandler {
    pub fn new(token: CancelToken) -> Self {
        Self {
            token,
            collecting: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn collection_finished(&self) {
        self.collecting.store(false, Ordering::SeqCst);
    }

    pub fn interrupt(&self) -> Interrupt {
        if self.token.is_cancelled() || !self.collecting.load(Ordering::SeqCst) {
            return Interrupt::Exit;
        }
        self.token.cancel();
        Interrupt::Cancel
    }
}
