//! One-at-a-time job scheduling that keeps only the newest pending input.

use super::consumer::Status;
use parking_lot::Mutex;

struct QueueState<T> {
    pending: Option<(T, Status)>,
    running: bool,
    closed: bool,
}

/// Serialises the work of one request.
///
/// At most one worker runs at a time. While it runs, newer inputs replace an
/// older pending intermediate, so superseded progressive data is never
/// processed. A pending final input is never replaced.
pub(crate) struct LatestJobQueue<T> {
    state: Mutex<QueueState<T>>,
}

impl<T> LatestJobQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: None,
                running: false,
                closed: false,
            }),
        }
    }

    /// Queue an input. Returns true if the caller must start a worker, which
    /// then drains the queue with [`next`](Self::next).
    pub fn offer(&self, value: T, status: Status) -> bool {
        let replaced;
        let start;
        {
            let mut state = self.state.lock();
            if state.closed
                || state
                    .pending
                    .as_ref()
                    .is_some_and(|(_, pending)| pending.is_last())
            {
                return false;
            }
            replaced = state.pending.replace((value, status));
            start = !state.running;
            state.running = true;
        }
        drop(replaced);
        start
    }

    /// Next input for the running worker. `None` means the worker must stop;
    /// a later `offer` starts a new one.
    pub fn next(&self) -> Option<(T, Status)> {
        let mut state = self.state.lock();
        match state.pending.take() {
            Some(job) if !state.closed => Some(job),
            _ => {
                state.running = false;
                None
            }
        }
    }

    /// Drop pending input and refuse new input.
    pub fn close(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.take()
        };
        drop(pending);
    }
}
