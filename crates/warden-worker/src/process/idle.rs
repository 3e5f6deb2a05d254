//! Inactivity timer that retires a worker.

use std::sync::{Condvar, Mutex, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use super::{PROCESS_TARGET, Shared};

#[derive(Debug, Default)]
struct IdleState {
    deadline: Option<Instant>,
    watching: bool,
    stopped: bool,
}

/// Deadline shared between request paths and the watchdog thread.
#[derive(Debug, Default)]
pub(super) struct IdleTimer {
    state: Mutex<IdleState>,
    signal: Condvar,
}

impl IdleTimer {
    /// Pushes the deadline to `timeout` from now.
    pub(super) fn touch(&self, timeout: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.stopped {
            return;
        }
        state.deadline = Some(Instant::now() + timeout);
        self.signal.notify_all();
    }

    /// Stops the watchdog permanently.
    pub(super) fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.stopped = true;
        state.deadline = None;
        self.signal.notify_all();
    }

    /// Starts the watchdog thread unless one is already running.
    pub(super) fn ensure_watchdog(shared: &Weak<Shared>, timer: &Self) {
        {
            let mut state = timer.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.watching || state.stopped {
                return;
            }
            state.watching = true;
        }
        let weak = Weak::clone(shared);
        let spawned = thread::Builder::new()
            .name(String::from("warden-worker-idle"))
            .spawn(move || watch(&weak));
        if let Err(error) = spawned {
            warn!(
                target: PROCESS_TARGET,
                error = %error,
                "failed to start idle watchdog; worker will not expire"
            );
            let mut state = timer.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.watching = false;
        }
    }
}

enum Wake {
    Expired,
    Stopped,
}

fn watch(shared: &Weak<Shared>) {
    loop {
        let Some(strong) = shared.upgrade() else {
            return;
        };
        match wait_once(&strong.idle) {
            Some(Wake::Expired) => {
                strong.dispose("idle timeout");
                return;
            }
            Some(Wake::Stopped) => return,
            None => {}
        }
    }
}

/// Blocks until the deadline passes, the timer stops, or the deadline moves.
fn wait_once(timer: &IdleTimer) -> Option<Wake> {
    let state = timer.state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.stopped {
        return Some(Wake::Stopped);
    }
    match state.deadline {
        None => {
            let state = timer
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.stopped.then_some(Wake::Stopped)
        }
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return Some(Wake::Expired);
            }
            let (state, _) = timer
                .signal
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state.stopped.then_some(Wake::Stopped)
        }
    }
}
