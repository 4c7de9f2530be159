//! Forwarding of termination signals to the running child process.
//!
//! SIGINT, SIGTERM and SIGHUP are caught for the lifetime of the process.
//! While a child is registered through [`forward_to`], the handler relays the
//! signal to it with `kill(2)`. The last signal seen is recorded so the runner
//! can report the interruption after the child has been reaped.

/// Keeps a child registered as the signal target until dropped.
pub struct Forwarding {
    _private: (),
}

#[cfg(unix)]
mod imp {
    use std::sync::atomic::{AtomicI32, Ordering};

    static CHILD_PID: AtomicI32 = AtomicI32::new(0);
    static PENDING: AtomicI32 = AtomicI32::new(0);

    const FORWARDED: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

    // Only async-signal-safe work in here: atomics and kill(2).
    extern "C" fn relay(sig: libc::c_int) {
        PENDING.store(sig, Ordering::SeqCst);
        let pid = CHILD_PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, sig);
            }
        }
    }

    pub fn install() -> bool {
        let handler = relay as extern "C" fn(libc::c_int) as libc::sighandler_t;
        FORWARDED
            .iter()
            .all(|&sig| unsafe { libc::signal(sig, handler) } != libc::SIG_ERR)
    }

    pub fn register(pid: u32) {
        CHILD_PID.store(pid as i32, Ordering::SeqCst);
    }

    pub fn send(pid: u32, sig: i32) {
        unsafe {
            libc::kill(pid as i32, sig);
        }
    }

    pub fn unregister() {
        CHILD_PID.store(0, Ordering::SeqCst);
    }

    pub fn pending() -> Option<i32> {
        match PENDING.load(Ordering::SeqCst) {
            0 => None,
            sig => Some(sig),
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub fn install() -> bool {
        true
    }

    pub fn register(_pid: u32) {}

    pub fn send(_pid: u32, _sig: i32) {}

    pub fn unregister() {}

    pub fn pending() -> Option<i32> {
        None
    }
}

/// Install the process-wide handlers. Returns false if any handler could not
/// be installed; the run still proceeds, just without forwarding.
pub fn install() -> bool {
    imp::install()
}

/// Make `pid` the target of forwarded signals until the guard is dropped.
pub fn forward_to(pid: u32) -> Forwarding {
    imp::register(pid);
    // A signal that landed between spawn and registration was not relayed.
    if let Some(sig) = pending() {
        imp::send(pid, sig);
    }
    Forwarding { _private: () }
}

/// The last termination signal received, if any.
pub fn pending() -> Option<i32> {
    simulated().or_else(imp::pending)
}

#[cfg(not(test))]
fn simulated() -> Option<i32> {
    None
}

#[cfg(test)]
fn simulated() -> Option<i32> {
    SIMULATED.with(|s| s.get())
}

#[cfg(test)]
thread_local! {
    static SIMULATED: std::cell::Cell<Option<i32>> = const { std::cell::Cell::new(None) };
}

/// Makes [`pending`] report `sig` on the current thread until dropped, so
/// tests can exercise interruption without signalling the whole test binary.
#[cfg(test)]
pub struct SimulatedSignal {
    _private: (),
}

#[cfg(test)]
impl SimulatedSignal {
    pub fn set(sig: i32) -> Self {
        SIMULATED.with(|s| s.set(Some(sig)));
        Self { _private: () }
    }
}

#[cfg(test)]
impl Drop for SimulatedSignal {
    fn drop(&mut self) {
        SIMULATED.with(|s| s.set(None));
    }
}

impl Drop for Forwarding {
    fn drop(&mut self) {
        imp::unregister();
    }
}
