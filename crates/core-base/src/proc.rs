//! Process-level plumbing: signal state reset at startup, the cooperative
//! termination flag, and parking after an unrecoverable server error.

use std::io;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by the termination handler, polled at loop boundaries. Nothing else
/// may happen inside the handler.
static TERMINATED: AtomicBool = AtomicBool::new(false);

/// Reset every signal disposition to its default and empty the process
/// signal mask, so behaviour does not depend on what the parent leaked in.
/// Only a failure to reset `SIGCHLD` is reported; `SIGKILL` and `SIGSTOP`
/// can never be changed and are ignored like every other refusal.
pub fn initialise() -> io::Result<()> {
    for sig in 1..32 {
        let previous = unsafe { libc::signal(sig, libc::SIG_DFL) };
        if previous == libc::SIG_ERR && sig == libc::SIGCHLD {
            return Err(io::Error::last_os_error());
        }
    }
    unsafe {
        let mut mask = MaybeUninit::<libc::sigset_t>::uninit();
        if libc::sigemptyset(mask.as_mut_ptr()) < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::sigprocmask(libc::SIG_SETMASK, mask.as_ptr(), std::ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

extern "C" fn on_terminate(_signo: libc::c_int) {
    TERMINATED.store(true, Ordering::Relaxed);
}

/// Install `SIGINT`/`SIGTERM`/`SIGHUP` handlers that raise the termination
/// flag, and hand the flag back for the cooperative loop to poll.
pub fn install_terminate_flag() -> io::Result<&'static AtomicBool> {
    unsafe {
        let mut action = MaybeUninit::<libc::sigaction>::zeroed().assume_init();
        action.sa_sigaction = on_terminate as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;
        for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
            if libc::sigaction(sig, &action, std::ptr::null_mut()) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(&TERMINATED)
}

/// Suspend until any signal arrives.
pub fn pause_once() {
    unsafe {
        libc::pause();
    }
}

/// Suspend forever. The daemon owns our filters; they are released when the
/// process finally dies.
pub fn park_forever() -> ! {
    loop {
        pause_once();
    }
}

/// Give other processes the CPU between animation frames.
pub fn yield_now() {
    unsafe {
        libc::sched_yield();
    }
}

/// Seconds on the monotonic clock, for animation timing.
pub fn monotonic_seconds() -> io::Result<f64> {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, ts.as_mut_ptr()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    let ts = unsafe { ts.assume_init() };
    Ok(ts.tv_sec as f64 + ts.tv_nsec as f64 / 1_000_000_000.0)
}
