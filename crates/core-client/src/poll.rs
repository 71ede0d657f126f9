//! Readiness waiting on the daemon socket.
//!
//! The whole suite is single-threaded and cooperative; the only place a tool
//! is allowed to sleep is inside `poll(2)` with an infinite timeout (or in
//! `pause(2)` after an unrecoverable server error). `EINTR` is surfaced to
//! the caller so signal-driven tools can observe their flag at the loop
//! boundary.

use std::io;
use std::os::unix::io::RawFd;

bitflags::bitflags! {
    /// Event classes the loops care about. `ERROR` only ever appears in the
    /// returned set; it is always waited on implicitly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Events: i16 {
        const READABLE = libc::POLLIN | libc::POLLRDNORM | libc::POLLRDBAND;
        const PRIORITY = libc::POLLPRI;
        const WRITABLE = libc::POLLOUT;
        const ERROR = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
    }
}

/// Block until the descriptor is ready for any of `interest` (or has an
/// error condition). Returns the ready set; `EINTR` comes back as an
/// [`io::ErrorKind::Interrupted`] error.
pub fn wait(fd: RawFd, interest: Events) -> io::Result<Events> {
    let mut pollfd = libc::pollfd {
        fd,
        events: interest.bits(),
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pollfd, 1, -1) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Events::from_bits_truncate(pollfd.revents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn reports_readable_after_peer_writes() {
        let (mut a, b) = UnixStream::pair().unwrap();
        a.write_all(b"x").unwrap();
        let ready = wait(b.as_raw_fd(), Events::READABLE | Events::PRIORITY).unwrap();
        assert!(ready.intersects(Events::READABLE));
    }

    #[test]
    fn reports_writable_on_fresh_socket() {
        let (_a, b) = UnixStream::pair().unwrap();
        let ready = wait(b.as_raw_fd(), Events::WRITABLE).unwrap();
        assert!(ready.intersects(Events::WRITABLE));
    }

    #[test]
    fn reports_hangup_as_error_class() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        let ready = wait(b.as_raw_fd(), Events::READABLE).unwrap();
        assert!(ready.intersects(Events::READABLE | Events::ERROR));
    }
}
