//! Error taxonomy for the protocol client.
//!
//! Three classes matter to callers: transport failures (plain I/O, including
//! the transient `WouldBlock`/`Interrupted` pair the event loop re-arms on),
//! structured errors reported by the daemon, and the terminal
//! "unrecoverable" state after which the connection must not be used for
//! sending again.

use std::fmt;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure on the daemon socket.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Structured error reported by the daemon or raised on its behalf.
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    /// The server reported `ENOTRECOVERABLE`; the client must stop sending
    /// and park until a signal.
    #[error("server entered an unrecoverable state")]
    Unrecoverable,
}

impl ClientError {
    /// Whether the operation may simply be retried after the next readiness
    /// wait.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Io(err) => is_transient_io(err),
            _ => false,
        }
    }
}

pub(crate) fn is_transient_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// A structured error from the daemon protocol: which side raised it,
/// whether the number is custom or an errno, and an optional description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct DaemonError {
    pub server_side: bool,
    pub custom: bool,
    pub number: u64,
    pub description: Option<String>,
}

impl DaemonError {
    /// A non-custom `ENOTRECOVERABLE` ends the conversation for good.
    pub fn is_unrecoverable(&self) -> bool {
        !self.custom && self.number == libc::ENOTRECOVERABLE as u64
    }

    /// Promote to [`ClientError`], surfacing the unrecoverable state.
    pub fn into_client_error(self) -> ClientError {
        if self.is_unrecoverable() {
            ClientError::Unrecoverable
        } else {
            ClientError::Daemon(self)
        }
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.server_side { "server" } else { "client" };
        if self.custom {
            match (self.number, self.description.as_deref()) {
                (n, Some(desc)) if n != 0 => write!(f, "{side}-side error number {n}: {desc}"),
                (n, None) if n != 0 => write!(f, "{side}-side error number {n}"),
                (_, Some(desc)) => write!(f, "{side}-side error: {desc}"),
                (_, None) => write!(f, "{side}-side error"),
            }
        } else if let Some(desc) = self.description.as_deref() {
            write!(f, "{side}-side error: {desc}")
        } else {
            let strerror = io::Error::from_raw_os_error(self.number as i32);
            write!(f, "{side}-side error: {strerror}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_covers_custom_and_errno_forms() {
        let err = DaemonError {
            server_side: true,
            custom: true,
            number: 7,
            description: Some("lost the crtc".into()),
        };
        assert_eq!(err.to_string(), "server-side error number 7: lost the crtc");

        let err = DaemonError {
            server_side: false,
            custom: true,
            number: 7,
            description: None,
        };
        assert_eq!(err.to_string(), "client-side error number 7");

        let err = DaemonError {
            server_side: true,
            custom: false,
            number: libc::ENOENT as u64,
            description: None,
        };
        assert!(err.to_string().starts_with("server-side error: "));
    }

    #[test]
    fn enotrecoverable_is_terminal() {
        let err = DaemonError {
            server_side: true,
            custom: false,
            number: libc::ENOTRECOVERABLE as u64,
            description: None,
        };
        assert!(err.is_unrecoverable());
        assert!(matches!(
            err.into_client_error(),
            ClientError::Unrecoverable
        ));

        let err = DaemonError {
            server_side: true,
            custom: true,
            number: libc::ENOTRECOVERABLE as u64,
            description: None,
        };
        assert!(!err.is_unrecoverable());
    }
}
