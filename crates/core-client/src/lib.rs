//! Client side of the cooperative gamma daemon protocol.
//!
//! One duplex stream socket carries every request this process ever makes.
//! Requests are identified by a message id and may complete out of order;
//! [`Connection::synchronise`] routes responses back to the correlation
//! tokens handed out at send time. The connection can be switched between
//! blocking mode (startup RPCs, keep-alive) and non-blocking mode (the
//! install hot path), where partial sends are buffered and retried by
//! [`Connection::flush`].

mod conn;
mod error;
mod poll;
mod types;
mod wire;

pub use conn::{AsyncToken, Connection};
pub use error::{ClientError, DaemonError};
pub use poll::{Events, wait};
pub use types::{
    Colourspace, CrtcInfo, FilterRequest, FilterTable, Gamut, Lifespan, Support, TableFilter,
    TableQuery,
};

/// Recognised adjustment method names. Listing them does not require a
/// connection; the daemon owning the socket decides what it actually drives.
pub const METHODS: [&str; 3] = ["dummy", "randr", "drm"];
