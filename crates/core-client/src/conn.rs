//! The connection to the cooperative gamma daemon.
//!
//! All traffic shares one `UnixStream`. Outbound requests are serialised
//! into a send buffer; in non-blocking mode a short write leaves the rest
//! buffered and [`Connection::flush`] retries it when the socket becomes
//! writable again, so no request is ever lost to a transient `EAGAIN`.
//! Inbound bytes accumulate until they form whole messages, which
//! [`Connection::synchronise`] routes to the caller's correlation tokens.

use crate::error::{ClientError, DaemonError, is_transient_io};
use crate::types::{
    Colourspace, CrtcInfo, FilterRequest, FilterTable, Gamut, Lifespan, Support, TableFilter,
    TableQuery,
};
use crate::wire::{self, Message};
use core_ramps::{Depth, RampSizes, Ramps};
use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Correlation token for one outstanding request. Returned at send time and
/// redeemed by the matching `_recv` call after [`Connection::synchronise`]
/// selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncToken {
    id: u64,
}

pub struct Connection {
    stream: UnixStream,
    /// Bytes not yet accepted by the socket.
    send_buf: Vec<u8>,
    /// Bytes received but not yet parsed into a whole message.
    recv_buf: Vec<u8>,
    /// Message picked out by `synchronise`, awaiting its `_recv`.
    selected: Option<Message>,
    /// Request ids whose response has been consumed. A later duplicate
    /// response to any of these is drained and discarded.
    completed: HashSet<u64>,
    next_id: u64,
}

fn socket_path(method: Option<&str>, site: Option<&str>) -> PathBuf {
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("/run/user/{}", unsafe { libc::getuid() })));
    let method = method.unwrap_or("default");
    let name = match site {
        Some(site) => format!("{method}.{site}.socket"),
        None => format!("{method}.socket"),
    };
    dir.join("coopgammad").join(name)
}

fn proto_error(what: &str) -> ClientError {
    ClientError::Io(io::Error::new(io::ErrorKind::InvalidData, what.to_owned()))
}

impl Connection {
    /// Connect to the daemon socket for `method` and `site`. The connection
    /// starts in blocking mode.
    pub fn connect(method: Option<&str>, site: Option<&str>) -> io::Result<Connection> {
        let path = socket_path(method, site);
        let stream = UnixStream::connect(&path)?;
        debug!(target: "client.conn", path = %path.display(), "connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream) -> Connection {
        Connection {
            stream,
            send_buf: Vec::new(),
            recv_buf: Vec::new(),
            selected: None,
            completed: HashSet::new(),
            next_id: 0,
        }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.stream.set_nonblocking(nonblocking)
    }

    /// Whether buffered request bytes still wait for the socket.
    pub fn flush_pending(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Push buffered request bytes into the socket. In non-blocking mode a
    /// back-pressured socket surfaces as `WouldBlock` with the remainder
    /// kept for the next call.
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.send_buf.is_empty() {
            match self.stream.write(&self.send_buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "daemon socket accepted no bytes",
                    ));
                }
                Ok(n) => {
                    self.send_buf.drain(..n);
                    trace!(target: "client.wire", sent = n, pending = self.send_buf.len(), "flush");
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Queue one request and opportunistically flush. A transient flush
    /// failure is not an error; the request is safely buffered.
    fn send_request(
        &mut self,
        headers: Vec<(&str, String)>,
        payload: Option<&[u8]>,
    ) -> io::Result<AsyncToken> {
        let id = self.next_id;
        self.next_id += 1;
        let mut full = headers;
        full.push(("Message ID", id.to_string()));
        let borrowed: Vec<(&str, &str)> = full.iter().map(|(k, v)| (*k, v.as_str())).collect();
        wire::render(&borrowed, payload, &mut self.send_buf);
        trace!(
            target: "client.wire",
            id,
            payload = payload.map_or(0, <[u8]>::len),
            "request_queued"
        );
        match self.flush() {
            Ok(()) => {}
            Err(err) if is_transient_io(&err) => {}
            Err(err) => return Err(err),
        }
        Ok(AsyncToken { id })
    }

    // ---- receiving ----------------------------------------------------

    fn fill_recv(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        match self.stream.read(&mut chunk) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by daemon",
            )),
            Ok(n) => {
                self.recv_buf.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn next_message(&mut self) -> Result<Option<Message>, ClientError> {
        match wire::try_parse(&self.recv_buf) {
            Ok(Some((msg, consumed))) => {
                self.recv_buf.drain(..consumed);
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(err) => Err(ClientError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                err,
            ))),
        }
    }

    /// Read until one whole message is available. Blocks or returns
    /// `WouldBlock` according to the stream's blocking mode.
    fn read_message(&mut self) -> Result<Message, ClientError> {
        loop {
            if let Some(msg) = self.next_message()? {
                return Ok(msg);
            }
            self.fill_recv()?;
        }
    }

    /// Wait for a response to one of `tokens` and return its index.
    ///
    /// Messages answering already-completed tokens are duplicates from the
    /// daemon's point of view and are drained and discarded, as are
    /// notifications matching no token (the keep-alive loop passes an empty
    /// token set for exactly that effect). Transient conditions
    /// (`WouldBlock`, `EINTR`) surface as transient I/O errors for the
    /// caller's readiness loop to re-arm on.
    pub fn synchronise(&mut self, tokens: &[AsyncToken]) -> Result<usize, ClientError> {
        if self.selected.is_some() {
            // The previous selection was never consumed; drop it rather
            // than hand the same message out twice.
            self.selected = None;
        }
        loop {
            let msg = self.read_message()?;
            let Some(id) = msg.response_to() else {
                // Untagged messages are server notifications. The only one
                // that matters is the server declaring itself unrecoverable;
                // everything else is dropped.
                if let Some(err) = Self::daemon_error(&msg) {
                    if err.is_unrecoverable() {
                        return Err(ClientError::Unrecoverable);
                    }
                }
                trace!(target: "client.conn", "discarding untagged message");
                continue;
            };
            if self.completed.contains(&id) {
                trace!(target: "client.conn", id, "discarding duplicate completion");
                continue;
            }
            match tokens.iter().position(|token| token.id == id) {
                Some(index) => {
                    self.selected = Some(msg);
                    return Ok(index);
                }
                None => {
                    trace!(target: "client.conn", id, "discarding unmatched response");
                    continue;
                }
            }
        }
    }

    fn take_selected(&mut self, token: AsyncToken) -> Result<Message, ClientError> {
        let msg = self
            .selected
            .take()
            .ok_or_else(|| proto_error("no response selected for this token"))?;
        if msg.response_to() != Some(token.id) {
            return Err(proto_error("selected response answers a different token"));
        }
        self.completed.insert(token.id);
        // Duplicates only ever chase recent requests; keep the set bounded
        // for the animation tools that send forever.
        if self.completed.len() > 2048 {
            let horizon = self.next_id.saturating_sub(1024);
            self.completed.retain(|&id| id >= horizon);
        }
        Ok(msg)
    }

    fn daemon_error(msg: &Message) -> Option<DaemonError> {
        let number = msg.get("Error")?.parse().unwrap_or(0);
        Some(DaemonError {
            number,
            custom: msg.get("Custom error") == Some("yes"),
            server_side: msg.get("Server side") != Some("no"),
            description: msg.get("Error description").map(str::to_owned),
        })
    }

    fn check_error(msg: &Message) -> Result<(), ClientError> {
        match Self::daemon_error(msg) {
            Some(err) => Err(err.into_client_error()),
            None => Ok(()),
        }
    }

    // ---- asynchronous RPCs --------------------------------------------

    pub fn get_gamma_info_send(&mut self, crtc: &str) -> io::Result<AsyncToken> {
        self.send_request(
            vec![
                ("Command", "get-gamma-info".to_owned()),
                ("CRTC", crtc.to_owned()),
            ],
            None,
        )
    }

    pub fn get_gamma_info_recv(&mut self, token: AsyncToken) -> Result<CrtcInfo, ClientError> {
        let msg = self.take_selected(token)?;
        Self::check_error(&msg)?;
        parse_crtc_info(&msg)
    }

    pub fn set_gamma_send(&mut self, filter: &FilterRequest<'_>) -> io::Result<AsyncToken> {
        let mut headers = vec![
            ("Command", "set-gamma".to_owned()),
            ("CRTC", filter.crtc.to_owned()),
            ("Class", filter.class.to_owned()),
            ("Lifespan", filter.lifespan.wire_name().to_owned()),
        ];
        if filter.lifespan != Lifespan::Remove {
            if let Some(priority) = filter.priority {
                headers.push(("Priority", priority.to_string()));
            }
        }
        let payload = filter.ramps.map(|ramps| {
            let mut bytes = Vec::with_capacity(ramps.byte_len());
            ramps.encode_ne(&mut bytes);
            bytes
        });
        self.send_request(headers, payload.as_deref())
    }

    pub fn set_gamma_recv(&mut self, token: AsyncToken) -> Result<(), ClientError> {
        let msg = self.take_selected(token)?;
        Self::check_error(&msg)
    }

    // ---- synchronous RPCs (startup only) ------------------------------

    /// Run one request to completion. Only used from blocking mode.
    fn roundtrip(&mut self, token: AsyncToken) -> Result<Message, ClientError> {
        loop {
            match self.flush() {
                Ok(()) => break,
                Err(err) if is_transient_io(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        loop {
            match self.synchronise(std::slice::from_ref(&token)) {
                Ok(_) => return self.take_selected(token),
                Err(err) if err.is_transient() => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// List the names of every CRTC the daemon drives.
    pub fn get_crtcs_sync(&mut self) -> Result<Vec<String>, ClientError> {
        let token = self.send_request(vec![("Command", "enumerate-crtcs".to_owned())], None)?;
        let msg = self.roundtrip(token)?;
        Self::check_error(&msg)?;
        let text = String::from_utf8(msg.payload)
            .map_err(|_| proto_error("CRTC list is not valid UTF-8"))?;
        Ok(text.lines().map(str::to_owned).collect())
    }

    pub fn get_gamma_info_sync(&mut self, crtc: &str) -> Result<CrtcInfo, ClientError> {
        let token = self.get_gamma_info_send(crtc)?;
        let msg = self.roundtrip(token)?;
        Self::check_error(&msg)?;
        parse_crtc_info(&msg)
    }

    /// Retrieve the table of filters applied to a CRTC.
    pub fn get_gamma_sync(&mut self, query: &TableQuery<'_>) -> Result<FilterTable, ClientError> {
        let token = self.send_request(
            vec![
                ("Command", "get-gamma".to_owned()),
                ("CRTC", query.crtc.to_owned()),
                ("High priority", query.high_priority.to_string()),
                ("Low priority", query.low_priority.to_string()),
                (
                    "Coalesce",
                    if query.coalesce { "yes" } else { "no" }.to_owned(),
                ),
            ],
            None,
        )?;
        let msg = self.roundtrip(token)?;
        Self::check_error(&msg)?;
        parse_filter_table(&msg)
    }
}

fn parse_depth(value: &str) -> Option<Depth> {
    match value {
        "8" => Some(Depth::U8),
        "16" => Some(Depth::U16),
        "32" => Some(Depth::U32),
        "64" => Some(Depth::U64),
        "f" => Some(Depth::F32),
        "d" => Some(Depth::F64),
        _ => None,
    }
}

fn parse_size(msg: &Message, key: &str) -> Result<usize, ClientError> {
    msg.get(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| proto_error("gamma info is missing a ramp size"))
}

fn parse_crtc_info(msg: &Message) -> Result<CrtcInfo, ClientError> {
    let depth = msg
        .get("Depth")
        .and_then(parse_depth)
        .ok_or_else(|| proto_error("gamma info carries an unknown depth"))?;
    let supported = msg
        .get("Supported")
        .and_then(Support::from_wire)
        .ok_or_else(|| proto_error("gamma info carries an unknown support state"))?;
    let colourspace = match msg.get("Colourspace") {
        None => Colourspace::Unknown,
        Some(value) => Colourspace::from_wire(value).unwrap_or(Colourspace::Unknown),
    };
    let gamut = msg.get("Gamut").and_then(|value| {
        let mut fields = value.split_whitespace().map(|f| f.parse::<u16>().ok());
        let mut next = || fields.next().flatten();
        Some(Gamut {
            red: (next()?, next()?),
            green: (next()?, next()?),
            blue: (next()?, next()?),
        })
    });
    Ok(CrtcInfo {
        cooperative: msg.get("Cooperative") == Some("yes"),
        depth,
        supported,
        red_size: parse_size(msg, "Red size")?,
        green_size: parse_size(msg, "Green size")?,
        blue_size: parse_size(msg, "Blue size")?,
        colourspace,
        gamut,
    })
}

/// Payload layout of a `get-gamma` response: per filter, a native-endian
/// `i64` priority, a native-endian `u32` class length, the class bytes, and
/// one ramp set in the table's depth and geometry. A coalesced table is a
/// single anonymous filter.
fn parse_filter_table(msg: &Message) -> Result<FilterTable, ClientError> {
    let depth = msg
        .get("Depth")
        .and_then(parse_depth)
        .ok_or_else(|| proto_error("filter table carries an unknown depth"))?;
    let sizes = RampSizes::new(
        parse_size(msg, "Red size")?,
        parse_size(msg, "Green size")?,
        parse_size(msg, "Blue size")?,
    );
    let count: usize = msg
        .get("Filters")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| proto_error("filter table is missing its filter count"))?;

    let ramp_bytes = sizes.total() * depth.stop_size();
    let mut rest = msg.payload.as_slice();
    let mut filters = Vec::with_capacity(count);
    for _ in 0..count {
        let (priority, after) = split_i64(rest)?;
        let (class_len, after) = split_u32(after)?;
        let class_len = class_len as usize;
        if after.len() < class_len + ramp_bytes {
            return Err(proto_error("filter table payload is truncated"));
        }
        let class = std::str::from_utf8(&after[..class_len])
            .map_err(|_| proto_error("filter class is not valid UTF-8"))?
            .to_owned();
        let ramps = Ramps::decode_ne(depth, sizes, &after[class_len..class_len + ramp_bytes])
            .map_err(|_| proto_error("filter table ramps are malformed"))?;
        rest = &after[class_len + ramp_bytes..];
        filters.push(TableFilter {
            priority,
            class,
            ramps,
        });
    }
    Ok(FilterTable {
        depth,
        sizes,
        filters,
    })
}

fn split_i64(bytes: &[u8]) -> Result<(i64, &[u8]), ClientError> {
    if bytes.len() < 8 {
        return Err(proto_error("filter table payload is truncated"));
    }
    let (head, rest) = bytes.split_at(8);
    let value = i64::from_ne_bytes(
        head.try_into()
            .map_err(|_| proto_error("filter table payload is truncated"))?,
    );
    Ok((value, rest))
}

fn split_u32(bytes: &[u8]) -> Result<(u32, &[u8]), ClientError> {
    if bytes.len() < 4 {
        return Err(proto_error("filter table payload is truncated"));
    }
    let (head, rest) = bytes.split_at(4);
    let value = u32::from_ne_bytes(
        head.try_into()
            .map_err(|_| proto_error("filter table payload is truncated"))?,
    );
    Ok((value, rest))
}
