//! End-to-end install flow against a scripted daemon: coalescing, the
//! non-blocking send loop, and out-of-order completion routing.

use core_base::{Session, lifespan_from_flags};
use core_client::{Colourspace, Connection, CrtcInfo, Lifespan, Support};
use core_ramps::{Depth, RampSizes};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::thread;

fn info(depth: Depth, stops: usize) -> CrtcInfo {
    CrtcInfo {
        cooperative: true,
        depth,
        supported: Support::Yes,
        red_size: stops,
        green_size: stops,
        blue_size: stops,
        colourspace: Colourspace::Srgb,
        gamut: None,
    }
}

/// One request as the daemon saw it.
#[derive(Debug)]
struct Request {
    headers: HashMap<String, String>,
    payload: Vec<u8>,
}

impl Request {
    fn id(&self) -> u64 {
        self.headers["Message ID"].parse().unwrap()
    }
}

/// Read whole messages off the daemon end of the socket.
struct Parser {
    stream: UnixStream,
    buffer: Vec<u8>,
}

impl Parser {
    fn next_request(&mut self) -> Request {
        loop {
            if let Some(request) = self.try_parse() {
                return request;
            }
            let mut chunk = [0u8; 65536];
            let n = self.stream.read(&mut chunk).unwrap();
            assert!(n > 0, "client hung up mid-test");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn try_parse(&mut self) -> Option<Request> {
        let end = self
            .buffer
            .windows(2)
            .position(|pair| pair == b"\n\n")
            .map(|at| at + 2)?;
        let text = String::from_utf8(self.buffer[..end].to_vec()).unwrap();
        let mut headers = HashMap::new();
        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            let (key, value) = line.split_once(": ").unwrap();
            headers.insert(key.to_owned(), value.to_owned());
        }
        let length: usize = headers
            .get("Length")
            .map(|v| v.parse().unwrap())
            .unwrap_or(0);
        if self.buffer.len() < end + length {
            return None;
        }
        let payload = self.buffer[end..end + length].to_vec();
        self.buffer.drain(..end + length);
        Some(Request { headers, payload })
    }

    fn respond(&mut self, id: u64) {
        let reply = format!("In response to: {id}\n\n");
        self.stream.write_all(reply.as_bytes()).unwrap();
    }

    fn respond_error(&mut self, id: u64, number: u32, description: &str) {
        let reply = format!(
            "In response to: {id}\nError: {number}\nError description: {description}\n\n"
        );
        self.stream.write_all(reply.as_bytes()).unwrap();
    }
}

fn build_session(infos: Vec<CrtcInfo>) -> (Session, UnixStream) {
    let (client, server) = UnixStream::pair().unwrap();
    client.set_nonblocking(true).unwrap();
    let crtcs: Vec<String> = (0..infos.len()).map(|i| format!("CRTC-{i}")).collect();
    let session = Session::new(
        Connection::from_stream(client),
        crtcs,
        infos,
        "cg-tools::cg-test::standard",
        &[""],
        1 << 61,
    );
    (session, server)
}

#[test]
fn coalesced_install_sends_one_buffer_twice() {
    let (mut session, server) = build_session(vec![info(Depth::U8, 256), info(Depth::U8, 256)]);

    let (tx, rx) = mpsc::channel();
    let daemon = thread::spawn(move || {
        let mut parser = Parser {
            stream: server,
            buffer: Vec::new(),
        };
        let first = parser.next_request();
        let second = parser.next_request();
        // answer in reverse order to exercise the correlator
        parser.respond(second.id());
        parser.respond(first.id());
        tx.send(first).unwrap();
        tx.send(second).unwrap();
    });

    session.set_lifespans(lifespan_from_flags(false, false));
    session.make_slaves();
    assert_eq!(session.ramp_buffers(), 1);

    session
        .install(false, &mut |_slot, ramps| {
            ramps.rgb_brightness(0.5, 0.25, 0.0);
            if ramps.depth().is_float() {
                ramps.clip(true, true, true);
            }
            Ok(())
        })
        .unwrap();
    daemon.join().unwrap();

    let first = rx.recv().unwrap();
    let second = rx.recv().unwrap();

    for request in [&first, &second] {
        assert_eq!(request.headers["Command"], "set-gamma");
        assert_eq!(request.headers["Class"], "cg-tools::cg-test::standard");
        assert_eq!(request.headers["Lifespan"], "until-removal");
        assert_eq!(request.headers["Priority"], (1i64 << 61).to_string());
        assert_eq!(request.payload.len(), 3 * 256);
    }
    assert_eq!(first.headers["CRTC"], "CRTC-0");
    assert_eq!(second.headers["CRTC"], "CRTC-1");
    // the slave submitted the master's storage byte for byte
    assert_eq!(first.payload, second.payload);

    // floor(i * b) per channel
    for i in 0..256usize {
        assert_eq!(first.payload[i], (i as f64 * 0.5) as u8, "red stop {i}");
        assert_eq!(first.payload[256 + i], (i as f64 * 0.25) as u8, "green stop {i}");
        assert_eq!(first.payload[512 + i], 0, "blue stop {i}");
    }

    assert!(session.slots.iter().all(|slot| slot.synced));
    assert!(session.slots.iter().all(|slot| !slot.failed));
}

#[test]
fn unsupported_crtcs_are_skipped() {
    let mut unsupported = info(Depth::U16, 256);
    unsupported.supported = Support::No;
    let (mut session, server) = build_session(vec![unsupported, info(Depth::U16, 256)]);

    let daemon = thread::spawn(move || {
        let mut parser = Parser {
            stream: server,
            buffer: Vec::new(),
        };
        let only = parser.next_request();
        assert_eq!(only.headers["CRTC"], "CRTC-1");
        parser.respond(only.id());
    });

    session.set_lifespans(Lifespan::UntilRemoval);
    session
        .install(false, &mut |_slot, _ramps| Ok(()))
        .unwrap();
    daemon.join().unwrap();
    assert!(session.slots[1].synced);
    assert!(!session.slots[0].synced);
}

#[test]
fn one_failing_crtc_does_not_abandon_the_rest() {
    let (mut session, server) = build_session(vec![info(Depth::U8, 64), info(Depth::U16, 64)]);

    let daemon = thread::spawn(move || {
        let mut parser = Parser {
            stream: server,
            buffer: Vec::new(),
        };
        let first = parser.next_request();
        let second = parser.next_request();
        parser.respond_error(first.id(), 93, "lost the crtc");
        parser.respond(second.id());
    });

    session.set_lifespans(Lifespan::UntilRemoval);
    let err = session
        .install(false, &mut |_slot, _ramps| Ok(()))
        .unwrap_err();
    daemon.join().unwrap();

    // both tokens completed; the failure is recorded and reported
    assert!(session.slots.iter().all(|slot| slot.synced));
    assert!(session.slots[0].failed);
    assert!(session.slots[0].pending_error.is_some());
    assert!(!session.slots[1].failed);
    assert!(format!("{err}").contains("error"));
}

#[test]
fn removal_requests_carry_headers_only() {
    let (mut session, server) = build_session(vec![info(Depth::U16, 1024)]);

    let daemon = thread::spawn(move || {
        let mut parser = Parser {
            stream: server,
            buffer: Vec::new(),
        };
        let request = parser.next_request();
        assert_eq!(request.headers["Lifespan"], "remove");
        assert!(request.payload.is_empty());
        assert!(!request.headers.contains_key("Priority"));
        parser.respond(request.id());
    });

    session.set_lifespans(lifespan_from_flags(true, false));
    session.install(true, &mut |_slot, _ramps| Ok(())).unwrap();
    daemon.join().unwrap();
}
