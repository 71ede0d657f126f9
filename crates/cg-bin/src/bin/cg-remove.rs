//! Delete filters by class from the selected CRTCs.
//!
//! One removal request per `(crtc, class)` pair, all in flight at once over
//! the non-blocking connection; the readiness loop retries back-pressured
//! sends and routes completions, so every pair completes exactly once
//! whatever order the daemon answers in.

use core_base::proc;
use core_client::{
    ClientError, Connection, Events, FilterRequest, Lifespan, METHODS, wait,
};
use std::process::exit;

const PROGRAM: &str = "cg-remove";

fn usage() -> ! {
    eprintln!("Usage: {PROGRAM} [-M method] [-S site] [-c crtc]... class...");
    exit(1);
}

fn fail(err: &ClientError) -> ! {
    eprintln!("{PROGRAM}: {err}");
    exit(1);
}

#[derive(Default)]
struct Opts {
    method: Option<String>,
    site: Option<String>,
    crtcs: Vec<String>,
    classes: Vec<String>,
}

fn parse_argv(argv: &[String]) -> Opts {
    let mut opts = Opts::default();
    let mut i = 0;
    while i < argv.len() {
        match argv[i].as_str() {
            "-M" => {
                if opts.method.is_some() {
                    usage();
                }
                opts.method = Some(argv.get(i + 1).cloned().unwrap_or_else(|| usage()));
                i += 2;
            }
            "-S" => {
                if opts.site.is_some() {
                    usage();
                }
                opts.site = Some(argv.get(i + 1).cloned().unwrap_or_else(|| usage()));
                i += 2;
            }
            "-c" => {
                opts.crtcs.push(argv.get(i + 1).cloned().unwrap_or_else(|| usage()));
                i += 2;
            }
            arg if arg.starts_with('-') && arg.len() == 2 => usage(),
            arg => {
                opts.classes.push(arg.to_owned());
                i += 1;
            }
        }
    }
    opts
}

/// Send every `(crtc, class)` removal and drive the loop until each one has
/// completed.
fn remove_filters(
    conn: &mut Connection,
    crtcs: &[String],
    classes: &[String],
) -> Result<(), ClientError> {
    let mut tokens = Vec::with_capacity(crtcs.len() * classes.len());
    for crtc in crtcs {
        for class in classes {
            tokens.push(conn.set_gamma_send(&FilterRequest {
                crtc,
                class,
                priority: None,
                lifespan: Lifespan::Remove,
                ramps: None,
            })?);
        }
    }

    let mut synced = vec![false; tokens.len()];
    let mut remaining = tokens.len();
    while remaining > 0 || conn.flush_pending() {
        let mut interest = Events::READABLE | Events::PRIORITY;
        if conn.flush_pending() {
            interest |= Events::WRITABLE;
        }
        let ready = match wait(conn.as_raw_fd(), interest) {
            Ok(ready) => ready,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };

        if ready.intersects(Events::WRITABLE | Events::ERROR) {
            match conn.flush() {
                Ok(()) => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => return Err(err.into()),
            }
        }

        if ready.intersects(Events::READABLE | Events::PRIORITY | Events::ERROR) {
            loop {
                match conn.synchronise(&tokens) {
                    Ok(index) => {
                        if !synced[index] {
                            synced[index] = true;
                            remaining -= 1;
                            conn.set_gamma_recv(tokens[index])?;
                        }
                    }
                    Err(err) if err.is_transient() => break,
                    Err(err) => return Err(err),
                }
            }
        }
    }
    Ok(())
}

fn main() {
    core_base::init_logging();
    if let Err(err) = proc::initialise() {
        eprintln!("{PROGRAM}: {err}");
        exit(1);
    }
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let opts = parse_argv(&argv);

    if opts.method.as_deref() == Some("?") {
        if opts.site.is_some() || !opts.crtcs.is_empty() || !opts.classes.is_empty() {
            usage();
        }
        for method in METHODS {
            println!("{method}");
        }
        return;
    }

    let mut conn =
        match Connection::connect(opts.method.as_deref(), opts.site.as_deref()) {
            Ok(conn) => conn,
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                eprintln!("{PROGRAM}: server failed to initialise");
                exit(1);
            }
            Err(err) => fail(&err.into()),
        };

    if opts.crtcs.iter().any(|crtc| crtc == "?") {
        if !opts.classes.is_empty() {
            usage();
        }
        match conn.get_crtcs_sync() {
            Ok(crtcs) => {
                for name in crtcs {
                    println!("{name}");
                }
            }
            Err(err) => fail(&err),
        }
        return;
    }

    if opts.classes.is_empty() {
        usage();
    }

    let crtcs = if opts.crtcs.is_empty() {
        match conn.get_crtcs_sync() {
            Ok(crtcs) => crtcs,
            Err(err) => fail(&err),
        }
    } else {
        opts.crtcs.clone()
    };

    if let Err(err) = conn.set_nonblocking(true) {
        eprintln!("{PROGRAM}: {err}");
        exit(1);
    }
    if let Err(err) = remove_filters(&mut conn, &crtcs, &opts.classes) {
        fail(&err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classes_and_crtcs_split() {
        let opts = parse_argv(&argv(&["-c", "C0", "-c", "C1", "X", "Y"]));
        assert_eq!(opts.crtcs, vec!["C0", "C1"]);
        assert_eq!(opts.classes, vec!["X", "Y"]);
    }

    #[test]
    fn every_pair_gets_a_removal() {
        use std::io::Read;
        use std::os::unix::net::UnixStream;

        let (client, server) = UnixStream::pair().unwrap();
        server.set_nonblocking(true).unwrap();
        let mut conn = Connection::from_stream(client);

        let crtcs = vec!["C0".to_string(), "C1".to_string()];
        let classes = vec!["X".to_string(), "Y".to_string()];
        for crtc in &crtcs {
            for class in &classes {
                conn.set_gamma_send(&FilterRequest {
                    crtc,
                    class,
                    priority: None,
                    lifespan: Lifespan::Remove,
                    ramps: None,
                })
                .unwrap();
            }
        }

        let mut raw = Vec::new();
        let mut stream = &server;
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => raw.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => panic!("{err}"),
            }
        }
        let text = String::from_utf8(raw).unwrap();
        assert_eq!(text.matches("Command: set-gamma").count(), 4);
        assert_eq!(text.matches("Lifespan: remove").count(), 4);
        for needle in ["CRTC: C0", "CRTC: C1", "Class: X", "Class: Y"] {
            assert_eq!(text.matches(&format!("{needle}\n")).count(), 2, "{needle}");
        }
    }
}
