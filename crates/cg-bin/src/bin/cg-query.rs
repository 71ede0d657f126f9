//! Inspect a CRTC: its gamma capabilities, or the ramps of the filters
//! currently applied to it.
//!
//! Unlike the filter tools this one never installs anything, so it talks to
//! the connection directly instead of going through the shared lifecycle
//! driver.

use core_base::{args, proc};
use core_client::{
    ClientError, Colourspace, Connection, CrtcInfo, METHODS, Support, TableQuery,
};
use core_ramps::Ramps;
use std::process::exit;

const PROGRAM: &str = "cg-query";

fn usage() -> ! {
    eprintln!(
        "Usage: {PROGRAM} [-M method] [-S site] [-h high-priority] [-l low-priority] \
         [-f class] -c crtc"
    );
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
    crtc: Option<String>,
    high: Option<String>,
    low: Option<String>,
    class: Option<String>,
}

fn parse_argv(argv: &[String]) -> Opts {
    let mut opts = Opts::default();
    let mut i = 0;
    while i < argv.len() {
        let slot = match argv[i].as_str() {
            "-M" => &mut opts.method,
            "-S" => &mut opts.site,
            "-c" => &mut opts.crtc,
            "-h" => &mut opts.high,
            "-l" => &mut opts.low,
            "-f" => &mut opts.class,
            _ => usage(),
        };
        if slot.is_some() {
            usage();
        }
        match argv.get(i + 1) {
            Some(value) => *slot = Some(value.clone()),
            None => usage(),
        }
        i += 2;
    }
    opts
}

fn print_info(info: &CrtcInfo) {
    println!(
        "Cooperative gamma server running: {}",
        if info.cooperative { "yes" } else { "no" }
    );
    println!(
        "Gamma adjustments supported: {}",
        match info.supported {
            Support::Maybe => "maybe",
            Support::Yes => "yes",
            Support::No => "no",
        }
    );
    println!(
        "Gamma ramps stops (red green blue): {} {} {}",
        info.red_size, info.green_size, info.blue_size
    );
    println!("Gamma ramps stops value type: {}", info.depth.describe());
    if info.colourspace != Colourspace::Unknown {
        println!("Monitor's colourspace: {}", info.colourspace.describe());
    }
    if let Some(gamut) = info.gamut {
        for (channel, (x, y)) in [
            ("red", gamut.red),
            ("green", gamut.green),
            ("blue", gamut.blue),
        ] {
            println!(
                "Monitor's {channel} colour (x, y): {:.6}, {:.6}",
                x as f64 / 1024.0,
                y as f64 / 1024.0
            );
        }
    }
}

/// Print one line per stop: the red, green and blue values side by side,
/// zero-padded lower-case hexadecimal for integer stops and plain decimals
/// for float stops.
fn print_ramps(ramps: &Ramps) {
    match ramps {
        Ramps::U8(t) => {
            for ((r, g), b) in t.red.iter().zip(&t.green).zip(&t.blue) {
                println!("{r:02x} {g:02x} {b:02x}");
            }
        }
        Ramps::U16(t) => {
            for ((r, g), b) in t.red.iter().zip(&t.green).zip(&t.blue) {
                println!("{r:04x} {g:04x} {b:04x}");
            }
        }
        Ramps::U32(t) => {
            for ((r, g), b) in t.red.iter().zip(&t.green).zip(&t.blue) {
                println!("{r:08x} {g:08x} {b:08x}");
            }
        }
        Ramps::U64(t) => {
            for ((r, g), b) in t.red.iter().zip(&t.green).zip(&t.blue) {
                println!("{r:016x} {g:016x} {b:016x}");
            }
        }
        Ramps::F32(t) => {
            for ((r, g), b) in t.red.iter().zip(&t.green).zip(&t.blue) {
                println!("{r:.6} {g:.6} {b:.6}");
            }
        }
        Ramps::F64(t) => {
            for ((r, g), b) in t.red.iter().zip(&t.green).zip(&t.blue) {
                println!("{r:.6} {g:.6} {b:.6}");
            }
        }
    }
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
        if opts.site.is_some()
            || opts.crtc.is_some()
            || opts.high.is_some()
            || opts.low.is_some()
            || opts.class.is_some()
        {
            usage();
        }
        for method in METHODS {
            println!("{method}");
        }
        return;
    }
    if (opts.high.is_some() || opts.low.is_some()) && opts.class.is_none() {
        usage();
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

    let Some(crtc) = opts.crtc.as_deref() else {
        usage()
    };
    if crtc == "?" {
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

    match opts.class.as_deref() {
        None => match conn.get_gamma_info_sync(crtc) {
            Ok(info) => print_info(&info),
            Err(err) => fail(&err),
        },
        Some(class) => {
            let high = match opts.high.as_deref() {
                Some(arg) => args::parse_priority(arg).unwrap_or_else(|| usage()),
                None => i64::MAX,
            };
            let low = match opts.low.as_deref() {
                Some(arg) => args::parse_priority(arg).unwrap_or_else(|| usage()),
                None => i64::MIN,
            };
            let coalesce = class == "*";
            let table = match conn.get_gamma_sync(&TableQuery {
                crtc,
                high_priority: high,
                low_priority: low,
                coalesce,
            }) {
                Ok(table) => table,
                Err(err) => fail(&err),
            };
            let filter = if coalesce {
                table.filters.first()
            } else {
                table.filters.iter().find(|f| f.class == class)
            };
            match filter {
                Some(filter) => print_ramps(&filter.ramps),
                None => {
                    eprintln!("{PROGRAM}: no filter with class: {class}");
                    exit(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ramps::{Depth, RampSizes, RampTriple};

    #[test]
    fn hex_width_follows_the_depth() {
        // Smoke the formatting paths; the exact line shape is what the
        // shell scripts around this tool scrape.
        let t = RampTriple::<u8>::identity(RampSizes::uniform(4));
        assert_eq!(format!("{:02x}", t.red[3]), "ff");
        let t = RampTriple::<u16>::identity(RampSizes::uniform(4));
        assert_eq!(format!("{:04x}", t.red[3]), "ffff");
        let t = RampTriple::<u64>::identity(RampSizes::uniform(4));
        assert_eq!(format!("{:016x}", t.red[0]), "0000000000000000");
    }

    #[test]
    fn brilliance_style_table_prints_floor_values() {
        let mut ramps = Ramps::identity(Depth::U8, RampSizes::uniform(256));
        ramps.rgb_brightness(0.5, 0.25, 0.0);
        match &ramps {
            Ramps::U8(t) => {
                let line = format!("{:02x} {:02x} {:02x}", t.red[255], t.green[255], t.blue[255]);
                assert_eq!(line, "7f 3f 00");
            }
            _ => unreachable!(),
        }
    }
}
