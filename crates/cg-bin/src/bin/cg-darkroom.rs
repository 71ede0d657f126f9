//! Darkroom mode: red-inverted monochrome at a low, luminance-scaled
//! brightness, so dark-adapted eyes stay dark-adapted.

use core_base::{CommonOpts, RunError, Session, Tool, args, lifespan_from_flags};
use core_ramps::{RampTriple, Ramps, Sample};

struct DarkroomTool {
    dflag: bool,
    xflag: bool,
    brightness: f64,
}

impl DarkroomTool {
    fn new() -> Self {
        DarkroomTool {
            dflag: false,
            xflag: false,
            brightness: 0.25,
        }
    }
}

/// The darkroom composition: invert red, silence green and blue, pull
/// luminance down, clip the red channel.
fn compose<T: Sample>(triple: &mut RampTriple<T>, brightness: f64) {
    triple.negative(true, false, false);
    triple.rgb_brightness(1.0, 0.0, 0.0);
    triple.cie_brightness(brightness, brightness, brightness);
    triple.clip(true, false, false);
}

fn fill(ramps: &mut Ramps, brightness: f64) {
    match ramps {
        Ramps::F64(triple) => compose(triple, brightness),
        Ramps::F32(triple) => compose(triple, brightness),
        other => {
            // Integer stops go through a double-precision prototype.
            let mut proto = RampTriple::<f64>::identity(other.sizes());
            compose(&mut proto, brightness);
            other.translate_from_f64(&proto);
        }
    }
}

impl Tool for DarkroomTool {
    fn program(&self) -> &'static str {
        "cg-darkroom"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] (-x | [-p priority] [-d] [brightness])"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(3 << 61)
    }

    fn handle_opt(&mut self, opt: &str, _arg: Option<&str>) -> Result<bool, RunError> {
        match opt {
            "-d" => {
                if self.dflag || self.xflag {
                    return Err(RunError::Usage);
                }
                self.dflag = true;
                Ok(false)
            }
            "-x" => {
                if self.xflag || self.dflag {
                    return Err(RunError::Usage);
                }
                self.xflag = true;
                Ok(false)
            }
            _ => Err(RunError::Usage),
        }
    }

    fn handle_args(&mut self, opts: &CommonOpts) -> Result<(), RunError> {
        let argc = opts.positional.len();
        let q = self.xflag as usize + self.dflag as usize + opts.query_count();
        if q > 1 || argc > 1 || (self.xflag && (argc > 0 || opts.priority.is_some())) {
            return Err(RunError::Usage);
        }
        if argc == 1 {
            self.brightness = args::parse_double(&opts.positional[0]).ok_or(RunError::Usage)?;
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(lifespan_from_flags(self.xflag, self.dflag));
        if !self.xflag {
            session.make_slaves();
        }
        let brightness = self.brightness;
        session.install(self.xflag, &mut |_slot, ramps| {
            fill(ramps, brightness);
            Ok(())
        })?;
        if self.dflag {
            session.run_keep_alive()?;
        }
        Ok(())
    }
}

fn main() {
    core_base::run(&mut DarkroomTool::new())
}
