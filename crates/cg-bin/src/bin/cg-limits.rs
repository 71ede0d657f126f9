//! Per-channel brightness and contrast limits, from the command line or
//! from the `brightness` and `contrast` configuration tables.

use core_base::config::{self, TripleTable};
use core_base::{CommonOpts, RunError, Session, Tool, args, lifespan_from_flags};
use core_client::Support;
use core_ramps::{RampTriple, Ramps, Sample};

#[derive(Default)]
struct LimitsTool {
    dflag: bool,
    xflag: bool,
    brightness_file: Option<String>,
    contrast_file: Option<String>,
    red: (f64, f64),
    green: (f64, f64),
    blue: (f64, f64),
    brightness_table: Option<TripleTable>,
    contrast_table: Option<TripleTable>,
}

impl LimitsTool {
    fn new() -> Self {
        LimitsTool {
            red: (0.0, 1.0),
            green: (0.0, 1.0),
            blue: (0.0, 1.0),
            ..LimitsTool::default()
        }
    }
}

/// Apply limits. `(min, max)` pairs are brightness and contrast: the output
/// range each channel is squeezed into.
fn fill(ramps: &mut Ramps, red: (f64, f64), green: (f64, f64), blue: (f64, f64)) {
    fn compose<T: Sample>(triple: &mut RampTriple<T>, red: (f64, f64), green: (f64, f64), blue: (f64, f64)) {
        triple.rgb_limits(red.0, red.1, green.0, green.1, blue.0, blue.1);
        triple.clip(true, true, true);
    }
    match ramps {
        Ramps::F64(triple) => compose(triple, red, green, blue),
        Ramps::F32(triple) => compose(triple, red, green, blue),
        other => {
            let mut proto = RampTriple::<f64>::identity(other.sizes());
            compose(&mut proto, red, green, blue);
            other.translate_from_f64(&proto);
        }
    }
}

impl Tool for LimitsTool {
    fn program(&self) -> &'static str {
        "cg-limits"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] (-x | [-p priority] [-d] \
         ([-B brightness-file] [-C contrast-file] | brightness-all:contrast-all | \
         brightness-red:contrast-red brightness-green:contrast-green brightness-blue:contrast-blue))"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(-(1 << 62))
    }

    fn handle_opt(&mut self, opt: &str, arg: Option<&str>) -> Result<bool, RunError> {
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
            "-B" => {
                if self.brightness_file.is_some() {
                    return Err(RunError::Usage);
                }
                self.brightness_file = Some(arg.ok_or(RunError::Usage)?.to_owned());
                Ok(true)
            }
            "-C" => {
                if self.contrast_file.is_some() {
                    return Err(RunError::Usage);
                }
                self.contrast_file = Some(arg.ok_or(RunError::Usage)?.to_owned());
                Ok(true)
            }
            _ => Err(RunError::Usage),
        }
    }

    fn handle_args(&mut self, opts: &CommonOpts) -> Result<(), RunError> {
        let argc = opts.positional.len();
        let has_file = self.brightness_file.is_some() || self.contrast_file.is_some();
        let q = self.xflag as usize + self.dflag as usize + opts.query_count();
        if q > 1
            || (self.xflag && (has_file || argc > 0 || opts.priority.is_some()))
            || (has_file && argc > 0)
        {
            return Err(RunError::Usage);
        }

        match argc {
            0 => {}
            1 => {
                self.red = args::parse_twidouble(&opts.positional[0]).ok_or(RunError::Usage)?;
                self.green = self.red;
                self.blue = self.red;
            }
            3 => {
                self.red = args::parse_twidouble(&opts.positional[0]).ok_or(RunError::Usage)?;
                self.green = args::parse_twidouble(&opts.positional[1]).ok_or(RunError::Usage)?;
                self.blue = args::parse_twidouble(&opts.positional[2]).ok_or(RunError::Usage)?;
            }
            _ => return Err(RunError::Usage),
        }

        // With no values and no explicit files, fall back to the default
        // brightness and contrast tables.
        if argc == 0 && !self.xflag && opts.query_count() == 0 {
            let program = self.program();
            let brightness_path = match &self.brightness_file {
                Some(file) => std::path::PathBuf::from(file),
                None => config::conf_path("brightness")
                    .ok_or_else(|| no_home())?,
            };
            self.brightness_table =
                Some(config::load_triple_table(program, &brightness_path, true)?);
            let contrast_path = match &self.contrast_file {
                Some(file) => std::path::PathBuf::from(file),
                None => config::conf_path("contrast").ok_or_else(|| no_home())?,
            };
            self.contrast_table = Some(config::load_triple_table(program, &contrast_path, true)?);
        } else if has_file {
            let program = self.program();
            if let Some(file) = &self.brightness_file {
                self.brightness_table = Some(config::load_triple_table(
                    program,
                    std::path::Path::new(file),
                    true,
                )?);
            }
            if let Some(file) = &self.contrast_file {
                self.contrast_table = Some(config::load_triple_table(
                    program,
                    std::path::Path::new(file),
                    true,
                )?);
            }
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(lifespan_from_flags(self.xflag, self.dflag));

        let tables = (self.brightness_table.take(), self.contrast_table.take());
        if tables.0.is_none() && tables.1.is_none() {
            if !self.xflag {
                session.make_slaves();
            }
            let (red, green, blue) = (self.red, self.green, self.blue);
            session.install(self.xflag, &mut |_slot, ramps| {
                fill(ramps, red, green, blue);
                Ok(())
            })?;
        } else {
            // Per-output values: no coalescing, only listed outputs.
            let (brightness, contrast) = tables;
            for slot in 0..session.filters_n() {
                if session.info_of(slot).supported == Support::No {
                    continue;
                }
                let name = session.crtcs[session.slots[slot].crtc].clone();
                let from_brightness = brightness.as_ref().and_then(|t| t.lookup(&name));
                let from_contrast = contrast.as_ref().and_then(|t| t.lookup(&name));
                if from_brightness.is_none() && from_contrast.is_none() {
                    continue;
                }
                let (rb, gb, bb) = from_brightness.unwrap_or((0.0, 0.0, 0.0));
                let (rc, gc, bc) = from_contrast.unwrap_or((1.0, 1.0, 1.0));
                if let Some(ramps) = session.ramps_mut(slot) {
                    fill(ramps, (rb, rc), (gb, gc), (bb, bc));
                }
                session.update_filter(slot)?;
            }
            session.synchronise_pending()?;
        }

        if self.dflag {
            session.run_keep_alive()?;
        }
        Ok(())
    }
}

fn no_home() -> RunError {
    RunError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "no home directory",
    ))
}

fn main() {
    core_base::run(&mut LimitsTool::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ramps::{Depth, RampSizes};

    fn opts_with(positional: &[&str]) -> CommonOpts {
        CommonOpts {
            positional: positional.iter().map(|s| s.to_string()).collect(),
            ..CommonOpts::default()
        }
    }

    #[test]
    fn pairs_assign_channels_in_rgb_order() {
        let mut tool = LimitsTool::new();
        tool.handle_args(&opts_with(&["0.1:0.9", "0.2:0.8", "0.3:0.7"]))
            .unwrap();
        assert_eq!(tool.red, (0.1, 0.9));
        assert_eq!(tool.green, (0.2, 0.8));
        assert_eq!(tool.blue, (0.3, 0.7));
    }

    #[test]
    fn single_pair_spreads() {
        let mut tool = LimitsTool::new();
        tool.handle_args(&opts_with(&["-0.1:1.1"])).unwrap();
        assert_eq!(tool.red, (-0.1, 1.1));
        assert_eq!(tool.green, tool.red);
        assert_eq!(tool.blue, tool.red);
    }

    #[test]
    fn files_conflict_with_positionals() {
        let mut tool = LimitsTool::new();
        tool.brightness_file = Some("b".into());
        assert!(matches!(
            tool.handle_args(&opts_with(&["0:1"])),
            Err(RunError::Usage)
        ));
    }

    #[test]
    fn integer_limits_squeeze_the_range() {
        let mut ramps = Ramps::identity(Depth::U16, RampSizes::uniform(256));
        fill(&mut ramps, (0.25, 0.75), (0.0, 1.0), (0.0, 0.5));
        match ramps {
            Ramps::U16(t) => {
                assert_eq!(t.red[0], (0.25f64 * 65535.0).round() as u16);
                assert_eq!(t.red[255], (0.75f64 * 65535.0).round() as u16);
                assert_eq!(t.green[0], 0);
                assert_eq!(t.green[255], u16::MAX);
                assert_eq!(t.blue[255], (0.5f64 * 65535.0).round() as u16);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn float_limits_clip_out_of_range_results() {
        let mut ramps = Ramps::identity(Depth::F64, RampSizes::uniform(16));
        fill(&mut ramps, (-0.5, 1.5), (0.0, 1.0), (0.0, 1.0));
        match ramps {
            Ramps::F64(t) => {
                assert_eq!(t.red[0], 0.0);
                assert_eq!(t.red[15], 1.0);
            }
            _ => unreachable!(),
        }
    }
}
