//! Multiplicative RGB brightness.

use core_base::{CommonOpts, RunError, Session, Tool, args, lifespan_from_flags};

struct BrillianceTool {
    dflag: bool,
    xflag: bool,
    red: f64,
    green: f64,
    blue: f64,
}

impl BrillianceTool {
    fn new() -> Self {
        BrillianceTool {
            dflag: false,
            xflag: false,
            red: 1.0,
            green: 1.0,
            blue: 1.0,
        }
    }
}

impl Tool for BrillianceTool {
    fn program(&self) -> &'static str {
        "cg-brilliance"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] \
         (-x | [-p priority] [-d] (all | red green blue))"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(1 << 61)
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
        if q > 1 || (self.xflag && (argc > 0 || opts.priority.is_some())) {
            return Err(RunError::Usage);
        }
        match argc {
            1 => {
                self.red = args::parse_double(&opts.positional[0]).ok_or(RunError::Usage)?;
                self.green = self.red;
                self.blue = self.red;
            }
            3 => {
                self.red = args::parse_double(&opts.positional[0]).ok_or(RunError::Usage)?;
                self.green = args::parse_double(&opts.positional[1]).ok_or(RunError::Usage)?;
                self.blue = args::parse_double(&opts.positional[2]).ok_or(RunError::Usage)?;
            }
            0 if self.xflag || opts.query_count() > 0 => {}
            _ => return Err(RunError::Usage),
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(lifespan_from_flags(self.xflag, self.dflag));
        if !self.xflag {
            session.make_slaves();
        }
        let (r, g, b) = (self.red, self.green, self.blue);
        session.install(self.xflag, &mut |_slot, ramps| {
            ramps.rgb_brightness(r, g, b);
            if ramps.depth().is_float() {
                ramps.clip(true, true, true);
            }
            Ok(())
        })?;
        if self.dflag {
            session.run_keep_alive()?;
        }
        Ok(())
    }
}

fn main() {
    core_base::run(&mut BrillianceTool::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ramps::{Depth, RampSizes, Ramps};

    fn opts_with(positional: &[&str]) -> CommonOpts {
        CommonOpts {
            positional: positional.iter().map(|s| s.to_string()).collect(),
            ..CommonOpts::default()
        }
    }

    #[test]
    fn positionals_are_red_green_blue_in_order() {
        let mut tool = BrillianceTool::new();
        tool.handle_args(&opts_with(&["0.5", "0.25", "0.0"])).unwrap();
        assert_eq!((tool.red, tool.green, tool.blue), (0.5, 0.25, 0.0));
    }

    #[test]
    fn plain_invocation_requires_values() {
        let mut tool = BrillianceTool::new();
        assert!(matches!(
            tool.handle_args(&opts_with(&[])),
            Err(RunError::Usage)
        ));
        let mut tool = BrillianceTool::new();
        tool.xflag = true;
        tool.handle_args(&opts_with(&[])).unwrap();
    }

    #[test]
    fn eight_bit_ramps_scale_with_floor_semantics() {
        // Two coalesced U8/(256,256,256) CRTCs share one buffer holding
        // floor(i * b) per channel with b = (0.5, 0.25, 0.0).
        let mut ramps = Ramps::identity(Depth::U8, RampSizes::uniform(256));
        ramps.rgb_brightness(0.5, 0.25, 0.0);
        match ramps {
            Ramps::U8(t) => {
                for i in 0..256usize {
                    assert_eq!(t.red[i], (i as f64 * 0.5) as u8, "red stop {i}");
                    assert_eq!(t.green[i], (i as f64 * 0.25) as u8, "green stop {i}");
                    assert_eq!(t.blue[i], 0, "blue stop {i}");
                }
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn float_ramps_clip_only_when_asked() {
        let mut ramps = Ramps::identity(Depth::F64, RampSizes::uniform(16));
        ramps.rgb_brightness(1.5, 1.0, 1.0);
        ramps.clip(true, true, true);
        match ramps {
            Ramps::F64(t) => {
                assert_eq!(t.red[15], 1.0);
                assert!(t.red[8] <= 1.0);
            }
            _ => unreachable!(),
        }
    }
}
