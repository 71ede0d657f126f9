//! Install a linearisation filter and its inverse, so filters stacked at
//! priorities between the two operate on linear light.

use core_base::{CommonOpts, RunError, Session, Tool, args, lifespan_from_flags};

#[derive(Default)]
struct LinearTool {
    dflag: bool,
    xflag: bool,
    skip_red: bool,
    skip_green: bool,
    skip_blue: bool,
    start_priority: i64,
    stop_priority: i64,
}

impl Tool for LinearTool {
    fn program(&self) -> &'static str {
        "cg-linear"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule-base] \
         (-x | -p start-priority:stop-priority [-d] [+rgb])"
    }

    /// No sensible default exists: the whole point is the caller picking the
    /// two priorities the sandwich lives between.
    fn default_priority(&self) -> Option<i64> {
        None
    }

    fn class_suffixes(&self) -> &'static [&'static str] {
        &[":start", ":stop"]
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
            "+r" => {
                if self.skip_red {
                    return Err(RunError::Usage);
                }
                self.skip_red = true;
                Ok(false)
            }
            "+g" => {
                if self.skip_green {
                    return Err(RunError::Usage);
                }
                self.skip_green = true;
                Ok(false)
            }
            "+b" => {
                if self.skip_blue {
                    return Err(RunError::Usage);
                }
                self.skip_blue = true;
                Ok(false)
            }
            _ => Err(RunError::Usage),
        }
    }

    fn handle_args(&mut self, opts: &CommonOpts) -> Result<(), RunError> {
        let skips = self.skip_red || self.skip_green || self.skip_blue;
        let q = self.xflag as usize + (self.dflag || skips) as usize + opts.query_count();
        if q > 1 || !opts.positional.is_empty() || (self.xflag && opts.priority.is_some()) {
            return Err(RunError::Usage);
        }
        match opts.priority.as_deref() {
            Some("?") => {}
            Some(pair) => {
                let (start, stop) = pair.split_once(':').ok_or(RunError::Usage)?;
                self.start_priority = args::parse_priority(start).ok_or(RunError::Usage)?;
                self.stop_priority = args::parse_priority(stop).ok_or(RunError::Usage)?;
            }
            None if !self.xflag && opts.query_count() == 0 => return Err(RunError::Usage),
            None => {}
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(lifespan_from_flags(self.xflag, self.dflag));

        // The start and stop filters of one CRTC must not share ramps, so
        // this tool never coalesces.
        for slot in &mut session.slots {
            slot.priority = if slot.suffix == 0 {
                self.start_priority
            } else {
                self.stop_priority
            };
        }
        let (r, g, b) = (!self.skip_red, !self.skip_green, !self.skip_blue);
        session.install(self.xflag, &mut |slot, ramps| {
            if slot.suffix == 0 {
                ramps.linearise(r, g, b);
            } else {
                ramps.standardise(r, g, b);
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
    core_base::run(&mut LinearTool::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_pair_is_required_without_remove() {
        let mut tool = LinearTool::default();
        assert!(matches!(
            tool.handle_args(&CommonOpts::default()),
            Err(RunError::Usage)
        ));

        let mut tool = LinearTool::default();
        tool.xflag = true;
        tool.handle_args(&CommonOpts::default()).unwrap();
    }

    #[test]
    fn priority_pair_parses_both_halves() {
        let mut tool = LinearTool::default();
        let opts = CommonOpts {
            priority: Some("100:-200".into()),
            ..CommonOpts::default()
        };
        tool.handle_args(&opts).unwrap();
        assert_eq!(tool.start_priority, 100);
        assert_eq!(tool.stop_priority, -200);
    }

    #[test]
    fn malformed_pairs_are_usage_errors() {
        for bad in ["100", ":", "100:", ":200", "a:b"] {
            let mut tool = LinearTool::default();
            let opts = CommonOpts {
                priority: Some(bad.into()),
                ..CommonOpts::default()
            };
            assert!(
                matches!(tool.handle_args(&opts), Err(RunError::Usage)),
                "{bad} should be rejected"
            );
        }
    }
}
