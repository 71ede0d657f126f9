//! Invert the colours, channel by channel.

use core_base::{CommonOpts, RunError, Session, Tool, lifespan_from_flags};

#[derive(Default)]
struct NegativeTool {
    dflag: bool,
    xflag: bool,
    skip_red: bool,
    skip_green: bool,
    skip_blue: bool,
}

impl Tool for NegativeTool {
    fn program(&self) -> &'static str {
        "cg-negative"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] (-x | [-p priority] [-d] [+rgb])"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(1 << 62)
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
        let q =
            self.xflag as usize + (self.dflag || skips) as usize + opts.query_count();
        if q > 1
            || !opts.positional.is_empty()
            || (self.xflag && opts.priority.is_some())
        {
            return Err(RunError::Usage);
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(lifespan_from_flags(self.xflag, self.dflag));
        if !self.xflag {
            session.make_slaves();
        }
        let (r, g, b) = (!self.skip_red, !self.skip_green, !self.skip_blue);
        session.install(self.xflag, &mut |_slot, ramps| {
            ramps.negative(r, g, b);
            Ok(())
        })?;
        if self.dflag {
            session.run_keep_alive()?;
        }
        Ok(())
    }
}

fn main() {
    core_base::run(&mut NegativeTool::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_skips_are_single_use() {
        let mut tool = NegativeTool::default();
        assert!(!tool.handle_opt("+r", None).unwrap());
        assert!(matches!(tool.handle_opt("+r", None), Err(RunError::Usage)));
    }

    #[test]
    fn positionals_are_rejected() {
        let mut tool = NegativeTool::default();
        let opts = CommonOpts {
            positional: vec!["0.5".into()],
            ..CommonOpts::default()
        };
        assert!(matches!(tool.handle_args(&opts), Err(RunError::Usage)));
    }

    #[test]
    fn remove_conflicts_with_skips() {
        let mut tool = NegativeTool::default();
        tool.xflag = true;
        tool.skip_green = true;
        assert!(matches!(
            tool.handle_args(&CommonOpts::default()),
            Err(RunError::Usage)
        ));
    }
}
