//! Emulate lower colour resolution by quantising the ramps.

use core_base::{CommonOpts, RunError, Session, Tool, args, lifespan_from_flags};

#[derive(Default)]
struct ShallowTool {
    dflag: bool,
    xflag: bool,
    red_levels: usize,
    green_levels: usize,
    blue_levels: usize,
}

impl Tool for ShallowTool {
    fn program(&self) -> &'static str {
        "cg-shallow"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] \
         (-x | [-p priority] [-d] (all | red green blue))"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(-(3 << 61))
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
        let q = self.xflag as usize + (self.dflag || argc > 0) as usize + opts.query_count();
        if q > 1 || (self.xflag && opts.priority.is_some()) {
            return Err(RunError::Usage);
        }
        match argc {
            1 => {
                self.red_levels = args::parse_int(&opts.positional[0]).ok_or(RunError::Usage)?;
                self.green_levels = self.red_levels;
                self.blue_levels = self.red_levels;
            }
            3 => {
                self.red_levels = args::parse_int(&opts.positional[0]).ok_or(RunError::Usage)?;
                self.green_levels = args::parse_int(&opts.positional[1]).ok_or(RunError::Usage)?;
                self.blue_levels = args::parse_int(&opts.positional[2]).ok_or(RunError::Usage)?;
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
        let (r, g, b) = (self.red_levels, self.green_levels, self.blue_levels);
        session.install(self.xflag, &mut |_slot, ramps| {
            ramps.lower_resolution(0, r, 0, g, 0, b);
            Ok(())
        })?;
        if self.dflag {
            session.run_keep_alive()?;
        }
        Ok(())
    }
}

fn main() {
    core_base::run(&mut ShallowTool::default())
}
