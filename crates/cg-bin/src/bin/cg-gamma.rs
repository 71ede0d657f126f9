//! Apply per-channel gamma curves, from the command line or from the
//! `gamma` configuration table.

use core_base::config::{self, TripleTable};
use core_base::{CommonOpts, RunError, Session, Tool, args, lifespan_from_flags};
use core_client::Support;

#[derive(Default)]
struct GammaTool {
    dflag: bool,
    xflag: bool,
    file: Option<String>,
    red: f64,
    green: f64,
    blue: f64,
    table: Option<TripleTable>,
}

impl GammaTool {
    fn new() -> Self {
        GammaTool {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
            ..GammaTool::default()
        }
    }
}

impl Tool for GammaTool {
    fn program(&self) -> &'static str {
        "cg-gamma"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] \
         (-d | [-p priority] [-x] [-f file | all | red green blue])"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(0)
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
            "-f" => {
                if self.file.is_some() {
                    return Err(RunError::Usage);
                }
                self.file = Some(arg.ok_or(RunError::Usage)?.to_owned());
                Ok(true)
            }
            _ => Err(RunError::Usage),
        }
    }

    fn handle_args(&mut self, opts: &CommonOpts) -> Result<(), RunError> {
        let argc = opts.positional.len();
        let q = self.xflag as usize
            + self.dflag as usize
            + (self.file.is_some() && argc > 0) as usize
            + opts.query_count();
        if q > 1 || (self.xflag && (self.file.is_some() || argc > 0 || opts.priority.is_some())) {
            return Err(RunError::Usage);
        }

        match argc {
            0 => {}
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
            _ => return Err(RunError::Usage),
        }

        let path = match (&self.file, argc, self.xflag, opts.query_count()) {
            (Some(file), _, _, _) => Some(std::path::PathBuf::from(file)),
            (None, 0, false, 0) => Some(config::conf_path("gamma").ok_or_else(|| {
                RunError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no home directory",
                ))
            })?),
            _ => None,
        };
        if let Some(path) = path {
            self.table = Some(config::load_triple_table(self.program(), &path, false)?);
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(lifespan_from_flags(self.xflag, self.dflag));

        match self.table.take() {
            None => {
                if !self.xflag {
                    session.make_slaves();
                }
                let (r, g, b) = (self.red, self.green, self.blue);
                session.install(self.xflag, &mut |_slot, ramps| {
                    ramps.gamma(r, g, b);
                    Ok(())
                })?;
            }
            Some(table) => {
                // Per-output values: every slot keeps its own ramps and only
                // listed outputs receive a filter.
                for slot in 0..session.filters_n() {
                    if session.info_of(slot).supported == Support::No {
                        continue;
                    }
                    let name = session.crtcs[session.slots[slot].crtc].clone();
                    let Some((r, g, b)) = table.lookup(&name) else {
                        continue;
                    };
                    if let Some(ramps) = session.ramps_mut(slot) {
                        ramps.gamma(r, g, b);
                    }
                    session.update_filter(slot)?;
                }
                session.synchronise_pending()?;
            }
        }

        if self.dflag {
            session.run_keep_alive()?;
        }
        Ok(())
    }
}

fn main() {
    core_base::run(&mut GammaTool::new())
}
