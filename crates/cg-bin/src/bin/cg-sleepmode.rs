//! Fade the monitors down for sleep, and back up on termination.
//!
//! Each channel fades from full to its target luminosity over its own
//! duration, linearly against the monotonic clock. The process then holds
//! the filter (lifespan until-death) until `SIGINT`, `SIGTERM` or `SIGHUP`
//! raises the cooperative flag, at which point the channels fade back to
//! full over the same per-channel durations and the process exits.

use core_base::proc;
use core_base::{CommonOpts, KeepAliveEnd, RunError, Session, Tool, args};
use core_client::{ClientError, Lifespan};
use core_ramps::Ramps;
use tracing::info;

struct SleepmodeTool {
    red_time: f64,
    green_time: f64,
    blue_time: f64,
    red_target: f64,
    green_target: f64,
    blue_target: f64,
    rflag: Option<String>,
    gflag: Option<String>,
    bflag: Option<String>,
}

impl SleepmodeTool {
    fn new() -> Self {
        SleepmodeTool {
            red_time: 3.0,
            green_time: 2.0,
            blue_time: 1.0,
            red_target: 0.5,
            green_target: 0.0,
            blue_target: 0.0,
            rflag: None,
            gflag: None,
            bflag: None,
        }
    }
}

/// Luminosity while fading out: linear from 1 at `t = 0` to the target at
/// `t = duration`, held clamped after. A zero duration holds the target
/// from the start.
fn fade_out_level(target: f64, duration: f64, t: f64) -> f64 {
    let rate = (target - 1.0) / duration;
    if rate.is_finite() {
        (1.0 + t * rate).clamp(0.0, 1.0)
    } else {
        target.clamp(0.0, 1.0)
    }
}

/// Luminosity while fading back in: linear from the target at `t = 0` to 1
/// at `t = duration`, symmetric to the fade-out.
fn fade_in_level(target: f64, duration: f64, t: f64) -> f64 {
    let ratio = t / duration;
    if ratio.is_finite() {
        (target * (1.0 - ratio) + ratio).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

fn fill(ramps: &mut Ramps, red: f64, green: f64, blue: f64) {
    ramps.start_over(true, true, true);
    ramps.rgb_brightness(red, green, blue);
}

impl Tool for SleepmodeTool {
    fn program(&self) -> &'static str {
        "cg-sleepmode"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] [-p priority] \
         [-r red-fadeout-time] [-g green-fadeout-time] [-b blue-fadeout-time] \
         [red-luminosity [green-luminosity [blue-luminosity]]]"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(3 << 59)
    }

    fn handle_opt(&mut self, opt: &str, arg: Option<&str>) -> Result<bool, RunError> {
        let slot = match opt {
            "-r" => &mut self.rflag,
            "-g" => &mut self.gflag,
            "-b" => &mut self.bflag,
            _ => return Err(RunError::Usage),
        };
        if slot.is_some() {
            return Err(RunError::Usage);
        }
        *slot = Some(arg.ok_or(RunError::Usage)?.to_owned());
        Ok(true)
    }

    fn handle_args(&mut self, opts: &CommonOpts) -> Result<(), RunError> {
        let argc = opts.positional.len();
        let fading =
            self.rflag.is_some() || self.gflag.is_some() || self.bflag.is_some() || argc > 0;
        if opts.query_count() + fading as usize > 1 || argc > 3 {
            return Err(RunError::Usage);
        }
        if let Some(arg) = &self.rflag {
            self.red_time = args::parse_double(arg).ok_or(RunError::Usage)?;
        }
        if let Some(arg) = &self.gflag {
            self.green_time = args::parse_double(arg).ok_or(RunError::Usage)?;
        }
        if let Some(arg) = &self.bflag {
            self.blue_time = args::parse_double(arg).ok_or(RunError::Usage)?;
        }
        if argc >= 1 {
            self.red_target = args::parse_double(&opts.positional[0]).ok_or(RunError::Usage)?;
        }
        if argc >= 2 {
            self.green_target = args::parse_double(&opts.positional[1]).ok_or(RunError::Usage)?;
        }
        if argc >= 3 {
            self.blue_target = args::parse_double(&opts.positional[2]).ok_or(RunError::Usage)?;
        }
        // A channel already at (or above) full brightness has nothing to
        // fade through.
        if self.red_target >= 1.0 {
            self.red_time = 0.0;
        }
        if self.green_target >= 1.0 {
            self.green_time = 0.0;
        }
        if self.blue_target >= 1.0 {
            self.blue_time = 0.0;
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(Lifespan::UntilDeath);
        session.make_slaves();
        info!(
            target: "sleepmode",
            red = self.red_time,
            green = self.green_time,
            blue = self.blue_time,
            "fade_out"
        );

        let (rt, gt, bt) = (self.red_target, self.green_target, self.blue_target);
        let (rd, gd, bd) = (self.red_time, self.green_time, self.blue_time);

        let begin = proc::monotonic_seconds()?;
        loop {
            let t = proc::monotonic_seconds()? - begin;
            let red = fade_out_level(rt, rd, t);
            let green = fade_out_level(gt, gd, t);
            let blue = fade_out_level(bt, bd, t);
            session.install(false, &mut |_slot, ramps| {
                fill(ramps, red, green, blue);
                Ok(())
            })?;
            proc::yield_now();
            if t >= rd && t >= gd && t >= bd {
                break;
            }
        }

        // From here on, termination means "fade back in", not "die".
        let flag = proc::install_terminate_flag()?;
        match session.keep_alive(Some(flag)) {
            Ok(KeepAliveEnd::Interrupted) => {}
            Err(ClientError::Unrecoverable) => {
                proc::pause_once();
                return Err(RunError::Unrecoverable);
            }
            Err(err) => return Err(err.into()),
        }

        info!(target: "sleepmode", "fade_in");
        session.conn.set_nonblocking(true)?;
        let begin = proc::monotonic_seconds()?;
        loop {
            let t = proc::monotonic_seconds()? - begin;
            let red = fade_in_level(rt, rd, t);
            let green = fade_in_level(gt, gd, t);
            let blue = fade_in_level(bt, bd, t);
            session.install(false, &mut |_slot, ramps| {
                fill(ramps, red, green, blue);
                Ok(())
            })?;
            proc::yield_now();
            if t >= rd && t >= gd && t >= bd {
                break;
            }
        }
        Ok(())
    }
}

fn main() {
    core_base::run(&mut SleepmodeTool::new())
}
