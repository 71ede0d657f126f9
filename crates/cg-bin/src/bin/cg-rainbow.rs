//! Rotate the palette through the three RGB corners.

use core_base::proc;
use core_base::{CommonOpts, RunError, Session, Tool, args};
use core_client::Lifespan;

struct RainbowTool {
    sflag: Option<String>,
    lflag: Option<String>,
    /// Rotation frequency multiplied by three: corners per second.
    corners_per_second: f64,
    luminosity: f64,
}

impl RainbowTool {
    fn new() -> Self {
        RainbowTool {
            sflag: None,
            lflag: None,
            corners_per_second: 1.0,
            luminosity: 1.0 / 3.0,
        }
    }
}

/// Palette at phase `t * 3 * freq`: the current corner gets the falling
/// remainder of full intensity, the next corner the rising one, everything
/// on a baseline and capped at full.
fn palette(phase: f64, luminosity: f64) -> [f64; 3] {
    let mut pal = [luminosity; 3];
    let corner = (phase as i64).rem_euclid(3) as usize;
    let fraction = phase.fract();
    pal[corner] += 1.0 - fraction;
    pal[(corner + 1) % 3] += fraction;
    for value in &mut pal {
        if *value > 1.0 {
            *value = 1.0;
        }
    }
    pal
}

impl Tool for RainbowTool {
    fn program(&self) -> &'static str {
        "cg-rainbow"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] [-p priority] \
         [-l luminosity] [-s rainbowhz]"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(1 << 60)
    }

    fn handle_opt(&mut self, opt: &str, arg: Option<&str>) -> Result<bool, RunError> {
        let slot = match opt {
            "-s" => &mut self.sflag,
            "-l" => &mut self.lflag,
            _ => return Err(RunError::Usage),
        };
        if slot.is_some() {
            return Err(RunError::Usage);
        }
        *slot = Some(arg.ok_or(RunError::Usage)?.to_owned());
        Ok(true)
    }

    fn handle_args(&mut self, opts: &CommonOpts) -> Result<(), RunError> {
        let animating = self.sflag.is_some() || self.lflag.is_some();
        if opts.query_count() + animating as usize > 1 || !opts.positional.is_empty() {
            return Err(RunError::Usage);
        }
        if let Some(arg) = &self.sflag {
            self.corners_per_second = args::parse_double(arg).ok_or(RunError::Usage)? * 3.0;
        }
        if let Some(arg) = &self.lflag {
            self.luminosity = args::parse_double(arg).ok_or(RunError::Usage)?;
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(Lifespan::UntilDeath);
        session.make_slaves();

        let speed = self.corners_per_second;
        let luminosity = self.luminosity;
        let begin = proc::monotonic_seconds()?;
        loop {
            let t = proc::monotonic_seconds()? - begin;
            let [red, green, blue] = palette(t * speed, luminosity);
            session.install(false, &mut |_slot, ramps| {
                ramps.start_over(true, true, true);
                ramps.rgb_brightness(red, green, blue);
                Ok(())
            })?;
            proc::yield_now();
        }
    }
}

fn main() {
    core_base::run(&mut RainbowTool::new())
}
