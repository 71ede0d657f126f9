//! Apply an ICC profile, either one file for every selected CRTC or
//! per-monitor profiles looked up by EDID in the `icctab` table.

use core_base::{CommonOpts, RunError, Session, Tool, lifespan_from_flags};
use core_client::Support;
use core_icc::IccError;
use core_ramps::{RampSizes, Ramps};
use std::path::{Path, PathBuf};
use tracing::debug;

/// EDIDs are 256 hexadecimals; anything else is suspicious but tolerated.
const EDID_LENGTH: usize = 256;

#[derive(Default)]
struct IccTool {
    dflag: bool,
    xflag: bool,
    profile: Option<String>,
    table: Vec<(String, PathBuf)>,
}

/// Parse the `icctab` table: `EDID <ws> profile-path` per line, `#` for
/// comments. Relative paths resolve against the table's own directory.
fn load_icc_table(program: &str, path: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let dir = path.parent().unwrap_or(Path::new("/"));
    let content = std::fs::read_to_string(path)?;
    let mut table = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let lineno = lineno + 1;
        let stripped = line.trim_start_matches([' ', '\t']);
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        let edid_len = stripped
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(stripped.len());
        let rest = &stripped[edid_len..];
        if edid_len == 0 || !rest.starts_with([' ', '\t']) {
            eprintln!(
                "{program}: warning: line {lineno} is malformated in {}",
                path.display()
            );
            continue;
        }
        let edid = &stripped[..edid_len];
        if edid.len() != EDID_LENGTH {
            eprintln!(
                "{program}: warning: EDID on line {lineno} in {} looks to be of wrong length: {edid}",
                path.display()
            );
        }
        let filename = rest.trim_start_matches([' ', '\t']);
        if filename.is_empty() {
            eprintln!(
                "{program}: warning: line {lineno} is malformated in {}",
                path.display()
            );
            continue;
        }
        if filename.ends_with([' ', '\t']) {
            eprintln!(
                "{program}: warning: filename on line {lineno} in {} ends with white space: {filename}",
                path.display()
            );
        }
        let profile = if filename.starts_with('/') {
            PathBuf::from(filename)
        } else {
            dir.join(filename)
        };
        table.push((edid.to_owned(), profile));
    }
    Ok(table)
}

fn load_profile(program: &str, path: &Path, sizes: RampSizes) -> Result<Ramps, RunError> {
    match core_icc::load(path, sizes) {
        Ok(ramps) => {
            debug!(target: "icc", path = %path.display(), depth = ?ramps.depth(), "profile_loaded");
            Ok(ramps)
        }
        Err(IccError::NoUsableData) => {
            eprintln!("{program}: unusable ICC profile: {}", path.display());
            Err(RunError::Reported)
        }
        Err(IccError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            eprintln!(
                "{program}: No such file or directory: {}",
                path.display()
            );
            Err(RunError::Reported)
        }
        Err(IccError::Io(err)) => Err(err.into()),
    }
}

impl IccTool {
    fn profile_for(&self, crtc: &str) -> Option<&Path> {
        self.table
            .iter()
            .find(|(edid, _)| edid.eq_ignore_ascii_case(crtc))
            .map(|(_, path)| path.as_path())
    }
}

impl Tool for IccTool {
    fn program(&self) -> &'static str {
        "cg-icc"
    }

    fn usage(&self) -> &'static str {
        "[-M method] [-S site] [-c crtc]... [-R rule] (-x | [-p priority] [-d] [file])"
    }

    fn default_priority(&self) -> Option<i64> {
        Some(0)
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
        self.profile = opts.positional.first().cloned();

        if self.profile.is_none() && !self.xflag && opts.query_count() == 0 {
            let dir = dirs::home_dir()
                .map(|home| home.join(".config"))
                .filter(|dir| dir.exists())
                .unwrap_or_else(|| PathBuf::from("/etc"));
            self.table = load_icc_table(self.program(), &dir.join("icctab"))?;
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session) -> Result<(), RunError> {
        session.set_lifespans(lifespan_from_flags(self.xflag, self.dflag));
        let program = self.program();

        if self.xflag {
            session.install(true, &mut |_slot, _ramps| Ok(()))?;
        } else if let Some(file) = self.profile.clone() {
            // One profile for everyone: size the prototype to the largest
            // selected geometry and coalesce the identical ones.
            session.make_slaves();
            let mut proto_sizes = RampSizes::uniform(1);
            for info in &session.infos {
                proto_sizes = proto_sizes.max(info.sizes());
            }
            let source = load_profile(program, Path::new(&file), proto_sizes)?;
            session.install(false, &mut |_slot, ramps| {
                ramps.translate_from(&source);
                Ok(())
            })?;
        } else {
            // Per-monitor profiles; outputs without a table entry keep
            // their current state.
            for slot in 0..session.filters_n() {
                if session.info_of(slot).supported == Support::No {
                    continue;
                }
                let name = session.crtcs[session.slots[slot].crtc].clone();
                let Some(path) = self.profile_for(&name).map(Path::to_path_buf) else {
                    continue;
                };
                let sizes = session.info_of(slot).sizes();
                let source = load_profile(program, &path, sizes)?;
                if let Some(ramps) = session.ramps_mut(slot) {
                    ramps.translate_from(&source);
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

fn main() {
    core_base::run(&mut IccTool::default())
}
