//! The common front-end every tool runs through.
//!
//! Option walking is deliberately hand-rolled: options are two-character
//! tokens beginning with `-` or `+` (channel skips use the `+` form), `-c`
//! repeats, and `?` values turn options into listing requests. That grammar
//! is owned here; everything a tool recognises beyond `-M/-S/-c/-p/-R`
//! flows through its [`Tool::handle_opt`].

use crate::session::Session;
use crate::{args, filter_class, proc};
use core_client::{ClientError, Connection, DaemonError, METHODS};
use std::io;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A command-line mistake; the tool's usage banner is printed.
    #[error("invalid usage")]
    Usage,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Daemon(DaemonError),
    #[error("server entered an unrecoverable state")]
    Unrecoverable,
    #[error("server failed to initialise")]
    InitFailed,
    /// The failure was already described on stderr.
    #[error("error already reported")]
    Reported,
}

impl From<ClientError> for RunError {
    fn from(err: ClientError) -> RunError {
        match err {
            ClientError::Io(err) => RunError::Io(err),
            ClientError::Daemon(err) => RunError::Daemon(err),
            ClientError::Unrecoverable => RunError::Unrecoverable,
        }
    }
}

/// The options shared by every tool, plus whatever was left over for the
/// tool itself.
#[derive(Debug, Default, Clone)]
pub struct CommonOpts {
    pub method: Option<String>,
    pub site: Option<String>,
    pub crtcs: Vec<String>,
    /// Raw `-p` argument; parsed here for tools with a default priority and
    /// by the tool itself otherwise.
    pub priority: Option<String>,
    pub rule: Option<String>,
    pub positional: Vec<String>,
}

impl CommonOpts {
    pub fn method_query(&self) -> bool {
        self.method.as_deref() == Some("?")
    }

    pub fn priority_query(&self) -> bool {
        self.priority.as_deref() == Some("?")
    }

    pub fn rule_query(&self) -> bool {
        matches!(self.rule.as_deref(), Some("?") | Some("??"))
    }

    pub fn crtc_queries(&self) -> usize {
        self.crtcs.iter().filter(|crtc| crtc.as_str() == "?").count()
    }

    /// Number of listing requests. A listing is mutually exclusive with any
    /// mutation flag and with other listings; tools fold this count into
    /// their exclusivity check.
    pub fn query_count(&self) -> usize {
        self.method_query() as usize
            + self.priority_query() as usize
            + self.rule_query() as usize
            + self.crtc_queries()
    }
}

/// One gamma tool. The driver owns the shared option set and the session
/// lifecycle; the tool contributes its grammar and its ramp mathematics.
pub trait Tool {
    fn program(&self) -> &'static str;

    /// Usage line after the program name.
    fn usage(&self) -> &'static str;

    /// Default filter priority; `None` when the tool requires `-p` and
    /// parses it itself.
    fn default_priority(&self) -> Option<i64>;

    /// Class suffixes; one filter per CRTC and suffix. The empty suffix
    /// yields the plain class.
    fn class_suffixes(&self) -> &'static [&'static str] {
        &[""]
    }

    /// Handle one tool-specific option token. `arg` is the following
    /// command-line token, if any; return `true` when it was consumed as
    /// this option's argument.
    fn handle_opt(&mut self, opt: &str, arg: Option<&str>) -> Result<bool, RunError>;

    /// Validate and absorb everything after option walking.
    fn handle_args(&mut self, opts: &CommonOpts) -> Result<(), RunError>;

    /// Fill ramps and drive the install through the session.
    fn start(&mut self, session: &mut Session) -> Result<(), RunError>;
}

fn set_unique(slot: &mut Option<String>, value: Option<&str>) -> Result<(), RunError> {
    if slot.is_some() {
        return Err(RunError::Usage);
    }
    *slot = Some(value.ok_or(RunError::Usage)?.to_owned());
    Ok(())
}

/// Walk the command line. Two-character `-`/`+` tokens are options,
/// everything else is positional.
fn parse_argv(tool: &mut dyn Tool, argv: &[String]) -> Result<CommonOpts, RunError> {
    let mut opts = CommonOpts::default();
    let mut i = 0;
    while i < argv.len() {
        let arg = &argv[i];
        let first = arg.as_bytes().first();
        let is_option = matches!(first, Some(b'-') | Some(b'+')) && arg.len() == 2;
        if !is_option {
            opts.positional.push(arg.clone());
            i += 1;
            continue;
        }
        let next = argv.get(i + 1).map(String::as_str);
        match arg.as_str() {
            "-M" => {
                set_unique(&mut opts.method, next)?;
                i += 2;
            }
            "-S" => {
                set_unique(&mut opts.site, next)?;
                i += 2;
            }
            "-c" => {
                opts.crtcs.push(next.ok_or(RunError::Usage)?.to_owned());
                i += 2;
            }
            "-p" => {
                set_unique(&mut opts.priority, next)?;
                i += 2;
            }
            "-R" => {
                set_unique(&mut opts.rule, next)?;
                i += 2;
            }
            _ => {
                let consumed = tool.handle_opt(arg, next)?;
                i += if consumed { 2 } else { 1 };
            }
        }
    }
    Ok(opts)
}

/// Run a tool to completion and exit: `0` on success, `1` on any failure,
/// with the failure described on stderr.
pub fn run(tool: &mut dyn Tool) -> ! {
    crate::init_logging();
    let program = tool.program();
    let code = match run_inner(tool) {
        Ok(()) => 0,
        Err(RunError::Usage) => {
            eprintln!("Usage: {program} {}", tool.usage());
            1
        }
        Err(RunError::Reported) => 1,
        Err(err) => {
            eprintln!("{program}: {err}");
            1
        }
    };
    std::process::exit(code);
}

fn run_inner(tool: &mut dyn Tool) -> Result<(), RunError> {
    proc::initialise()?;
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let opts = parse_argv(tool, &argv)?;
    tool.handle_args(&opts)?;

    if opts.method_query() {
        for method in METHODS {
            println!("{method}");
        }
        return Ok(());
    }
    if opts.priority_query() {
        let priority = tool.default_priority().ok_or(RunError::Usage)?;
        println!("{priority}");
        return Ok(());
    }
    let rule = match opts.rule.as_deref() {
        Some("?") => {
            println!("standard");
            return Ok(());
        }
        Some("??") => {
            println!("{}", filter_class(tool.program(), "standard"));
            return Ok(());
        }
        Some(rule) if rule.contains(':') => return Err(RunError::Usage),
        Some(rule) => rule,
        None => "standard",
    };

    let priority = match (opts.priority.as_deref(), tool.default_priority()) {
        (Some(arg), Some(_)) => args::parse_priority(arg).ok_or(RunError::Usage)?,
        (None, Some(default)) => default,
        // No default: the tool validated and parsed `-p` in handle_args and
        // assigns priorities itself in start.
        (_, None) => 0,
    };

    let mut conn = Connection::connect(opts.method.as_deref(), opts.site.as_deref()).map_err(
        |err| match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => RunError::InitFailed,
            _ => RunError::Io(err),
        },
    )?;

    if opts.crtc_queries() > 0 {
        for crtc in conn.get_crtcs_sync()? {
            println!("{crtc}");
        }
        return Ok(());
    }

    let crtcs = if opts.crtcs.is_empty() {
        conn.get_crtcs_sync()?
    } else {
        opts.crtcs.clone()
    };
    let mut infos = Vec::with_capacity(crtcs.len());
    for crtc in &crtcs {
        infos.push(conn.get_gamma_info_sync(crtc)?);
    }
    info!(
        target: "base.run",
        program = tool.program(),
        crtcs = crtcs.len(),
        "session_start"
    );

    conn.set_nonblocking(true)?;
    let class_base = filter_class(tool.program(), rule);
    let mut session = Session::new(
        conn,
        crtcs,
        infos,
        &class_base,
        tool.class_suffixes(),
        priority,
    );
    tool.start(&mut session)
}
