//! vmhost-plugins: Nagios/NRPE checks for hosts that run virtual machines
//!
//! Two checks live here, each a small binary built on this library:
//!
//! * `check-diskio` samples the kernel's per-device block counters, keeps the
//!   previous sample in a state file and alerts on IOPS and read/write
//!   bandwidth.
//! * `check-qemu` walks the process table and alerts on how much memory and
//!   how many vCPUs have been handed out to running QEMU guests.
//!
//! Both print exactly one line, `<STATUS>: <summary>|<perfdata>`, and exit
//! with the conventional plugin status code. See the [`scripts`] module for
//! the `--help` output of each check.

use std::fmt;
use std::process;

use log::debug;
use structopt::clap::ErrorKind;
use structopt::StructOpt;

pub mod diskio;
pub mod perfdata;
pub mod procfs;
pub mod qemu;
pub mod scripts;
pub mod sys;
pub mod threshold;

/// The result of a check, ordered from best to worst
///
/// `Unknown` sorts last, but it is never produced by comparing a metric to a
/// threshold, only by failing to get a metric at all.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Critical => 2,
            Status::Unknown => 3,
        }
    }

    #[cfg_attr(test, allow(dead_code))]
    pub fn exit(self) -> ! {
        process::exit(self.exit_code())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match *self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Squash a message onto one line
///
/// Monitoring systems only keep the first line of plugin output, so anything
/// after a newline would silently disappear.
pub fn single_line(msg: &str) -> String {
    msg.split(|c| c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print `UNKNOWN: <msg>` and exit 3
pub fn unknown<D: fmt::Display>(msg: D) -> ! {
    println!("{}: {}", Status::Unknown, single_line(&msg.to_string()));
    Status::Unknown.exit()
}

/// Send log output to stderr, leaving stdout for the status line
///
/// Filtering is controlled by `RUST_LOG`, and only warnings are shown by
/// default.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("warn");
    let _ = env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .try_init();
}

/// Parse command line arguments, exiting UNKNOWN if they are invalid
///
/// Running a check with no arguments at all prints the long help and exits
/// successfully, as does `--help`. Every other parse failure is an UNKNOWN
/// result rather than clap's default exit code, which would read as WARNING.
pub fn args_or_unknown<A: StructOpt>() -> A {
    let argv: Vec<_> = std::env::args_os().collect();
    if argv.len() <= 1 {
        let mut app = A::clap();
        let _ = app.print_long_help();
        println!();
        Status::Ok.exit();
    }
    match A::from_iter_safe(argv) {
        Ok(args) => args,
        Err(e) => match e.kind {
            ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => e.exit(),
            _ => {
                debug!("argument error: {:?}", e);
                unknown(first_error_line(&e.message))
            }
        },
    }
}

/// clap formats errors as `error: <what went wrong>` followed by usage text
fn first_error_line(message: &str) -> String {
    let reason = message
        .lines()
        .take_while(|line| !line.trim_start().starts_with("USAGE:"))
        .collect::<Vec<_>>()
        .join("\n");
    let reason = single_line(&reason);
    let reason = reason.trim_start_matches("error:").trim();
    if reason.is_empty() {
        "invalid arguments".to_owned()
    } else {
        reason.to_owned()
    }
}
