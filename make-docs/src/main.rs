//! Regenerate `src/scripts.rs` from each check's own `--help`
//!
//! The checks are run out of `target/debug`, so build them first:
//!
//! ```plain
//! cargo build && cargo run -p make-docs
//! cargo build && cargo run -p make-docs -- --check
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{self, Command};
use std::string::FromUtf8Error;

use derive_more::From;
use structopt::StructOpt;

/// Regenerate the scripts documentation module
#[derive(StructOpt, Debug)]
#[structopt(name = "make-docs")]
struct Args {
    #[structopt(
        long = "check",
        help = "Don't write anything, exit 1 if the docs are out of date"
    )]
    check: bool,
    #[structopt(
        long = "bin-dir",
        default_value = "target/debug",
        parse(from_os_str),
        help = "Where the built checks are"
    )]
    bin_dir: PathBuf,
    #[structopt(
        long = "out",
        default_value = "src/scripts.rs",
        parse(from_os_str),
        help = "The module to regenerate"
    )]
    out: PathBuf,
}

struct Check {
    name: &'static str,
    platform: &'static str,
}

const CHECKS: &[Check] = &[
    Check {
        name: "check-diskio",
        platform: "Linux-only. Reads /sys/block and keeps one state file per device.",
    },
    Check {
        name: "check-qemu",
        platform: "Linux-only. Reads running processes.",
    },
];

#[derive(Debug, From)]
enum DocsError {
    Io(io::Error),
    NotUtf8(FromUtf8Error),
    /// A check could not print its help
    HelpFailed { check: &'static str, status: String },
    Stale(PathBuf),
}

impl fmt::Display for DocsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::DocsError::*;
        match *self {
            Io(ref e) => write!(f, "{}", e),
            NotUtf8(ref e) => write!(f, "help output is not utf8: {}", e),
            HelpFailed { check, ref status } => {
                write!(f, "{} --help exited with {}, is it built?", check, status)
            }
            Stale(ref path) => write!(
                f,
                "{} is out of date, run `cargo run -p make-docs`",
                path.display()
            ),
        }
    }
}

fn help_text(bin_dir: &Path, check: &'static str) -> Result<String, DocsError> {
    let output = Command::new(bin_dir.join(check)).arg("--help").output()?;
    if !output.status.success() {
        return Err(DocsError::HelpFailed {
            check,
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8(output.stdout)?)
}

/// The whole module, one `//!` line per line of documentation
fn render(helps: &[(&Check, String)]) -> String {
    let mut lines = vec![
        "Documentation about the various scripts contained herein".to_owned(),
        String::new(),
    ];
    lines.extend(
        helps
            .iter()
            .map(|&(check, _)| format!("- [{0}](#{0})", check.name)),
    );
    for &(check, ref help) in helps {
        lines.push(String::new());
        lines.push(format!("# {}", check.name));
        lines.push(String::new());
        lines.push(check.platform.to_owned());
        lines.push(String::new());
        lines.push("```plain".to_owned());
        lines.push(format!("$ {} --help", check.name));
        lines.extend(help.trim_end().lines().map(str::to_owned));
        lines.push("```".to_owned());
    }
    lines
        .iter()
        .map(|line| format!("//! {}", line).trim_end().to_owned() + "\n")
        .collect()
}

fn run(args: &Args) -> Result<(), DocsError> {
    let helps = CHECKS
        .iter()
        .map(|check| -> Result<_, DocsError> {
            Ok((check, help_text(&args.bin_dir, check.name)?))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let docs = render(&helps);
    if args.check {
        if fs::read_to_string(&args.out)? != docs {
            return Err(DocsError::Stale(args.out.clone()));
        }
    } else {
        fs::write(&args.out, docs)?;
    }
    Ok(())
}

fn main() {
    let args = Args::from_args();
    if let Err(e) = run(&args) {
        eprintln!("make-docs: {}", e);
        process::exit(match e {
            DocsError::Stale(_) => 1,
            _ => 2,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_a_section_per_check() {
        let helps = vec![
            (&CHECKS[0], "check-diskio 0.1.0\n\nUSAGE:\n    check-diskio\n\n".to_owned()),
            (&CHECKS[1], "check-qemu 0.1.0\n".to_owned()),
        ];
        let docs = render(&helps);
        assert!(docs.starts_with(
            "//! Documentation about the various scripts contained herein\n\
             //!\n\
             //! - [check-diskio](#check-diskio)\n\
             //! - [check-qemu](#check-qemu)\n\
             //!\n\
             //! # check-diskio\n"
        ));
        assert!(docs.contains(
            "//! $ check-diskio --help\n\
             //! check-diskio 0.1.0\n\
             //!\n\
             //! USAGE:\n\
             //!     check-diskio\n\
             //! ```\n"
        ));
        assert!(docs.ends_with("//! check-qemu 0.1.0\n//! ```\n"));
        assert!(docs.lines().all(|l| l.starts_with("//!") && !l.ends_with(' ')));
    }

    #[test]
    fn missing_binary_is_an_error() {
        match help_text(Path::new("/definitely/not/built"), "check-diskio") {
            Err(DocsError::Io(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
