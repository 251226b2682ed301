//! Data structures related to the /proc/<pid>/* files

use std::fmt;
use std::fs;
use std::str::FromStr;

use super::{ParseStatError, ProcFsError, Result};

#[derive(Debug, Clone, Default)]
pub struct Process {
    pub stat: Stat,
    pub cmdline: CmdLine,
}

impl Process {
    pub fn from_pid<P: fmt::Display + Copy>(p: P) -> Result<Process> {
        Ok(Process {
            stat: Stat::from_pid(p)?,
            cmdline: CmdLine::from_pid(p)?,
        })
    }

    pub fn useful_cmdline(&self) -> String {
        if self.cmdline.is_empty() {
            self.stat.comm.clone()
        } else {
            self.cmdline.display()
        }
    }
}

/// The raw bytes of `/proc/<pid>/<name>`
///
/// Nothing in /proc promises UTF-8: argv and the executable name are
/// whatever bytes the process was started with.
fn read_proc_file<P: fmt::Display>(pid: P, name: &str) -> Result<Vec<u8>> {
    Ok(fs::read(format!("/proc/{}/{}", pid, name))?)
}

/// The status of a process
///
/// Only the pid and the executable name are kept from /proc/[pid]/stat,
/// guests are found by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub pid: i32,
    /// The executable name, truncated by the kernel to 15 bytes
    pub comm: String,
}

impl Stat {
    pub fn from_pid<P: fmt::Display>(pid: P) -> Result<Stat> {
        String::from_utf8_lossy(&read_proc_file(pid, "stat")?).parse()
    }
}

impl Default for Stat {
    fn default() -> Stat {
        Stat {
            pid: 0,
            comm: "init".to_owned(),
        }
    }
}

fn field<T>(val: Option<T>, field_name: &'static str, row: &str, position: u8) -> Result<T> {
    match val {
        Some(v) => Ok(v),
        None => Err(ParseStatError {
            line: row.to_string(),
            field_name,
            position,
        }
        .into()),
    }
}

impl FromStr for Stat {
    type Err = ProcFsError;
    /// Parse the results of /proc/[pid]/stat into a `Stat`
    ///
    /// `comm` is wrapped in parens and may itself contain spaces and parens,
    /// so it runs from the first `(` to the *last* `)`.
    fn from_str(s: &str) -> Result<Stat> {
        let open = s.find('(');
        let close = s.rfind(')');
        let (open, close) = match (open, close) {
            (Some(open), Some(close)) if open < close => (open, close),
            _ => {
                return Err(ParseStatError {
                    line: s.to_string(),
                    field_name: "comm",
                    position: 1,
                }
                .into())
            }
        };
        let pid = s[..open].trim().parse().ok();
        Ok(Stat {
            pid: field(pid, "pid", s, 0)?,
            comm: s[open + 1..close].to_owned(),
        })
    }
}

/// The visible command line for a process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmdLine {
    /// The raw parts of the command line
    ///
    /// The vec of arguments that started the process
    pub raw: Vec<String>,
}

impl CmdLine {
    pub fn from_pid<P: fmt::Display>(pid: P) -> Result<CmdLine> {
        Ok(CmdLine::from_bytes(&read_proc_file(pid, "cmdline")?))
    }

    /// Arguments in /proc/[pid]/cmdline are separated by NUL bytes
    ///
    /// Bytes that aren't UTF-8 become U+FFFD, the rest of the argument and
    /// every other argument are kept as they are.
    pub fn from_bytes(raw: &[u8]) -> CmdLine {
        CmdLine {
            raw: raw
                .split(|&b| b == 0)
                .filter(|arg| !arg.is_empty())
                .map(|arg| String::from_utf8_lossy(arg).into_owned())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn display(&self) -> String {
        self.raw.join(" ")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_stat_lines() {
        for (i, s) in [
            "529 ((sd-proc)) S 885 885 885 0 -1 107793 24 0 0 0 0 \
             0 0 0 20 0 1 0 7777777 111111111 647 18848888888888888888 1 1 0 \
             0 0 0 0 4096 0 0 0 0 17 15 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "47 (migration/8) S 2 0 0 0 -1 66666668 0 0 0 0 0 14 0 0 -100 0 1 \
             0 25 0 0 18848888888888888888 0 0 0 0 0 0 0 2147483647 0 0 0 0 17 \
             8 99 1 0 0 0 0 0 0 0 0 0 0 0",
            "122 (statsd /app/connection) S 103 103 181 0 -1 304 0626 0 \
             0 0 605 198 0 0 20 0 10 0 71025 1230417920 11878 18848888888888888888 \
             1 1 0 0 0 0 0 4096 16898 0 0 0 17 11 0 0 0 0 0 0 0 0 0 0 0 0 0",
        ]
        .iter()
        .enumerate()
        {
            s.parse::<Stat>().unwrap_or_else(|e| match e {
                ProcFsError::ParseStatError(e) => panic!("line {}: {}", i, e),
                x => panic!("unexpected error: {:?}", x),
            });
        }
    }

    #[test]
    fn stat_comm_keeps_inner_parens() {
        let stat: Stat = "529 ((sd-proc)) S 885 885".parse().unwrap();
        assert_eq!(
            stat,
            Stat {
                pid: 529,
                comm: "(sd-proc)".to_owned(),
            }
        );

        let stat: Stat = "4242 (qemu-system-x86) S 1 4242 4242 0".parse().unwrap();
        assert_eq!(stat.comm, "qemu-system-x86");
    }

    #[test]
    fn stat_rejects_truncated_lines() {
        for bad in ["", "12 (bash", "12 bash) S", "abc (bash) S 1"].iter() {
            match bad.parse::<Stat>() {
                Err(ProcFsError::ParseStatError(_)) => {}
                other => panic!("'{}' parsed to {:?}", bad, other),
            }
        }
    }

    #[test]
    fn cmdline_splits_on_nul() {
        let cmd = CmdLine::from_bytes(b"qemu-system-x86_64\0-m\02048\0-smp\04\0");
        assert_eq!(cmd.raw, ["qemu-system-x86_64", "-m", "2048", "-smp", "4"]);
        assert_eq!(cmd.display(), "qemu-system-x86_64 -m 2048 -smp 4");
        assert!(CmdLine::from_bytes(b"").is_empty());
    }

    #[test]
    fn cmdline_keeps_arguments_that_are_not_utf8() {
        let cmd = CmdLine::from_bytes(b"qemu-kvm\0-drive\0file=/var/lib/vm/\xffdisk\0-m\04096\0");
        assert_eq!(cmd.raw.len(), 5);
        assert_eq!(cmd.raw[2], "file=/var/lib/vm/\u{fffd}disk");
        assert_eq!(cmd.raw[3..], ["-m", "4096"]);
    }

    #[test]
    fn useful_cmdline_falls_back_to_comm() {
        let kthread = Process {
            stat: "2 (kthreadd) S 0 0".parse().unwrap(),
            cmdline: CmdLine::default(),
        };
        assert_eq!(kthread.useful_cmdline(), "kthreadd");
    }
}
