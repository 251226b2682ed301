//! How much memory and CPU has been promised to QEMU guests
//!
//! This reads what each guest was *started with*, from its command line, not
//! what it is currently using. The point is to notice a host that has been
//! overcommitted, before the guests all get busy at once.

use std::convert::TryFrom;
use std::fmt;
use std::num;

use derive_more::From;
use log::debug;
use regex::Regex;

use crate::procfs::pid::Process;
use crate::procfs::RunningProcs;

/// Matched against the process name to find guests
pub const DEFAULT_PATTERN: &str = "^qemu";

#[derive(Debug, From)]
pub enum AllocationError {
    /// A flag was the last argument
    MissingValue(&'static str),
    InvalidInt(num::ParseIntError),
    /// A value that parsed, but not in a way we understand
    Unsupported(String),
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::AllocationError::*;
        match *self {
            MissingValue(flag) => write!(f, "no value after {}", flag),
            InvalidInt(ref e) => write!(f, "invalid number: {}", e),
            Unsupported(ref s) => write!(f, "unsupported value '{}'", s),
        }
    }
}

/// Resources handed to one guest, or to several guests added together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Allocation {
    /// Memory in MiB
    pub memory_mb: u64,
    pub vcpus: u64,
}

impl Allocation {
    /// Read `-m` and `-smp` out of a QEMU command line
    ///
    /// A guest started without one of them counts as zero for it.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Allocation, AllocationError> {
        let mut alloc = Allocation::default();
        let mut args = args.iter().map(AsRef::as_ref);
        while let Some(arg) = args.next() {
            match arg {
                "-m" => {
                    let val = args.next().ok_or(AllocationError::MissingValue("-m"))?;
                    alloc.memory_mb = parse_memory(val)?;
                }
                "-smp" => {
                    let val = args.next().ok_or(AllocationError::MissingValue("-smp"))?;
                    alloc.vcpus = parse_smp(val)?;
                }
                _ => {}
            }
        }
        Ok(alloc)
    }
}

impl std::ops::Add for Allocation {
    type Output = Allocation;
    fn add(self, rhs: Allocation) -> Allocation {
        Allocation {
            memory_mb: self.memory_mb.saturating_add(rhs.memory_mb),
            vcpus: self.vcpus.saturating_add(rhs.vcpus),
        }
    }
}

impl std::iter::Sum for Allocation {
    fn sum<I: Iterator<Item = Allocation>>(iter: I) -> Allocation {
        iter.fold(Allocation::default(), |acc, a| acc + a)
    }
}

/// `-m 2048`, `-m 2G`, `-m size=4096M,slots=2,maxmem=8G`, `-m slots=2,size=4G`
///
/// A bare number is MiB, same as QEMU. Suffixes are binary multiples of a
/// byte (`B`, `K`, `M`, `G`, `T`, `P`, `E`), and a size that isn't a whole
/// number of MiB is truncated.
fn parse_memory(val: &str) -> Result<u64, AllocationError> {
    let unsupported = || AllocationError::Unsupported(val.to_owned());
    let size = val
        .split(',')
        .enumerate()
        .filter_map(|(i, opt)| {
            if opt.starts_with("size=") {
                Some(&opt["size=".len()..])
            } else if i == 0 && !opt.contains('=') {
                Some(opt)
            } else {
                None
            }
        })
        .next()
        .ok_or_else(unsupported)?;
    let (digits, shift) = match size.chars().last() {
        Some(c) if c.is_ascii_digit() => (size, 20),
        Some(c) => {
            let shift = match c.to_ascii_uppercase() {
                'B' => 0,
                'K' => 10,
                'M' => 20,
                'G' => 30,
                'T' => 40,
                'P' => 50,
                'E' => 60,
                _ => return Err(unsupported()),
            };
            (&size[..size.len() - c.len_utf8()], shift)
        }
        None => return Err(unsupported()),
    };
    let amount: u64 = digits.parse()?;
    let bytes = u128::from(amount) << shift;
    u64::try_from(bytes >> 20).map_err(|_| unsupported())
}

/// `-smp 4`, `-smp 4,sockets=2`, `-smp cpus=4`, `-smp sockets=2,cores=2`
///
/// Without an explicit count the topology is multiplied out, with any part
/// left out counting as one.
fn parse_smp(val: &str) -> Result<u64, AllocationError> {
    let mut topology = 1u64;
    let mut saw_topology = false;
    for (i, opt) in val.split(',').enumerate() {
        let (key, num) = match opt.find('=') {
            Some(eq) => (&opt[..eq], &opt[eq + 1..]),
            None if i == 0 => ("cpus", opt),
            None => return Err(AllocationError::Unsupported(val.to_owned())),
        };
        match key {
            "cpus" => return Ok(num.parse()?),
            "sockets" | "dies" | "clusters" | "cores" | "threads" => {
                let n: u64 = num.parse()?;
                topology = topology.saturating_mul(n);
                saw_topology = true;
            }
            // maxcpus, books, drawers and anything newer don't change how many
            // vcpus the guest boots with
            _ => {}
        }
    }
    if saw_topology {
        Ok(topology)
    } else {
        Err(AllocationError::Unsupported(val.to_owned()))
    }
}

/// A guest process and what it was given
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guest {
    pub pid: i32,
    pub allocation: Allocation,
}

/// The guests among `procs`, found by matching their process name
pub fn guests(procs: &RunningProcs, pattern: &Regex) -> Result<Vec<Guest>, GuestError> {
    let mut guests = procs
        .iter()
        .filter(|&(_, process)| pattern.is_match(&process.stat.comm))
        .map(|(&pid, process)| guest(pid, process))
        .collect::<Result<Vec<_>, _>>()?;
    guests.sort_by_key(|g| g.pid);
    Ok(guests)
}

fn guest(pid: i32, process: &Process) -> Result<Guest, GuestError> {
    let allocation =
        Allocation::from_args(&process.cmdline.raw).map_err(|err| GuestError { pid, err })?;
    debug!(
        "guest {} ({}): {:?}",
        pid,
        process.useful_cmdline(),
        allocation
    );
    Ok(Guest { pid, allocation })
}

/// A guest whose command line we couldn't make sense of
#[derive(Debug)]
pub struct GuestError {
    pub pid: i32,
    pub err: AllocationError,
}

impl fmt::Display for GuestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unable to read allocation of pid {}: {}", self.pid, self.err)
    }
}

/// Everything handed out to all `guests`
pub fn total(guests: &[Guest]) -> Allocation {
    guests.iter().map(|g| g.allocation).sum()
}


#[cfg(test)]
#[cfg(target_os = "linux")]
mod integration {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use std::process::Command;

    use super::*;

    #[test]
    fn guest_with_non_utf8_argument_is_counted() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 30; :")
            .arg(OsStr::from_bytes(b"/var/lib/vm/\xffdisk"))
            .args(&["-m", "4096", "-smp", "2"])
            .spawn()
            .unwrap();
        let pid = child.id() as i32;
        let procs = RunningProcs::currently_running_lenient();
        child.kill().unwrap();
        child.wait().unwrap();

        let procs = procs.unwrap();
        let mine = procs
            .iter()
            .filter(|&(&p, _)| p == pid)
            .map(|(&p, process)| (p, process.clone()))
            .collect();
        let found = guests(&RunningProcs(mine), &Regex::new("^sh$").unwrap()).unwrap();
        assert_eq!(
            found,
            vec![Guest {
                pid,
                allocation: Allocation {
                    memory_mb: 4096,
                    vcpus: 2,
                },
            }]
        );
    }
}
