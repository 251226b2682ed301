//! Structs and impls for the various files from the /proc filesystem
//!
//! Each file gets a struct to represent its data, with an associated `load`
//! function.

use std::collections::{hash_map, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::result::Result as StdResult;

use derive_more::From;
use log::debug;
use regex::Regex;

pub mod pid;

/// ProcFs errors
///
/// Every error from in this module can be converted into a `ProcFsError`
#[derive(Debug, From)]
pub enum ProcFsError {
    /// Errors originating in IO
    Io(io::Error),
    /// When we receive an error loading an individual proc, we get this
    LoadProcsError(LoadProcsError),
    /// Happens when we try to parse a line from /proc/<pid>/stat and got an error
    ParseStatError(ParseStatError),
}

impl fmt::Display for ProcFsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        use self::ProcFsError::*;
        match *self {
            Io(ref e) => write!(f, "{}", e),
            LoadProcsError(ref e) => write!(f, "{}", e),
            ParseStatError(ref e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug)]
pub struct LoadProcsError {
    /// The data we successfully loaded
    pub procs: RunningProcs,
    /// The errors we got when loading
    pub errors: Vec<ProcFsError>,
}

impl fmt::Display for LoadProcsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        write!(
            f,
            "loaded {} processes correctly, but got {} errors:",
            self.procs.0.len(),
            self.errors.len()
        )?;
        for err in &self.errors {
            write!(f, " {};", err)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ParseStatError {
    pub line: String,
    pub field_name: &'static str,
    pub position: u8,
}

impl fmt::Display for ParseStatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        write!(
            f,
            "unable to parse '{}' at position {} from line '{}'",
            self.field_name, self.position, self.line
        )
    }
}

/// All the results are results with `ProcFsError`s
pub type Result<T> = StdResult<T, ProcFsError>;

pub type ProcMap = HashMap<i32, pid::Process>;

/// All the processes that are running
#[derive(Debug, Default)]
pub struct RunningProcs(pub ProcMap);

impl RunningProcs {
    /// Load the currently running processes from /proc/[pid]/*
    pub fn currently_running() -> Result<RunningProcs> {
        let mut procs = ProcMap::new();
        let mut errors = vec![];
        let is_digit = Regex::new(r"^[0-9]+$").expect("pid pattern is valid");
        for entry in fs::read_dir("/proc")? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let fname = entry.file_name();
            let fname = match fname.to_str() {
                Some(fname) if is_digit.is_match(fname) => fname,
                // we only care about the pid directories
                _ => continue,
            };
            match pid::Process::from_pid(fname) {
                Ok(prc) => {
                    procs.insert(prc.stat.pid, prc);
                }
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            Ok(RunningProcs(procs))
        } else {
            Err(LoadProcsError {
                procs: RunningProcs(procs),
                errors,
            }
            .into())
        }
    }

    /// Load running processes, ignoring ones that exit while we look at them
    ///
    /// Processes come and go between listing /proc and reading the files in
    /// each pid directory. Only errors that mean the process is gone are
    /// dropped, anything else (permissions, a hidepid mount) is reported.
    pub fn currently_running_lenient() -> Result<RunningProcs> {
        match RunningProcs::currently_running() {
            Ok(procs) => Ok(procs),
            Err(ProcFsError::LoadProcsError(LoadProcsError { procs, errors })) => {
                let before = errors.len();
                let errors = errors
                    .into_iter()
                    .filter(|err| !exited_while_loading(err))
                    .collect::<Vec<_>>();
                debug!(
                    "skipped {} processes that exited while loading",
                    before - errors.len()
                );
                if errors.is_empty() {
                    Ok(procs)
                } else {
                    Err(LoadProcsError { procs, errors }.into())
                }
            }
            Err(err) => Err(err),
        }
    }

    pub fn empty() -> RunningProcs {
        RunningProcs(HashMap::new())
    }

    pub fn iter(&self) -> hash_map::Iter<i32, pid::Process> {
        self.0.iter()
    }
}

/// The pid directory vanished, or the process is a zombie being reaped
fn exited_while_loading(err: &ProcFsError) -> bool {
    match *err {
        ProcFsError::Io(ref e) => {
            e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ESRCH)
        }
        _ => false,
    }
}

// ////////////////////////////////////////////////////////////////////////////
// Testing


#[cfg(test)]
#[cfg(target_os = "linux")]
mod integration {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use std::process::{Child, Command};

    use super::RunningProcs;

    #[test]
    fn can_read_all_procs() {
        let procs = RunningProcs::currently_running_lenient().unwrap();
        assert!(!procs.0.is_empty());
    }

    /// A shell that stays alive with a non UTF-8 argument in its argv
    fn spawn_with_raw_arg() -> Child {
        Command::new("sh")
            .arg("-c")
            .arg("sleep 30; :")
            .arg(OsStr::from_bytes(b"/var/lib/vm/\xffdisk"))
            .args(&["-m", "4096", "-smp", "2"])
            .spawn()
            .unwrap()
    }

    #[test]
    fn processes_with_non_utf8_arguments_are_loaded() {
        let mut child = spawn_with_raw_arg();
        let procs = RunningProcs::currently_running_lenient();
        child.kill().unwrap();
        child.wait().unwrap();

        let procs = procs.unwrap();
        let process = &procs.0[&(child.id() as i32)];
        assert_eq!(
            process.cmdline.raw[3..],
            ["/var/lib/vm/\u{fffd}disk", "-m", "4096", "-smp", "2"]
        );
    }

    #[test]
    fn finds_ourselves() {
        let procs = RunningProcs::currently_running_lenient().unwrap();
        let me = std::process::id() as i32;
        assert!(procs.0.contains_key(&me));
    }
}
