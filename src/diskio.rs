//! Block device throughput, measured between two runs of a check
//!
//! The kernel only exposes ever-increasing counters for each block device, so
//! a rate needs two samples. Rather than sleeping on every run, the previous
//! run's sample is kept in a small state file and its modification time is
//! used as the time it was taken. The very first run for a device has no
//! previous sample, so it writes one, waits `BOOTSTRAP_DELAY` and samples
//! again.
//!
//! All rates are whole numbers: every division truncates.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread::sleep;
use std::time::{Duration, SystemTime};

use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::sys;

/// How long the first run for a device waits between its two samples
pub const BOOTSTRAP_DELAY: Duration = Duration::from_secs(5);

/// Used to name state files, so several checks can share a directory
pub const PROBE_NAME: &str = "check-diskio";

#[derive(Debug)]
pub enum DiskIoError {
    /// The kernel counters for a device could not be read
    SourceUnreadable { path: PathBuf, err: io::Error },
    /// The kernel counters were empty or not in the expected layout
    InvalidSource { path: PathBuf, reason: InvalidRecord },
    /// The state file could not be read or parsed, and has been removed
    CorruptSample { path: PathBuf, reason: String },
    /// The state file could not be written
    StoreWrite { path: PathBuf, err: io::Error },
    /// Less than a second passed since the previous sample
    ElapsedTooShort { secs: u64 },
    /// The previous sample claims to be from the future
    SampleFromFuture { ahead: Duration },
    /// A counter went backwards, usually a reboot or a replaced device
    NegativeDelta {
        counter: &'static str,
        previous: u64,
        current: u64,
    },
    /// The rates failed, and so did saving the new sample afterwards
    NotSaved {
        cause: Box<DiskIoError>,
        save: Box<DiskIoError>,
    },
}

impl fmt::Display for DiskIoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::DiskIoError::*;
        match *self {
            SourceUnreadable { ref path, ref err } => {
                write!(f, "unable to read {}: {}", path.display(), err)
            }
            InvalidSource {
                ref path,
                ref reason,
            } => write!(f, "unexpected contents in {}: {}", path.display(), reason),
            CorruptSample {
                ref path,
                ref reason,
            } => write!(
                f,
                "removed unusable sample {} ({}), it will be recreated on the next run",
                path.display(),
                reason
            ),
            StoreWrite { ref path, ref err } => {
                write!(f, "unable to save sample to {}: {}", path.display(), err)
            }
            ElapsedTooShort { secs } => write!(
                f,
                "only {}s since the previous sample, need at least 1s",
                secs
            ),
            SampleFromFuture { ahead } => write!(
                f,
                "previous sample is {}s in the future, has the clock changed?",
                ahead.as_secs()
            ),
            NegativeDelta {
                counter,
                previous,
                current,
            } => write!(
                f,
                "{} went backwards ({} -> {}), was the device reset?",
                counter, previous, current
            ),
            NotSaved {
                ref cause,
                ref save,
            } => write!(f, "{} (and {})", cause, save),
        }
    }
}

/// Why a line of counters could not be understood
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRecord(String);

impl fmt::Display for InvalidRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which unit bandwidth is reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    MiB,
    KiB,
}

impl Unit {
    /// Kernel sectors are always 512 bytes, whatever the hardware uses
    pub fn sectors_per_unit(self) -> u64 {
        match self {
            Unit::MiB => 2048,
            Unit::KiB => 2,
        }
    }

    /// Unit of measure for performance data
    pub fn uom(self) -> &'static str {
        match self {
            Unit::MiB => "MB",
            Unit::KiB => "KB",
        }
    }

    pub fn per_second(self) -> &'static str {
        match self {
            Unit::MiB => "MiB/s",
            Unit::KiB => "KiB/s",
        }
    }
}

impl Default for Unit {
    fn default() -> Unit {
        Unit::MiB
    }
}

#[derive(Debug)]
pub struct InvalidUnit(String);

impl fmt::Display for InvalidUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid unit '{}', expected 'm' or 'k'", self.0)
    }
}

impl FromStr for Unit {
    type Err = InvalidUnit;
    fn from_str(s: &str) -> Result<Unit, InvalidUnit> {
        match s {
            "m" | "M" => Ok(Unit::MiB),
            "k" | "K" => Ok(Unit::KiB),
            _ => Err(InvalidUnit(s.to_owned())),
        }
    }
}

/// The four block device counters that rates are built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Reads completed successfully
    pub io_read_count: u64,
    /// 512 byte sectors read
    pub sector_read_count: u64,
    /// Writes completed
    pub io_write_count: u64,
    /// 512 byte sectors written
    pub sector_write_count: u64,
}

impl Snapshot {
    /// Read the current counters for `device` from sysfs
    pub fn load(device: &str) -> Result<Snapshot, DiskIoError> {
        let path = sys::block::stat_path(device);
        let contents = sys::block::stat(device).map_err(|err| DiskIoError::SourceUnreadable {
            path: path.clone(),
            err,
        })?;
        let snapshot = Snapshot::from_stat(&contents)
            .map_err(|reason| DiskIoError::InvalidSource { path, reason })?;
        debug!("sampled {}: {}", device, snapshot);
        Ok(snapshot)
    }

    /// Parse the kernel's block stat layout
    ///
    /// Fields 1, 3, 5 and 7 (counting from one) are reads completed, sectors
    /// read, writes completed and sectors written. Everything else is ignored.
    pub fn from_stat(contents: &str) -> Result<Snapshot, InvalidRecord> {
        let fields = contents.split_whitespace().collect::<Vec<_>>();
        if fields.is_empty() {
            return Err(InvalidRecord("no counters found".to_owned()));
        }
        if fields.len() < 7 {
            return Err(InvalidRecord(format!(
                "expected at least 7 fields, found {}",
                fields.len()
            )));
        }
        Ok(Snapshot {
            io_read_count: counter(fields[0], "reads completed")?,
            sector_read_count: counter(fields[2], "sectors read")?,
            io_write_count: counter(fields[4], "writes completed")?,
            sector_write_count: counter(fields[6], "sectors written")?,
        })
    }

    /// Reads and writes together
    pub fn io_count(&self) -> u64 {
        self.io_read_count.saturating_add(self.io_write_count)
    }
}

fn counter(field: &str, name: &str) -> Result<u64, InvalidRecord> {
    field
        .parse()
        .map_err(|e| InvalidRecord(format!("{} '{}': {}", name, field, e)))
}

impl fmt::Display for Snapshot {
    /// The state file format: the four counters on one line
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.io_read_count, self.sector_read_count, self.io_write_count, self.sector_write_count
        )
    }
}

impl FromStr for Snapshot {
    type Err = InvalidRecord;
    /// Parse a saved sample, which must be exactly four counters
    fn from_str(s: &str) -> Result<Snapshot, InvalidRecord> {
        let fields = s.split_whitespace().collect::<Vec<_>>();
        if fields.len() != 4 {
            return Err(InvalidRecord(format!(
                "expected 4 counters, found {}",
                fields.len()
            )));
        }
        Ok(Snapshot {
            io_read_count: counter(fields[0], "reads completed")?,
            sector_read_count: counter(fields[1], "sectors read")?,
            io_write_count: counter(fields[2], "writes completed")?,
            sector_write_count: counter(fields[3], "sectors written")?,
        })
    }
}

/// The sample to compare against, and the sample to compare
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub previous: Snapshot,
    /// When `previous` was written
    pub taken_at: SystemTime,
    pub current: Snapshot,
}

/// The state file holding the previous sample for one device
///
/// Not locked: two checks running against the same device at the same time
/// will step on each other. Writes go through a temporary file and a rename,
/// so a reader sees either the old sample or the new one.
#[derive(Debug, Clone)]
pub struct SampleStore {
    path: PathBuf,
    bootstrap_delay: Duration,
}

impl SampleStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> SampleStore {
        SampleStore {
            path: path.into(),
            bootstrap_delay: BOOTSTRAP_DELAY,
        }
    }

    /// `<dir>/check-diskio.<device>`
    pub fn for_device(dir: &Path, device: &str) -> SampleStore {
        let name = format!("{}.{}", PROBE_NAME, device.replace('/', "!"));
        SampleStore::new(dir.join(name))
    }

    pub fn with_bootstrap_delay(mut self, delay: Duration) -> SampleStore {
        self.bootstrap_delay = delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved sample and when it was saved, if there is one
    ///
    /// A sample that exists but can't be used is deleted, so that the next
    /// run starts over.
    pub fn load(&self) -> Result<Option<(Snapshot, SystemTime)>, DiskIoError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.discard(e.to_string())),
        };
        let snapshot = match contents.parse::<Snapshot>() {
            Ok(snapshot) => snapshot,
            Err(reason) => return Err(self.discard(reason.to_string())),
        };
        let taken_at = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(taken_at) => taken_at,
            Err(e) => return Err(self.discard(e.to_string())),
        };
        debug!("previous sample from {}: {}", self.path.display(), snapshot);
        Ok(Some((snapshot, taken_at)))
    }

    fn discard(&self, reason: String) -> DiskIoError {
        warn!("removing unusable sample {}: {}", self.path.display(), reason);
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("unable to remove {}: {}", self.path.display(), e);
        }
        DiskIoError::CorruptSample {
            path: self.path.clone(),
            reason,
        }
    }

    /// Replace the saved sample
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), DiskIoError> {
        let write_err = |err: io::Error| DiskIoError::StoreWrite {
            path: self.path.clone(),
            err,
        };
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        writeln!(tmp, "{}", snapshot).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        debug!("saved sample to {}: {}", self.path.display(), snapshot);
        Ok(())
    }

    /// Find the sample to compare `current` against
    ///
    /// Without a saved sample, `current` becomes the saved sample and after
    /// the bootstrap delay `resample` provides a fresh current one.
    pub fn baseline<F>(&self, current: Snapshot, mut resample: F) -> Result<Baseline, DiskIoError>
    where
        F: FnMut() -> Result<Snapshot, DiskIoError>,
    {
        if let Some((previous, taken_at)) = self.load()? {
            return Ok(Baseline {
                previous,
                taken_at,
                current,
            });
        }
        debug!(
            "no previous sample at {}, bootstrapping over {:?}",
            self.path.display(),
            self.bootstrap_delay
        );
        self.save(&current)?;
        let taken_at = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|err| DiskIoError::StoreWrite {
                path: self.path.clone(),
                err,
            })?;
        sleep(self.bootstrap_delay);
        Ok(Baseline {
            previous: current,
            taken_at,
            current: resample()?,
        })
    }
}

/// Whole seconds between the previous sample and `now`, at least one
pub fn elapsed_secs(taken_at: SystemTime, now: SystemTime) -> Result<u64, DiskIoError> {
    match now.duration_since(taken_at) {
        Ok(elapsed) if elapsed.as_secs() >= 1 => Ok(elapsed.as_secs()),
        Ok(elapsed) => Err(DiskIoError::ElapsedTooShort {
            secs: elapsed.as_secs(),
        }),
        Err(e) => Err(DiskIoError::SampleFromFuture {
            ahead: e.duration(),
        }),
    }
}

/// Per-second rates between two samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    /// Reads and writes completed per second
    pub iops: u64,
    /// Bandwidth read, in `unit`s per second
    pub read: u64,
    /// Bandwidth written, in `unit`s per second
    pub write: u64,
    pub unit: Unit,
    pub elapsed_secs: u64,
}

fn delta(counter: &'static str, previous: u64, current: u64) -> Result<u64, DiskIoError> {
    current
        .checked_sub(previous)
        .ok_or(DiskIoError::NegativeDelta {
            counter,
            previous,
            current,
        })
}

impl Rates {
    pub fn between(
        previous: &Snapshot,
        current: &Snapshot,
        elapsed_secs: u64,
        unit: Unit,
    ) -> Result<Rates, DiskIoError> {
        if elapsed_secs < 1 {
            return Err(DiskIoError::ElapsedTooShort { secs: elapsed_secs });
        }
        let ios = delta("io count", previous.io_count(), current.io_count())?;
        let read = delta(
            "sectors read",
            previous.sector_read_count,
            current.sector_read_count,
        )?;
        let write = delta(
            "sectors written",
            previous.sector_write_count,
            current.sector_write_count,
        )?;
        let per_unit = unit.sectors_per_unit();
        Ok(Rates {
            iops: ios / elapsed_secs,
            read: read / per_unit / elapsed_secs,
            write: write / per_unit / elapsed_secs,
            unit,
            elapsed_secs,
        })
    }
}

/// Take a sample, compare it to the saved one and save it for next time
///
/// The new sample is saved even if the rates can't be computed, so a counter
/// reset only costs one run.
pub fn measure<S, C>(
    store: &SampleStore,
    unit: Unit,
    mut sample: S,
    now: C,
) -> Result<Rates, DiskIoError>
where
    S: FnMut() -> Result<Snapshot, DiskIoError>,
    C: Fn() -> SystemTime,
{
    let current = sample()?;
    let baseline = store.baseline(current, &mut sample)?;
    let rates = elapsed_secs(baseline.taken_at, now()).and_then(|elapsed| {
        debug!("{}s since the previous sample", elapsed);
        Rates::between(&baseline.previous, &baseline.current, elapsed, unit)
    });
    match (rates, store.save(&baseline.current)) {
        (Ok(rates), Ok(())) => Ok(rates),
        (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
        (Err(cause), Err(save)) => Err(DiskIoError::NotSaved {
            cause: Box::new(cause),
            save: Box::new(save),
        }),
    }
}

#[cfg(test)]
mod unit {
    use super::*;

    fn snap(io_read: u64, sector_read: u64, io_write: u64, sector_write: u64) -> Snapshot {
        Snapshot {
            io_read_count: io_read,
            sector_read_count: sector_read,
            io_write_count: io_write,
            sector_write_count: sector_write,
        }
    }

    #[test]
    fn parse_sys_block_stat() {
        let line = "  184522     2571 10393790    57092   367604   298563 23541608   627283        0   289568   707268\n";
        assert_eq!(
            Snapshot::from_stat(line).unwrap(),
            snap(184522, 10393790, 367604, 23541608)
        );
    }

    #[test]
    fn parse_sys_block_stat_failures() {
        assert!(Snapshot::from_stat("").is_err());
        assert!(Snapshot::from_stat("   \n").is_err());
        assert!(Snapshot::from_stat("1 2 3 4 5 6").is_err());
        assert!(Snapshot::from_stat("1 2 x 4 5 6 7").is_err());
        assert!(Snapshot::from_stat("1 2 -3 4 5 6 7").is_err());
    }

    #[test]
    fn saved_record_format() {
        let s = snap(1, 2, 3, 4);
        assert_eq!(s.to_string(), "1 2 3 4");
        assert_eq!("1 2 3 4\n".parse::<Snapshot>().unwrap(), s);
        for bad in ["", "1 2 3", "1 2 3 4 5", "1 2 3 four", "1 2 3 -4"].iter() {
            assert!(bad.parse::<Snapshot>().is_err(), "{:?} parsed", bad);
        }
    }

    #[test]
    fn units() {
        assert_eq!("m".parse::<Unit>().unwrap(), Unit::MiB);
        assert_eq!("k".parse::<Unit>().unwrap(), Unit::KiB);
        assert!("g".parse::<Unit>().is_err());
        assert_eq!(Unit::default(), Unit::MiB);
        assert_eq!(Unit::MiB.sectors_per_unit(), 2048);
        assert_eq!(Unit::KiB.sectors_per_unit(), 2);
    }

    #[test]
    fn rates_truncate() {
        // io delta 120, 4096 sectors read, 2048 written over a minute
        let rates = Rates::between(&snap(0, 0, 0, 0), &snap(100, 4096, 20, 2048), 60, Unit::MiB)
            .unwrap();
        assert_eq!((rates.iops, rates.read, rates.write), (2, 0, 0));

        let rates = Rates::between(&snap(0, 0, 0, 0), &snap(100, 4096, 20, 2048), 60, Unit::KiB)
            .unwrap();
        assert_eq!((rates.iops, rates.read, rates.write), (2, 34, 17));
    }

    #[test]
    fn rates_match_the_formula() {
        let prev = snap(1000, 50_000, 2000, 70_000);
        for &elapsed in [1u64, 2, 7, 60, 301].iter() {
            for &unit in [Unit::MiB, Unit::KiB].iter() {
                for &step in [0u64, 1, 999, 4096, 1_000_003].iter() {
                    let cur = snap(1000 + step, 50_000 + step * 3, 2000 + step, 70_000 + step * 5);
                    let rates = Rates::between(&prev, &cur, elapsed, unit).unwrap();
                    let div = unit.sectors_per_unit() * elapsed;
                    assert_eq!(rates.iops, 2 * step / elapsed);
                    assert_eq!(rates.read, step * 3 / div);
                    assert_eq!(rates.write, step * 5 / div);
                }
            }
        }
    }

    #[test]
    fn counters_going_backwards() {
        match Rates::between(&snap(10, 10, 10, 10), &snap(10, 9, 10, 10), 5, Unit::MiB) {
            Err(DiskIoError::NegativeDelta { counter, .. }) => assert_eq!(counter, "sectors read"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(Rates::between(&snap(10, 10, 10, 10), &snap(5, 10, 10, 10), 5, Unit::MiB).is_err());
    }

    #[test]
    fn no_time_no_rate() {
        match Rates::between(&snap(0, 0, 0, 0), &snap(1, 1, 1, 1), 0, Unit::MiB) {
            Err(DiskIoError::ElapsedTooShort { secs: 0 }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn elapsed_whole_seconds() {
        let then = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert_eq!(
            elapsed_secs(then, then + Duration::from_millis(60_900)).unwrap(),
            60
        );
        assert!(match elapsed_secs(then, then) {
            Err(DiskIoError::ElapsedTooShort { secs: 0 }) => true,
            _ => false,
        });
        assert!(match elapsed_secs(then, then + Duration::from_millis(999)) {
            Err(DiskIoError::ElapsedTooShort { secs: 0 }) => true,
            _ => false,
        });
        assert!(match elapsed_secs(then, then - Duration::from_secs(30)) {
            Err(DiskIoError::SampleFromFuture { .. }) => true,
            _ => false,
        });
    }

    #[test]
    fn state_file_name() {
        let store = SampleStore::for_device(Path::new("/tmp"), "sda");
        assert_eq!(store.path(), Path::new("/tmp/check-diskio.sda"));
        let store = SampleStore::for_device(Path::new("/tmp"), "cciss/c0d0");
        assert_eq!(store.path(), Path::new("/tmp/check-diskio.cciss!c0d0"));
    }

    #[test]
    fn errors_are_one_line() {
        let err = DiskIoError::NegativeDelta {
            counter: "io count",
            previous: 10,
            current: 2,
        };
        assert_eq!(
            err.to_string(),
            "io count went backwards (10 -> 2), was the device reset?"
        );
    }
}
