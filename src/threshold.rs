//! Warning/critical thresholds and the classification policy
//!
//! A metric is compared against its two thresholds independently, and is
//! only in violation when it is *strictly greater* than a threshold. Nothing
//! here insists that `warn <= crit`: with an inverted pair a value can go
//! straight from OK to CRITICAL, and that is left to whoever wrote the
//! thresholds.

use std::cmp::max;
use std::fmt;
use std::num;
use std::str::FromStr;

use derive_more::From;

use crate::Status;

#[derive(Debug, From)]
pub enum ParseThresholdError {
    /// A threshold was not a non-negative whole number
    InvalidInt(num::ParseIntError),
    /// A threshold was not a number at all
    InvalidFloat(num::ParseFloatError),
    /// Negative and non-finite numbers make no sense as limits
    OutOfRange(String),
    /// A comma separated list had the wrong number of parts
    WrongCount { expected: usize, got: String },
}

impl fmt::Display for ParseThresholdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::ParseThresholdError::*;
        match *self {
            InvalidInt(ref e) => write!(f, "invalid threshold: {}", e),
            InvalidFloat(ref e) => write!(f, "invalid threshold: {}", e),
            OutOfRange(ref s) => write!(f, "threshold '{}' must be a positive number", s),
            WrongCount { expected, ref got } => write!(
                f,
                "expected {} comma separated thresholds, got '{}'",
                expected, got
            ),
        }
    }
}

/// A (warning, critical) pair for a single metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub warn: u64,
    pub crit: u64,
}

impl Threshold {
    pub fn new(warn: u64, crit: u64) -> Threshold {
        Threshold { warn, crit }
    }

    /// Critical wins over warning, and equal to a threshold is not a violation
    pub fn classify(&self, value: u64) -> Status {
        if value > self.crit {
            Status::Critical
        } else if value > self.warn {
            Status::Warning
        } else {
            Status::Ok
        }
    }

    /// The threshold that `value` crossed, if any
    pub fn exceeded(&self, value: u64) -> Option<(Status, u64)> {
        match self.classify(value) {
            Status::Critical => Some((Status::Critical, self.crit)),
            Status::Warning => Some((Status::Warning, self.warn)),
            _ => None,
        }
    }

    /// How far `value` is from the warning threshold
    ///
    /// Zero once the threshold is reached.
    pub fn headroom(&self, value: u64) -> u64 {
        self.warn.saturating_sub(value)
    }
}

/// The worst status out of a group of statuses
///
/// An empty group is OK.
pub fn worst<I: IntoIterator<Item = Status>>(statuses: I) -> Status {
    statuses.into_iter().fold(Status::Ok, max)
}

/// One limit each for IOPS, read bandwidth and write bandwidth
///
/// Parsed from the command line as `iops,read,write`, e.g. `200,10,10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoLimits {
    pub iops: u64,
    pub read: u64,
    pub write: u64,
}

impl FromStr for IoLimits {
    type Err = ParseThresholdError;

    fn from_str(s: &str) -> Result<IoLimits, ParseThresholdError> {
        let fields = s
            .split(',')
            .map(|part| part.trim().parse::<u64>())
            .collect::<Result<Vec<_>, _>>()?;
        if fields.len() != 3 {
            return Err(ParseThresholdError::WrongCount {
                expected: 3,
                got: s.to_owned(),
            });
        }
        Ok(IoLimits {
            iops: fields[0],
            read: fields[1],
            write: fields[2],
        })
    }
}

impl fmt::Display for IoLimits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{},{}", self.iops, self.read, self.write)
    }
}

/// Thresholds for the three disk metrics, paired up from `-w` and `-c`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoThresholds {
    pub iops: Threshold,
    pub read: Threshold,
    pub write: Threshold,
}

impl IoThresholds {
    pub fn new(warn: IoLimits, crit: IoLimits) -> IoThresholds {
        IoThresholds {
            iops: Threshold::new(warn.iops, crit.iops),
            read: Threshold::new(warn.read, crit.read),
            write: Threshold::new(warn.write, crit.write),
        }
    }
}

/// A count given on the command line, rounded to the nearest integer
///
/// `4.5` becomes 5, `4.4` becomes 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundedCount(pub u64);

impl FromStr for RoundedCount {
    type Err = ParseThresholdError;

    fn from_str(s: &str) -> Result<RoundedCount, ParseThresholdError> {
        let val: f64 = s.trim().parse()?;
        if !val.is_finite() || val < 0.0 {
            return Err(ParseThresholdError::OutOfRange(s.to_owned()));
        }
        Ok(RoundedCount(val.round() as u64))
    }
}

#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn strictly_greater_than() {
        let t = Threshold::new(10, 20);
        assert_eq!(t.classify(0), Status::Ok);
        assert_eq!(t.classify(10), Status::Ok);
        assert_eq!(t.classify(11), Status::Warning);
        assert_eq!(t.classify(20), Status::Warning);
        assert_eq!(t.classify(21), Status::Critical);
    }

    #[test]
    fn inverted_thresholds_are_not_reordered() {
        let t = Threshold::new(20, 10);
        assert_eq!(t.classify(15), Status::Critical);
        assert_eq!(t.classify(25), Status::Critical);
        assert_eq!(t.classify(5), Status::Ok);
    }

    #[test]
    fn exceeded_reports_the_crossed_limit() {
        let t = Threshold::new(4, 8);
        assert_eq!(t.exceeded(4), None);
        assert_eq!(t.exceeded(6), Some((Status::Warning, 4)));
        assert_eq!(t.exceeded(9), Some((Status::Critical, 8)));
    }

    #[test]
    fn headroom_never_goes_negative() {
        let t = Threshold::new(4000, 8000);
        assert_eq!(t.headroom(1000), 3000);
        assert_eq!(t.headroom(6144), 0);
    }

    #[test]
    fn worst_of_all() {
        assert_eq!(worst(vec![]), Status::Ok);
        assert_eq!(
            worst(vec![Status::Ok, Status::Critical, Status::Warning]),
            Status::Critical
        );
        assert_eq!(worst(vec![Status::Ok, Status::Warning]), Status::Warning);
    }

    #[test]
    fn io_limits_parse() {
        assert_eq!(
            "200,10,10".parse::<IoLimits>().unwrap(),
            IoLimits {
                iops: 200,
                read: 10,
                write: 10,
            }
        );
        assert_eq!(
            " 1, 2 ,3".parse::<IoLimits>().unwrap(),
            IoLimits {
                iops: 1,
                read: 2,
                write: 3,
            }
        );
    }

    #[test]
    fn io_limits_reject_garbage() {
        for bad in ["", "1,2", "1,2,3,4", "a,b,c", "1,-2,3", "1.5,2,3"].iter() {
            assert!(
                bad.parse::<IoLimits>().is_err(),
                "'{}' should not have parsed",
                bad
            );
        }
    }

    #[test]
    fn io_thresholds_pair_warn_and_crit() {
        let t = IoThresholds::new(
            "200,10,10".parse().unwrap(),
            "250,20,30".parse().unwrap(),
        );
        assert_eq!(t.iops, Threshold::new(200, 250));
        assert_eq!(t.read, Threshold::new(10, 20));
        assert_eq!(t.write, Threshold::new(10, 30));
    }

    #[test]
    fn rounded_counts() {
        assert_eq!("4".parse::<RoundedCount>().unwrap(), RoundedCount(4));
        assert_eq!("4.4".parse::<RoundedCount>().unwrap(), RoundedCount(4));
        assert_eq!("4.5".parse::<RoundedCount>().unwrap(), RoundedCount(5));
        assert!("-1".parse::<RoundedCount>().is_err());
        assert!("inf".parse::<RoundedCount>().is_err());
        assert!("lots".parse::<RoundedCount>().is_err());
    }
}
