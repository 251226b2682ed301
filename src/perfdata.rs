//! Turn metrics into the one line of output a plugin is allowed
//!
//! Output looks like:
//!
//! ```plain
//! WARNING: 2 guests: memory 6144 MB allocated (2144MB over warning 4000), vcpu 6 allocated (2 over warning 4)|memory=6144MB;4000;8000;0; vcpu=6;4;8;0;
//! ```
//!
//! Everything after the `|` is performance data in the
//! `name=value[uom];warn;crit;min;max` format, one space separated token per
//! metric.

use std::fmt;

use crate::threshold::{worst, Threshold};
use crate::Status;

/// How to describe a metric's relationship to its thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// Only mention thresholds once they have been crossed
    Exceeded,
    /// Also say how much room is left before warning
    Headroom,
}

/// A single measured value and the limits it is held to
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Name used in performance data
    pub name: &'static str,
    pub value: u64,
    /// Unit of measure for performance data, e.g. `MB`
    pub uom: &'static str,
    /// How the value reads in the human summary, e.g. `MiB/s`
    pub label: String,
    pub threshold: Threshold,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub annotation: Annotation,
}

impl Metric {
    pub fn new(name: &'static str, value: u64, threshold: Threshold) -> Metric {
        Metric {
            name,
            value,
            uom: "",
            label: String::new(),
            threshold,
            min: Some(0),
            max: None,
            annotation: Annotation::Exceeded,
        }
    }

    pub fn with_uom(mut self, uom: &'static str) -> Metric {
        self.uom = uom;
        self
    }

    pub fn with_label<S: Into<String>>(mut self, label: S) -> Metric {
        self.label = label.into();
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Metric {
        self.annotation = annotation;
        self
    }

    pub fn status(&self) -> Status {
        self.threshold.classify(self.value)
    }

    /// The human readable part, e.g. `read 12 MiB/s (> warning 10)`
    pub fn summary(&self) -> String {
        let mut out = format!("{} {}", self.name, self.value);
        if !self.label.is_empty() {
            out.push(' ');
            out.push_str(&self.label);
        }
        match (self.annotation, self.threshold.exceeded(self.value)) {
            (Annotation::Exceeded, Some((status, limit))) => {
                out.push_str(&format!(" (> {} {})", level(status), limit));
            }
            (Annotation::Exceeded, None) => {}
            (Annotation::Headroom, Some((status, limit))) => {
                out.push_str(&format!(
                    " ({}{} over {} {})",
                    self.value - limit,
                    self.uom,
                    level(status),
                    limit
                ));
            }
            (Annotation::Headroom, None) => {
                out.push_str(&format!(
                    " ({}{} available)",
                    self.threshold.headroom(self.value),
                    self.uom
                ));
            }
        }
        out
    }
}

fn level(status: Status) -> &'static str {
    match status {
        Status::Critical => "critical",
        Status::Warning => "warning",
        _ => "ok",
    }
}

fn opt(val: Option<u64>) -> String {
    val.map_or_else(String::new, |v| v.to_string())
}

impl fmt::Display for Metric {
    /// The performance data token
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}={}{};{};{};{};{}",
            self.name,
            self.value,
            self.uom,
            self.threshold.warn,
            self.threshold.crit,
            opt(self.min),
            opt(self.max)
        )
    }
}

/// Everything a check has to say, ready to be printed
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Printed before the metric summaries, e.g. the device name
    pub subject: String,
    pub metrics: Vec<Metric>,
}

impl Report {
    pub fn new<S: Into<String>>(subject: S) -> Report {
        Report {
            subject: subject.into(),
            metrics: Vec::new(),
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Report {
        self.metrics.push(metric);
        self
    }

    /// The worst status of any metric
    pub fn status(&self) -> Status {
        worst(self.metrics.iter().map(Metric::status))
    }

    pub fn output(&self) -> String {
        let summaries = self
            .metrics
            .iter()
            .map(Metric::summary)
            .collect::<Vec<_>>()
            .join(", ");
        let perfdata = self
            .metrics
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let summary = if self.subject.is_empty() {
            summaries
        } else {
            format!("{}: {}", self.subject, summaries)
        };
        crate::single_line(&format!("{}: {}|{}", self.status(), summary, perfdata))
    }

    /// Print the report and exit with its status
    pub fn exit(&self) -> ! {
        println!("{}", self.output());
        self.status().exit()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn perfdata_token() {
        let m = Metric::new("read", 12, Threshold::new(10, 20)).with_uom("MB");
        assert_eq!(m.to_string(), "read=12MB;10;20;0;");

        let mut m = Metric::new("iops", 3, Threshold::new(200, 250));
        m.min = None;
        m.max = Some(500);
        assert_eq!(m.to_string(), "iops=3;200;250;;500");
    }

    #[test]
    fn exceeded_annotations() {
        let t = Threshold::new(10, 20);
        let m = |v| {
            Metric::new("read", v, t)
                .with_uom("MB")
                .with_label("MiB/s")
                .summary()
        };
        assert_eq!(m(5), "read 5 MiB/s");
        assert_eq!(m(15), "read 15 MiB/s (> warning 10)");
        assert_eq!(m(25), "read 25 MiB/s (> critical 20)");
    }

    #[test]
    fn headroom_annotations() {
        let t = Threshold::new(4, 8);
        let m = |v| {
            Metric::new("vcpu", v, t)
                .with_label("allocated")
                .with_annotation(Annotation::Headroom)
                .summary()
        };
        assert_eq!(m(3), "vcpu 3 allocated (1 available)");
        assert_eq!(m(6), "vcpu 6 allocated (2 over warning 4)");
        assert_eq!(m(10), "vcpu 10 allocated (2 over critical 8)");
    }

    #[test]
    fn report_takes_the_worst_status() {
        let report = Report::new("sda")
            .with_metric(Metric::new("iops", 2, Threshold::new(200, 250)))
            .with_metric(Metric::new("write", 30, Threshold::new(10, 20)).with_uom("MB"));
        assert_eq!(report.status(), Status::Critical);
        assert_eq!(
            report.output(),
            "CRITICAL: sda: iops 2, write 30 (> critical 20)|iops=2;200;250;0; write=30MB;10;20;0;"
        );
    }

    #[test]
    fn empty_report_is_ok() {
        assert_eq!(Report::new("").status(), Status::Ok);
    }
}
