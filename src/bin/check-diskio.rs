//! Check block device IOPS and bandwidth
//!
//! Rates are computed against the sample saved by the previous run, so this
//! is meant to be run on a schedule. The first run for a device takes an
//! extra five seconds to collect its own baseline.

use std::path::PathBuf;
use std::time::SystemTime;

use structopt::StructOpt;

use vmhost_plugins::diskio::{measure, Rates, SampleStore, Snapshot, Unit};
use vmhost_plugins::perfdata::{Metric, Report};
use vmhost_plugins::threshold::{IoLimits, IoThresholds};

/// Check block device IOPS and read/write bandwidth
///
/// Every run saves the device's counters to a state file and compares them to
/// the ones saved by the previous run. If there is no previous sample, one is
/// taken and the check waits five seconds before sampling again.
#[derive(StructOpt, Debug)]
#[structopt(
    name = "check-diskio (part of vmhost-plugins)",
    setting = structopt::clap::AppSettings::ColoredHelp,
    after_help = "Examples:

    Warn over 200 IOPS or 10 MiB/s in either direction, go critical over 250
    IOPS or 20 MiB/s:

        check-diskio -d sda -w 200,10,10 -c 250,20,20

    The same for an NVMe drive, with bandwidth in KiB/s:

        check-diskio -d nvme0n1 -u k -w 2000,40000,40000 -c 4000,80000,80000"
)]
struct Args {
    #[structopt(
        short = "d",
        long = "device",
        default_value = "sda",
        help = "Block device to check, as named in /sys/block"
    )]
    device: String,
    #[structopt(
        short = "w",
        long = "warn",
        help = "Warn above <iops,read,write>, bandwidth in --unit per second"
    )]
    warn: IoLimits,
    #[structopt(
        short = "c",
        long = "crit",
        help = "Go critical above <iops,read,write>, bandwidth in --unit per second"
    )]
    crit: IoLimits,
    #[structopt(
        short = "u",
        long = "unit",
        default_value = "m",
        possible_values = &["m", "k"],
        help = "Bandwidth unit, MiB (m) or KiB (k)"
    )]
    unit: Unit,
    #[structopt(
        long = "state-dir",
        parse(from_os_str),
        help = "Where to keep the previous sample. Defaults to the system temp dir"
    )]
    state_dir: Option<PathBuf>,
}

impl Args {
    fn store(&self) -> SampleStore {
        let dir = self.state_dir.clone().unwrap_or_else(std::env::temp_dir);
        SampleStore::for_device(&dir, &self.device)
    }
}

fn build_report(args: &Args, rates: &Rates) -> Report {
    let thresholds = IoThresholds::new(args.warn, args.crit);
    let per_second = rates.unit.per_second();
    Report::new(args.device.clone())
        .with_metric(Metric::new("iops", rates.iops, thresholds.iops))
        .with_metric(
            Metric::new("read", rates.read, thresholds.read)
                .with_uom(rates.unit.uom())
                .with_label(per_second),
        )
        .with_metric(
            Metric::new("write", rates.write, thresholds.write)
                .with_uom(rates.unit.uom())
                .with_label(per_second),
        )
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    vmhost_plugins::init_logging();
    let args: Args = vmhost_plugins::args_or_unknown();

    let store = args.store();
    let device = args.device.clone();
    let rates = measure(&store, args.unit, || Snapshot::load(&device), SystemTime::now)
        .unwrap_or_else(|e| vmhost_plugins::unknown(format!("{}: {}", args.device, e)));

    build_report(&args, &rates).exit();
}
