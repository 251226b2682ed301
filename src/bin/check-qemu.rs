//! Check how much memory and how many vCPUs running QEMU guests were given

use regex::Regex;
use structopt::StructOpt;

use vmhost_plugins::perfdata::{Annotation, Metric, Report};
use vmhost_plugins::procfs::RunningProcs;
use vmhost_plugins::qemu::{self, Allocation};
use vmhost_plugins::threshold::{RoundedCount, Threshold};

/// Check the memory and vCPUs allocated to running QEMU guests.
///
/// Allocations are read from each guest's `-m` and `-smp` arguments and added
/// up across every running guest. Thresholds are rounded to the nearest whole
/// number.
#[derive(StructOpt, Debug)]
#[structopt(
    name = "check-qemu (part of vmhost-plugins)",
    setting = structopt::clap::AppSettings::ColoredHelp,
    after_help = "Examples:

    Warn once guests have been given more than 48 GiB of memory or 16 vCPUs,
    go critical past 60 GiB or 24 vCPUs:

        check-qemu -m 49152 -M 61440 -p 16 -P 24"
)]
struct Args {
    #[structopt(short = "m", long = "mem-warn", help = "Warn above this many MiB allocated")]
    mem_warn: RoundedCount,
    #[structopt(
        short = "M",
        long = "mem-crit",
        help = "Go critical above this many MiB allocated"
    )]
    mem_crit: RoundedCount,
    #[structopt(
        short = "p",
        long = "vcpu-warn",
        help = "Warn above this many vCPUs allocated"
    )]
    vcpu_warn: RoundedCount,
    #[structopt(
        short = "P",
        long = "vcpu-crit",
        help = "Go critical above this many vCPUs allocated"
    )]
    vcpu_crit: RoundedCount,
    #[structopt(
        long = "pattern",
        default_value = "^qemu",
        help = "Regex that the process name of a guest must match"
    )]
    pattern: Regex,
}

fn build_report(args: &Args, guests: usize, total: Allocation) -> Report {
    let memory = Threshold::new(args.mem_warn.0, args.mem_crit.0);
    let vcpu = Threshold::new(args.vcpu_warn.0, args.vcpu_crit.0);
    let subject = if guests == 1 {
        "1 guest".to_owned()
    } else {
        format!("{} guests", guests)
    };
    Report::new(subject)
        .with_metric(
            Metric::new("memory", total.memory_mb, memory)
                .with_uom("MB")
                .with_label("MB allocated")
                .with_annotation(Annotation::Headroom),
        )
        .with_metric(
            Metric::new("vcpu", total.vcpus, vcpu)
                .with_label("allocated")
                .with_annotation(Annotation::Headroom),
        )
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    vmhost_plugins::init_logging();
    let args: Args = vmhost_plugins::args_or_unknown();

    let procs = RunningProcs::currently_running_lenient()
        .unwrap_or_else(|e| vmhost_plugins::unknown(format!("unable to load processes: {}", e)));
    let guests = qemu::guests(&procs, &args.pattern).unwrap_or_else(|e| vmhost_plugins::unknown(e));

    build_report(&args, guests.len(), qemu::total(&guests)).exit();
}
