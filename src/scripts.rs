//! Documentation about the various scripts contained herein
//!
//! - [check-diskio](#check-diskio)
//! - [check-qemu](#check-qemu)
//!
//! # check-diskio
//!
//! Linux-only. Reads /sys/block and keeps one state file per device.
//!
//! ```plain
//! $ check-diskio --help
//! check-diskio (part of vmhost-plugins) 0.1.0
//! Check block device IOPS and read/write bandwidth
//!
//! Every run saves the device's counters to a state file and compares them to the ones saved by the previous run. If
//! there is no previous sample, one is taken and the check waits five seconds before sampling again.
//!
//! USAGE:
//!     check-diskio [OPTIONS] --crit <crit> --warn <warn>
//!
//! FLAGS:
//!     -h, --help       Prints help information
//!     -V, --version    Prints version information
//!
//! OPTIONS:
//!     -c, --crit <crit>              Go critical above <iops,read,write>, bandwidth in --unit per second
//!     -d, --device <device>          Block device to check, as named in /sys/block [default: sda]
//!         --state-dir <state-dir>    Where to keep the previous sample. Defaults to the system temp dir
//!     -u, --unit <unit>              Bandwidth unit, MiB (m) or KiB (k) [default: m]  [possible values: m, k]
//!     -w, --warn <warn>              Warn above <iops,read,write>, bandwidth in --unit per second
//!
//! Examples:
//!
//!     Warn over 200 IOPS or 10 MiB/s in either direction, go critical over 250
//!     IOPS or 20 MiB/s:
//!
//!         check-diskio -d sda -w 200,10,10 -c 250,20,20
//!
//!     The same for an NVMe drive, with bandwidth in KiB/s:
//!
//!         check-diskio -d nvme0n1 -u k -w 2000,40000,40000 -c 4000,80000,80000
//! ```
//!
//! # check-qemu
//!
//! Linux-only. Reads running processes.
//!
//! ```plain
//! $ check-qemu --help
//! check-qemu (part of vmhost-plugins) 0.1.0
//! Check the memory and vCPUs allocated to running QEMU guests.
//!
//! Allocations are read from each guest's `-m` and `-smp` arguments and added up across every running guest. Thresholds
//! are rounded to the nearest whole number.
//!
//! USAGE:
//!     check-qemu [OPTIONS] --mem-crit <mem-crit> --mem-warn <mem-warn> --vcpu-crit <vcpu-crit> --vcpu-warn <vcpu-warn>
//!
//! FLAGS:
//!     -h, --help       Prints help information
//!     -V, --version    Prints version information
//!
//! OPTIONS:
//!     -M, --mem-crit <mem-crit>      Go critical above this many MiB allocated
//!     -m, --mem-warn <mem-warn>      Warn above this many MiB allocated
//!         --pattern <pattern>        Regex that the process name of a guest must match [default: ^qemu]
//!     -P, --vcpu-crit <vcpu-crit>    Go critical above this many vCPUs allocated
//!     -p, --vcpu-warn <vcpu-warn>    Warn above this many vCPUs allocated
//!
//! Examples:
//!
//!     Warn once guests have been given more than 48 GiB of memory or 16 vCPUs,
//!     go critical past 60 GiB or 24 vCPUs:
//!
//!         check-qemu -m 49152 -M 61440 -p 16 -P 24
//! ```
