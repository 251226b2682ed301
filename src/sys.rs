//! Interact with the `/sys` pseudo-file system

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

fn read_file<P: AsRef<Path>>(path: P) -> Result<String, io::Error> {
    let mut fh = File::open(path)?;
    let mut contents = String::new();
    fh.read_to_string(&mut contents)?;
    Ok(contents)
}

pub mod block {
    //! Interact with the /sys/block hierarchy
    //!
    //! See [Documentation/block/stat.rst](https://www.kernel.org/doc/Documentation/block/stat.rst)
    //! for the layout of the per-device `stat` file.

    use std::io;
    use std::path::PathBuf;

    use crate::sys::read_file;

    /// Where the kernel exposes the counters for `device`
    ///
    /// Device names that contain a slash (`cciss/c0d0`) are spelled with a
    /// `!` in sysfs, the same as the kernel does.
    pub fn stat_path(device: &str) -> PathBuf {
        PathBuf::from("/sys/block")
            .join(device.replace('/', "!"))
            .join("stat")
    }

    /// The raw contents of `/sys/block/<device>/stat`
    pub fn stat(device: &str) -> Result<String, io::Error> {
        read_file(stat_path(device))
    }
}
