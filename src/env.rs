use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::config::Product;
use crate::errors::ProviError;
use crate::utils::fs::file_exists;

/// Facts about the live environment the installer runs in. Gathered
/// once at startup, read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct RunEnv {
    pub boot_type: BootType,

    /// Total system memory in MiB.
    pub total_memory_mib: u64,

    #[serde(default)]
    pub kernel_cmdline: String,

    /// When set, the inventory synthesizes disks from these plain
    /// files instead of scanning `/sys/block`. Destructive operations
    /// are refused in this mode.
    #[serde(default)]
    pub test_images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootType {
    Bios,
    Efi,
}

impl RunEnv {
    /// Reads a prepared run-environment JSON file, as written by the
    /// ISO boot scripts.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ProviError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            ProviError::NoSuchFile(err, path.display().to_string())
        })?;

        serde_json::from_reader(BufReader::new(file))
            .map_err(|err| ProviError::BadConfig(format!("bad run env: {err}")))
    }

    /// Probes the live system directly: EFI variables for the boot
    /// mode, /proc/meminfo for memory, /proc/cmdline verbatim.
    pub fn detect() -> Result<Self, ProviError> {
        let boot_type = if file_exists("/sys/firmware/efi") {
            BootType::Efi
        } else {
            BootType::Bios
        };

        let meminfo = std::fs::read_to_string("/proc/meminfo")
            .map_err(|err| ProviError::NoSuchFile(err, "/proc/meminfo".into()))?;
        let total_memory_mib = parse_meminfo_total_mib(&meminfo)?;

        let kernel_cmdline = std::fs::read_to_string("/proc/cmdline")
            .map_err(|err| ProviError::NoSuchFile(err, "/proc/cmdline".into()))?
            .trim()
            .to_string();

        Ok(RunEnv {
            boot_type,
            total_memory_mib,
            kernel_cmdline,
            test_images: None,
        })
    }

    pub fn in_test_mode(&self) -> bool {
        self.test_images.is_some()
    }

    /// Default ZFS ARC ceiling in MiB. The hypervisor trades cache for
    /// guest memory; other products keep the ZFS default (0).
    pub fn default_arc_max_mib(&self, product: Product) -> u64 {
        if !product.separates_guest_storage() {
            return 0;
        }

        (self.total_memory_mib / 2).clamp(64, 16 * 1024)
    }
}

fn parse_meminfo_total_mib(meminfo: &str) -> Result<u64, ProviError> {
    for line in meminfo.lines() {
        let Some(rest) = line.strip_prefix("MemTotal:") else {
            continue;
        };

        let kb: u64 = rest
            .trim()
            .trim_end_matches("kB")
            .trim()
            .parse()
            .map_err(|err| {
                ProviError::Bug(format!("bad MemTotal line '{line}': {err}"))
            })?;

        return Ok(kb / 1024);
    }

    Err(ProviError::Bug("no MemTotal in /proc/meminfo".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        // 16315336 kB floors to 15932 MiB
        let meminfo = "MemTotal:       16315336 kB\nMemFree:  123 kB\n";
        assert_eq!(15932, parse_meminfo_total_mib(meminfo).unwrap());

        assert!(parse_meminfo_total_mib("MemFree: 1 kB\n").is_err());
    }

    #[test]
    fn test_run_env_json() {
        let env: RunEnv = serde_json::from_str(
            r#"{
                "boot_type": "efi",
                "total_memory_mib": 4096,
                "kernel_cmdline": "quiet provi.swapsize=2GiB",
                "test_images": ["/tmp/disk0.img"]
            }"#,
        )
        .unwrap();

        assert_eq!(BootType::Efi, env.boot_type);
        assert_eq!(4096, env.total_memory_mib);
        assert!(env.in_test_mode());
    }

    #[test]
    fn test_default_arc_max() {
        let env = RunEnv {
            boot_type: BootType::Efi,
            total_memory_mib: 8192,
            kernel_cmdline: String::new(),
            test_images: None,
        };

        assert_eq!(4096, env.default_arc_max_mib(Product::Hypervisor));
        assert_eq!(0, env.default_arc_max_mib(Product::Backup));

        let big = RunEnv {
            total_memory_mib: 128 * 1024,
            ..env
        };
        assert_eq!(16 * 1024, big.default_arc_max_mib(Product::Hypervisor));
    }
}
