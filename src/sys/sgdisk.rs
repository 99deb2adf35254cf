use std::thread;
use std::time::Duration;

use crate::errors::ProviError;
use crate::utils::fs::file_exists;
use crate::utils::shell;

/// GPT type code of the OS partition, fixed per storage backend. A
/// closed set - no free-form type strings reach sgdisk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsPartType {
    Lvm,
    Zfs,
    Btrfs,
}

impl OsPartType {
    pub fn type_code(&self) -> &'static str {
        match self {
            OsPartType::Lvm => "8E00",
            OsPartType::Zfs => "BF01",
            OsPartType::Btrfs => "8300",
        }
    }
}

/// A planned GPT boot layout: optional BIOS-boot stub, ESP, OS
/// partition. All offsets in MiB from the start of the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootLayout {
    pub esp_size_mib: u64,

    /// Start of the OS partition (ESP end + 1 MiB alignment reserve).
    pub esp_end_mib: u64,

    /// End of the OS partition; `None` runs to the end of the disk.
    pub os_end_mib: Option<u64>,

    pub os_type: OsPartType,

    /// 4Kn disks cannot host the legacy BIOS-boot stub.
    pub bios_boot: bool,
}

/// Executes:
/// ```shell
/// sgdisk -Z {device}
/// ```
pub fn zap_table(device: &str) -> Result<(), ProviError> {
    shell::exec("sgdisk", &["-Z", device])
}

/// Executes:
/// ```shell
/// wipefs --all --force {device}
/// ```
pub fn wipe_signatures(device: &str) -> Result<(), ProviError> {
    shell::exec("wipefs", &["--all", "--force", device])
}

/// Builds the sgdisk invocation for `layout`:
/// ```shell
/// sgdisk [-a1 -n1:34:2047 -t1:EF02] \
///        -n2:1M:+{esp}M -t2:EF00 \
///        -n3:{esp_end}M:{os_end} -t3:{oscode} {device}
/// ```
pub fn layout_args(device: &str, layout: &BootLayout) -> Vec<String> {
    let mut args = Vec::new();

    if layout.bios_boot {
        // Grub stage2 lives in the gap before the first aligned MiB
        args.extend(
            ["-a1", "-n1:34:2047", "-t1:EF02"]
                .into_iter()
                .map(String::from),
        );
    }

    args.push(format!("-n2:1M:+{}M", layout.esp_size_mib));
    args.push("-t2:EF00".to_string());

    let os_end = match layout.os_end_mib {
        Some(end) => format!("{end}M"),
        None => String::new(),
    };
    args.push(format!("-n3:{}M:{os_end}", layout.esp_end_mib));
    args.push(format!("-t3:{}", layout.os_type.type_code()));

    args.push(device.to_string());

    args
}

pub fn create_layout(
    device: &str,
    layout: &BootLayout,
) -> Result<(), ProviError> {
    let args = layout_args(device, layout);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    shell::exec("sgdisk", &args)
}

/// Executes:
/// ```shell
/// udevadm settle --timeout=10
/// ```
/// so the kernel can observe a new partition table.
pub fn settle() -> Result<(), ProviError> {
    shell::exec("udevadm", &["settle", "--timeout=10"])
}

/// Bounded poll for a freshly created partition node to appear.
pub fn wait_for_partition(path: &str) -> Result<(), ProviError> {
    for _ in 0..50 {
        if file_exists(path) {
            return Ok(());
        }

        thread::sleep(Duration::from_millis(100));
    }

    Err(ProviError::NoSuchDevice(format!(
        "partition {path} did not appear after partitioning"
    )))
}

/// Zeroes the first `count_mib` MiB of a partition to clear stale
/// filesystem signatures:
/// ```shell
/// dd if=/dev/zero of={device} bs=1M count={count_mib}
/// ```
pub fn zero_start(device: &str, count_mib: u64) -> Result<(), ProviError> {
    shell::exec(
        "dd",
        &[
            "if=/dev/zero",
            &format!("of={device}"),
            "bs=1M",
            &format!("count={count_mib}"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_args() {
        struct Test<'a> {
            layout: BootLayout,
            expected: &'a [&'a str],
        }

        let tests = vec![
            Test {
                layout: BootLayout {
                    esp_size_mib: 512,
                    esp_end_mib: 513,
                    os_end_mib: None,
                    os_type: OsPartType::Lvm,
                    bios_boot: true,
                },
                expected: &[
                    "-a1",
                    "-n1:34:2047",
                    "-t1:EF02",
                    "-n2:1M:+512M",
                    "-t2:EF00",
                    "-n3:513M:",
                    "-t3:8E00",
                    "/dev/sda",
                ],
            },
            Test {
                // 4Kn disk: no BIOS-boot stub; clipped OS partition
                layout: BootLayout {
                    esp_size_mib: 1024,
                    esp_end_mib: 1025,
                    os_end_mib: Some(102400),
                    os_type: OsPartType::Zfs,
                    bios_boot: false,
                },
                expected: &[
                    "-n2:1M:+1024M",
                    "-t2:EF00",
                    "-n3:1025M:102400M",
                    "-t3:BF01",
                    "/dev/sda",
                ],
            },
        ];

        for test in tests {
            let result = layout_args("/dev/sda", &test.layout);
            assert_eq!(test.expected, result.as_slice());
        }
    }

    #[test]
    fn test_type_codes() {
        assert_eq!("8E00", OsPartType::Lvm.type_code());
        assert_eq!("BF01", OsPartType::Zfs.type_code());
        assert_eq!("8300", OsPartType::Btrfs.type_code());
    }
}
