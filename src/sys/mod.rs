pub mod blockdev;
pub mod btrfs;
pub mod lvm;
pub mod mkfs;
pub mod mount;
pub mod sgdisk;
pub mod user;
pub mod zfs;

// Kernel partition naming: a trailing digit in the disk name gets a
// 'p' separator (nvme0n1 -> nvme0n1p3, sda -> sda3).
pub(crate) fn partition_name(name: &str, part_number: u32) -> String {
    let last_char = name.chars().last().expect("empty device name");

    if last_char.is_numeric() {
        return format!("{name}p{part_number}");
    }

    format!("{name}{part_number}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::partition_name;

    #[test]
    fn test_partition_name() {
        let tests = HashMap::from([
            (("/dev/nvme0n1", 1u32), "/dev/nvme0n1p1"),
            (("/dev/mmcblk7", 2u32), "/dev/mmcblk7p2"),
            (("/dev/vdb", 10u32), "/dev/vdb10"),
            (("/dev/sda", 3u32), "/dev/sda3"),
        ]);

        for ((device, part_num), expected) in tests {
            let result = partition_name(device, part_num);

            assert_eq!(expected, result.as_str());
        }
    }
}
