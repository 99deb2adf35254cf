use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

/// Immutable snapshot of a candidate target disk, built once per run by
/// the inventory scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    /// Position in the inventory's ordered scan result.
    pub ordinal: usize,

    /// Device node, e.g. `/dev/sda`.
    pub path: String,

    /// Size in 512-byte sectors, as the kernel reports it regardless of
    /// the device's own logical sector size.
    pub size_sectors: u64,

    /// Hardware model string, truncated to 30 characters.
    pub model: String,

    /// 512 or 4096 (4Kn).
    pub logical_block_size: u32,

    /// The device's directory under `/sys/block`.
    pub sys_path: String,
}

impl BlockDevice {
    pub fn size_kib(&self) -> u64 {
        self.size_sectors / 2
    }

    pub fn size_gib(&self) -> f64 {
        self.size_sectors as f64 / 2048.0 / 1024.0
    }

    pub fn is_4kn(&self) -> bool {
        self.logical_block_size == 4096
    }

    #[cfg(test)]
    pub fn dummy(ordinal: usize) -> Self {
        Self::dummy_sized(ordinal, 8 * 2048 * 1024)
    }

    #[cfg(test)]
    pub fn dummy_sized(ordinal: usize, size_sectors: u64) -> Self {
        BlockDevice {
            ordinal,
            path: format!("/dev/dummy{ordinal}"),
            size_sectors,
            model: "Dummy disk".to_string(),
            logical_block_size: 512,
            sys_path: format!("/sys/block/dummy{ordinal}"),
        }
    }
}

impl fmt::Display for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if !self.model.is_empty() {
            write!(f, " ({})", self.model)?;
        }

        write!(f, " ({:.2} GiB)", self.size_gib())
    }
}

/// Per-physical-disk boot record produced by the partitioner and
/// consumed by the bootloader-install stage. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootDeviceInfo {
    pub devname: String,
    pub os_partition: String,
    pub esp_partition: Option<String>,

    /// Stable `/dev/disk/by-id` path for the whole disk, when one
    /// could be resolved.
    pub by_id: Option<String>,

    pub logical_block_size: u32,
}

/// LVM volume layout derived from the sizing policy. Created once,
/// immediately formatted and mounted, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    pub root_device: String,
    pub swap_device: Option<String>,
    pub data_device: Option<String>,
}
