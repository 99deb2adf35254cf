use std::fmt;
use std::str::FromStr;

use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};

use crate::errors::ProviError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZfsRaidLevel {
    Raid0,
    Raid1,
    Raid10,
    RaidZ,
    RaidZ2,
    RaidZ3,
}

impl ZfsRaidLevel {
    pub fn min_disks(&self) -> usize {
        match self {
            ZfsRaidLevel::Raid0 => 1,
            ZfsRaidLevel::Raid1 => 2,
            ZfsRaidLevel::Raid10 => 4,
            ZfsRaidLevel::RaidZ => 3,
            ZfsRaidLevel::RaidZ2 => 4,
            ZfsRaidLevel::RaidZ3 => 5,
        }
    }
}

impl fmt::Display for ZfsRaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            ZfsRaidLevel::Raid0 => "RAID0",
            ZfsRaidLevel::Raid1 => "RAID1",
            ZfsRaidLevel::Raid10 => "RAID10",
            ZfsRaidLevel::RaidZ => "RAIDZ-1",
            ZfsRaidLevel::RaidZ2 => "RAIDZ-2",
            ZfsRaidLevel::RaidZ3 => "RAIDZ-3",
        };

        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtrfsRaidLevel {
    Raid0,
    Raid1,
    Raid10,
}

impl BtrfsRaidLevel {
    pub fn min_disks(&self) -> usize {
        match self {
            BtrfsRaidLevel::Raid0 => 1,
            BtrfsRaidLevel::Raid1 => 2,
            BtrfsRaidLevel::Raid10 => 4,
        }
    }

    /// Profile string as `mkfs.btrfs -d/-m` expects it.
    pub fn profile(&self) -> &'static str {
        match self {
            BtrfsRaidLevel::Raid0 => "raid0",
            BtrfsRaidLevel::Raid1 => "raid1",
            BtrfsRaidLevel::Raid10 => "raid10",
        }
    }
}

impl fmt::Display for BtrfsRaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            BtrfsRaidLevel::Raid0 => "RAID0",
            BtrfsRaidLevel::Raid1 => "RAID1",
            BtrfsRaidLevel::Raid10 => "RAID10",
        })
    }
}

/// The root-storage backend, validated when the config is merged so the
/// provisioning path never sees an unknown label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    Ext4,
    Xfs,
    Zfs(ZfsRaidLevel),
    Btrfs(BtrfsRaidLevel),
}

impl FsType {
    /// True if the filesystem sits on top of LVM (ext4, XFS).
    pub fn is_lvm(&self) -> bool {
        matches!(self, FsType::Ext4 | FsType::Xfs)
    }

    pub fn min_disks(&self) -> usize {
        match self {
            FsType::Ext4 | FsType::Xfs => 1,
            FsType::Zfs(level) => level.min_disks(),
            FsType::Btrfs(level) => level.min_disks(),
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsType::Ext4 => write!(f, "ext4"),
            FsType::Xfs => write!(f, "xfs"),
            FsType::Zfs(level) => write!(f, "zfs ({level})"),
            FsType::Btrfs(level) => write!(f, "btrfs ({level})"),
        }
    }
}

impl FromStr for FsType {
    type Err = ProviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ext4" => Ok(FsType::Ext4),
            "xfs" => Ok(FsType::Xfs),
            "zfs (RAID0)" => Ok(FsType::Zfs(ZfsRaidLevel::Raid0)),
            "zfs (RAID1)" => Ok(FsType::Zfs(ZfsRaidLevel::Raid1)),
            "zfs (RAID10)" => Ok(FsType::Zfs(ZfsRaidLevel::Raid10)),
            "zfs (RAIDZ-1)" => Ok(FsType::Zfs(ZfsRaidLevel::RaidZ)),
            "zfs (RAIDZ-2)" => Ok(FsType::Zfs(ZfsRaidLevel::RaidZ2)),
            "zfs (RAIDZ-3)" => Ok(FsType::Zfs(ZfsRaidLevel::RaidZ3)),
            "btrfs (RAID0)" => Ok(FsType::Btrfs(BtrfsRaidLevel::Raid0)),
            "btrfs (RAID1)" => Ok(FsType::Btrfs(BtrfsRaidLevel::Raid1)),
            "btrfs (RAID10)" => Ok(FsType::Btrfs(BtrfsRaidLevel::Raid10)),
            unknown => Err(ProviError::BadConfig(format!(
                "unknown filesystem: {unknown}"
            ))),
        }
    }
}

impl Serialize for FsType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FsType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ZfsCompressOption {
    #[default]
    On,
    Off,
    Lzjb,
    Lz4,
    Zle,
    Gzip,
    Zstd,
}

impl ZfsCompressOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZfsCompressOption::On => "on",
            ZfsCompressOption::Off => "off",
            ZfsCompressOption::Lzjb => "lzjb",
            ZfsCompressOption::Lz4 => "lz4",
            ZfsCompressOption::Zle => "zle",
            ZfsCompressOption::Gzip => "gzip",
            ZfsCompressOption::Zstd => "zstd",
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ZfsChecksumOption {
    #[default]
    On,
    Fletcher4,
    Sha256,
}

impl ZfsChecksumOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZfsChecksumOption::On => "on",
            ZfsChecksumOption::Fletcher4 => "fletcher4",
            ZfsChecksumOption::Sha256 => "sha256",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZfsOptions {
    #[serde(default = "default_ashift")]
    pub ashift: usize,

    #[serde(default)]
    pub compress: ZfsCompressOption,

    #[serde(default)]
    pub checksum: ZfsChecksumOption,

    #[serde(default = "default_copies")]
    pub copies: usize,

    /// Requested ARC cap in MiB; 0 means "leave the ZFS default".
    #[serde(default, alias = "arc_max")]
    pub arc_max_mib: u64,
}

impl Default for ZfsOptions {
    fn default() -> Self {
        ZfsOptions {
            ashift: default_ashift(),
            compress: ZfsCompressOption::default(),
            checksum: ZfsChecksumOption::default(),
            copies: default_copies(),
            arc_max_mib: 0,
        }
    }
}

fn default_ashift() -> usize {
    12
}

fn default_copies() -> usize {
    1
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BtrfsCompressOption {
    On,
    #[default]
    Off,
    Zlib,
    Lzo,
    Zstd,
}

impl BtrfsCompressOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            BtrfsCompressOption::On => "on",
            BtrfsCompressOption::Off => "off",
            BtrfsCompressOption::Zlib => "zlib",
            BtrfsCompressOption::Lzo => "lzo",
            BtrfsCompressOption::Zstd => "zstd",
        }
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(deny_unknown_fields)]
pub struct BtrfsOptions {
    #[serde(default)]
    pub compress: BtrfsCompressOption,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fstype_labels() {
        struct Test<'a> {
            label: &'a str,
            expected: FsType,
        }

        let tests = vec![
            Test {
                label: "ext4",
                expected: FsType::Ext4,
            },
            Test {
                label: "xfs",
                expected: FsType::Xfs,
            },
            Test {
                label: "zfs (RAID10)",
                expected: FsType::Zfs(ZfsRaidLevel::Raid10),
            },
            Test {
                label: "zfs (RAIDZ-3)",
                expected: FsType::Zfs(ZfsRaidLevel::RaidZ3),
            },
            Test {
                label: "btrfs (RAID1)",
                expected: FsType::Btrfs(BtrfsRaidLevel::Raid1),
            },
        ];

        for test in tests {
            let parsed: FsType = test.label.parse().unwrap();
            assert_eq!(test.expected, parsed);

            // Display must round-trip through FromStr
            assert_eq!(test.label, parsed.to_string());
        }

        assert!("zfs (RAID7)".parse::<FsType>().is_err());
        assert!("ext3".parse::<FsType>().is_err());
    }

    #[test]
    fn test_min_disks() {
        assert_eq!(1, FsType::Ext4.min_disks());
        assert_eq!(4, FsType::Zfs(ZfsRaidLevel::Raid10).min_disks());
        assert_eq!(5, FsType::Zfs(ZfsRaidLevel::RaidZ3).min_disks());
        assert_eq!(2, FsType::Btrfs(BtrfsRaidLevel::Raid1).min_disks());
    }

    #[test]
    fn test_zfs_options_defaults() {
        let opts: ZfsOptions = serde_yaml::from_str("{}").unwrap();
        assert_eq!(12, opts.ashift);
        assert_eq!(ZfsCompressOption::On, opts.compress);
        assert_eq!(ZfsChecksumOption::On, opts.checksum);
        assert_eq!(1, opts.copies);
        assert_eq!(0, opts.arc_max_mib);
    }
}
