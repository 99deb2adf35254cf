pub mod defaults {
    pub const TARGET_DIR: &str = "/target";
    pub const ANSWER_FILE: &str = "./answer.yaml";
    pub const BASE_IMAGE: &str = "/cdrom/base.squashfs";
    pub const PACKAGE_POOL: &str = "/cdrom/packages";
    pub const PACKAGE_CACHE: &str = "var/cache/provi/packages";
    pub const COUNTRY: &str = "us";
    pub const TIMEZONE: &str = "UTC";
    pub const KEYMAP: &str = "en-us";
    pub const MAILTO: &str = "root@localhost";

    const ROOT_PASSWD: &str = "provi";

    pub fn hashed_password(plain: Option<&str>) -> String {
        let plain = plain.unwrap_or(ROOT_PASSWD);

        pwhash::bcrypt::hash(plain)
            .expect("failed to generate bcrypt hashed password")
    }

    #[test]
    fn test_hashed_password() {
        let h = hashed_password(None);
        assert!(pwhash::unix::verify(ROOT_PASSWD, &h));
    }
}

pub const ENV_PROVI_TARGET: &str = "PROVI_TARGET";

/// Prepared run-environment facts, written by the ISO boot scripts.
/// Probed live when the file is absent.
pub const RUN_ENV_FILE: &str = "/run/provi/run-env.json";

/// Kernel cmdline tokens with this prefix override answer-file fields,
/// e.g. `provi.swapsize=4G`.
pub const CMDLINE_PREFIX: &str = "provi.";

// Partitioning policy. All partition math is done in MiB; the kernel
// reports device sizes in 512-byte sectors.
pub const ESP_SIZE_SMALL_MIB: u64 = 512;
pub const ESP_SIZE_LARGE_MIB: u64 = 1024;
pub const ESP_LARGE_DISK_GIB: u64 = 100;
pub const OS_PART_HARD_MIN_MIB: u64 = 2 * 1024;
pub const OS_PART_SOFT_MIN_MIB: u64 = 8 * 1024;
pub const SIGNATURE_WIPE_MIB: u64 = 256;

// Volume allocations are aligned down to 4 MiB boundaries.
pub const ALIGN_KIB: u64 = 4 * 1024;

// Swap sizing policy. Historical tuning constants - see DESIGN.md, do
// not re-derive.
pub const SWAP_MIN_MIB: u64 = 512;
pub const SWAP_MAX_MIB: u64 = 8 * 1024;
pub const SWAP_PER_DISK_GIB_MIB: u64 = 128;

// LVM sizing policy.
pub const VG_NAME: &str = "system";
pub const PV_METADATA_SIZE_KIB: u64 = 250;
pub const VG_CUSHION_MIN_KIB: u64 = 4 * 1024;
pub const VG_CUSHION_MAX_KIB: u64 = 16 * 1024;
pub const VG_CUSHION_PER_GIB_KIB: u64 = 128;
pub const ROOT_SMALL_BREAK_MIB: u64 = 12 * 1024;
pub const ROOT_MID_BREAK_MIB: u64 = 48 * 1024;
pub const ROOT_LARGE_EXTRA_MIB: u64 = 12 * 1024;
pub const DATA_MIN_KIB: u64 = 4 * 1024 * 1024;
pub const THINPOOL_META_MIN_KIB: u64 = 1024 * 1024;
pub const THINPOOL_META_MAX_KIB: u64 = 16 * 1024 * 1024;

// ZFS policy.
pub const ZFS_POOL_NAME: &str = "rpool";
pub const ZFS_ARC_MIN_MIB: u64 = 64;
pub const ZFS_ARC_RESERVED_MIB: u64 = 1024;

// Mirrored/raidz members may differ in size by at most a tenth of the
// reference disk.
pub const RAID_SIZE_TOLERANCE_DIVISOR: u64 = 10;

// Informational pages cycled on the UI during long-running stages.
pub const INFO_PAGES: [&str; 4] = [
    "page-storage",
    "page-virtualization",
    "page-management",
    "page-support",
];
pub const INFO_PAGE_INTERVAL_SECS: u64 = 15;

// Use programs instead of bindings to avoid API dependencies
pub const REQUIRED_COMMANDS: [&str; 16] = [
    "sgdisk",
    "blkid",
    "wipefs",
    "dd",
    "udevadm",
    "pvcreate",
    "vgcreate",
    "vgrename",
    "vgs",
    "lvcreate",
    "lvconvert",
    "mkswap",
    "mount",
    "umount",
    "chroot",
    "chpasswd",
];
