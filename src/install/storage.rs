use crate::config::storage::{
    BtrfsCompressOption,
    BtrfsRaidLevel,
    FsType,
    ZfsChecksumOption,
    ZfsCompressOption,
    ZfsRaidLevel,
};
use crate::config::InstallConfig;
use crate::constants::*;
use crate::entity::blockdev::{
    BlockDevice,
    BootDeviceInfo,
    VolumeLayout,
};
use crate::env::{
    BootType,
    RunEnv,
};
use crate::errors::ProviError;
use crate::sys::{
    btrfs,
    lvm,
    mkfs,
    zfs,
};
use crate::ui::progress::{
    Progress,
    Window,
};

use super::partition::PartitionedDisk;
use super::sizing;

/// What the storage stage built, consumed by the mount, fstab and
/// bootloader stages.
#[derive(Debug, Clone)]
pub struct StorageResult {
    pub root: RootStorage,
    pub boot_devices: Vec<BootDeviceInfo>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum RootStorage {
    Lvm {
        volumes: VolumeLayout,
        fs: &'static str,
    },
    Zfs {
        pool: String,
        root_dataset: String,
    },
    Btrfs {
        device: String,
        compress: BtrfsCompressOption,
    },
}

/// Validates the selected disks against the chosen backend before
/// anything destructive happens.
pub fn check_disks(
    disks: &[BlockDevice],
    fstype: FsType,
    boot_type: BootType,
) -> Result<(), ProviError> {
    for (i, disk) in disks.iter().enumerate() {
        if disks[..i].iter().any(|d| d.path == disk.path) {
            return Err(ProviError::BadConfig(format!(
                "disk {} selected more than once",
                disk.path
            )));
        }
    }

    if disks.len() < fstype.min_disks() {
        return Err(ProviError::DiskUnsuitable(format!(
            "{fstype} needs at least {} disks, {} selected",
            fstype.min_disks(),
            disks.len()
        )));
    }

    if fstype.is_lvm() && disks.len() > 1 {
        return Err(ProviError::BadConfig(format!(
            "{fstype} installs onto a single disk, {} selected",
            disks.len()
        )));
    }

    if let FsType::Zfs(ZfsRaidLevel::Raid10) = fstype {
        if disks.len() % 2 != 0 {
            return Err(ProviError::DiskUnsuitable(format!(
                "RAID10 needs an even number of disks, {} selected",
                disks.len()
            )));
        }
    }

    if boot_type == BootType::Bios {
        if let Some(disk) = disks.iter().find(|d| d.is_4kn()) {
            return Err(ProviError::DiskUnsuitable(format!(
                "{disk} has 4K native sectors, which legacy BIOS \
                 cannot boot from"
            )));
        }
    }

    check_raid_sizes(disks, fstype)
}

// Redundant members must be roughly the same size or the smallest one
// dictates the usable capacity; a tenth of the reference disk is the
// accepted spread.
fn check_raid_sizes(
    disks: &[BlockDevice],
    fstype: FsType,
) -> Result<(), ProviError> {
    let redundant = match fstype {
        FsType::Zfs(level) => level != ZfsRaidLevel::Raid0,
        FsType::Btrfs(level) => level.min_disks() > 1,
        _ => false,
    };
    if !redundant {
        return Ok(());
    }

    // A RAID10 mirror only spans its own pair, so only members of the
    // same pair must match in size
    if matches!(
        fstype,
        FsType::Zfs(ZfsRaidLevel::Raid10) | FsType::Btrfs(BtrfsRaidLevel::Raid10)
    ) {
        for pair in disks.chunks_exact(2) {
            check_size_spread(&pair[0], &pair[1], fstype)?;
        }

        return Ok(());
    }

    let reference = &disks[0];
    for disk in &disks[1..] {
        check_size_spread(reference, disk, fstype)?;
    }

    Ok(())
}

fn check_size_spread(
    reference: &BlockDevice,
    disk: &BlockDevice,
    fstype: FsType,
) -> Result<(), ProviError> {
    let tolerance = reference.size_sectors / RAID_SIZE_TOLERANCE_DIVISOR;
    let diff = disk.size_sectors.abs_diff(reference.size_sectors);

    if diff > tolerance {
        return Err(ProviError::DiskUnsuitable(format!(
            "{disk} differs too much in size from {reference} \
             for a redundant {fstype} setup"
        )));
    }

    Ok(())
}

/// Builds the `zpool create` vdev arguments for `devices` at the given
/// redundancy level. RAID10 pairs devices in selection order.
pub fn zfs_vdev_args(devices: &[String], level: ZfsRaidLevel) -> Vec<String> {
    let mut args = Vec::new();

    match level {
        ZfsRaidLevel::Raid0 => {
            args.extend(devices.iter().cloned());
        }
        ZfsRaidLevel::Raid1 => {
            args.push("mirror".to_string());
            args.extend(devices.iter().cloned());
        }
        ZfsRaidLevel::Raid10 => {
            for pair in devices.chunks(2) {
                args.push("mirror".to_string());
                args.extend(pair.iter().cloned());
            }
        }
        ZfsRaidLevel::RaidZ => {
            args.push("raidz1".to_string());
            args.extend(devices.iter().cloned());
        }
        ZfsRaidLevel::RaidZ2 => {
            args.push("raidz2".to_string());
            args.extend(devices.iter().cloned());
        }
        ZfsRaidLevel::RaidZ3 => {
            args.push("raidz3".to_string());
            args.extend(devices.iter().cloned());
        }
    }

    args
}

/// Creates the root storage on the freshly partitioned disks. A ZFS
/// root comes back already mounted at `target` through the pool's
/// altroot.
pub fn create_storage(
    parts: &[PartitionedDisk],
    config: &InstallConfig,
    env: &RunEnv,
    target: &str,
    progress: &mut Progress,
    window: &Window,
) -> Result<StorageResult, ProviError> {
    let boot_devices: Vec<BootDeviceInfo> =
        parts.iter().map(|p| p.boot.clone()).collect();

    let mut warnings = Vec::new();

    let root = match config.fstype {
        FsType::Ext4 | FsType::Xfs => {
            setup_lvm(&parts[0], config, env, progress, window, &mut warnings)?
        }
        FsType::Zfs(level) => {
            setup_zfs(parts, level, config, target, progress, window)?
        }
        FsType::Btrfs(level) => {
            progress.update(window, 0.2, "creating btrfs filesystem");

            let devices: Vec<String> =
                parts.iter().map(|p| p.os_partition.clone()).collect();

            // A lone disk gets the plain single profile, whatever the
            // configured level says
            let profile = if devices.len() == 1 {
                "single"
            } else {
                level.profile()
            };
            btrfs::create_fs(profile, &devices)?;

            RootStorage::Btrfs {
                device: parts[0].os_partition.clone(),
                compress: config.btrfs_opts.compress,
            }
        }
    };

    // ESPs are formatted on every disk so each one stays bootable
    for (i, boot) in boot_devices.iter().enumerate() {
        if let Some(esp) = &boot.esp_partition {
            progress.update(
                window,
                0.8 + 0.2 * (i as f64 / boot_devices.len() as f64),
                &format!("formatting EFI system partition on {}", boot.devname),
            );
            mkfs::create_esp(esp)?;
        }
    }

    Ok(StorageResult {
        root,
        boot_devices,
        warnings,
    })
}

fn setup_lvm(
    part: &PartitionedDisk,
    config: &InstallConfig,
    env: &RunEnv,
    progress: &mut Progress,
    window: &Window,
    warnings: &mut Vec<String>,
) -> Result<RootStorage, ProviError> {
    resolve_vg_name_clash(progress.ui())?;

    progress.update(window, 0.1, "creating LVM volume group");
    lvm::create_pv(&part.os_partition)?;
    lvm::create_vg(VG_NAME, &part.os_partition)?;

    let os_kib = part.os_size_sectors / 2;
    let swap_kib = sizing::compute_swap_size_kib(
        config.swapsize,
        env.total_memory_mib,
        os_kib,
    );
    let sizes = sizing::compute_lvm_sizes(
        os_kib,
        swap_kib,
        config.product.separates_guest_storage(),
        config.maxroot,
        config.maxvz,
        config.minfree,
    );

    progress.update(window, 0.3, "creating logical volumes");
    if swap_kib > 0 {
        lvm::create_lv(VG_NAME, "swap", swap_kib)?;
    }
    lvm::create_lv(VG_NAME, "root", sizes.root_kib)?;

    if let Some((data_kib, meta_kib)) = sizes.data_kib {
        lvm::create_lv(VG_NAME, "data", data_kib)?;
        lvm::convert_to_thin_pool(VG_NAME, "data", meta_kib)?;
    } else if sizes.data_skipped {
        warnings.push(
            "disk too small for a guest-data volume, none was created"
                .to_string(),
        );
    }

    let fs = match config.fstype {
        FsType::Xfs => "xfs",
        _ => "ext4",
    };

    let root_device = format!("/dev/{VG_NAME}/root");
    let swap_device = format!("/dev/{VG_NAME}/swap");

    progress.update(window, 0.5, &format!("creating {fs} root filesystem"));
    mkfs::create_fs(fs, &root_device)?;
    if swap_kib > 0 {
        mkfs::create_swap(&swap_device)?;
    }

    Ok(RootStorage::Lvm {
        volumes: VolumeLayout {
            root_device,
            swap_device: (swap_kib > 0).then(|| swap_device.clone()),
            data_device: sizes
                .data_kib
                .map(|_| format!("/dev/{VG_NAME}/data")),
        },
        fs,
    })
}

// A volume group named like ours, usually from a previous install on
// another disk, would collide on first boot. Offer to rename it out of
// the way; declining aborts the run.
fn resolve_vg_name_clash(
    ui: &mut dyn crate::ui::Ui,
) -> Result<(), ProviError> {
    let existing = lvm::list_vg_names()?;
    if !existing.iter().any(|name| name == VG_NAME) {
        return Ok(());
    }

    let mut renamed = format!("{VG_NAME}-old");
    let mut n = 1;
    while existing.contains(&renamed) {
        renamed = format!("{VG_NAME}-old{n}");
        n += 1;
    }

    if !ui.prompt(&format!(
        "A volume group '{VG_NAME}' already exists. Rename it to \
         '{renamed}' and continue?"
    )) {
        return Err(ProviError::Aborted);
    }

    lvm::rename_vg(VG_NAME, &renamed)
}

fn setup_zfs(
    parts: &[PartitionedDisk],
    level: ZfsRaidLevel,
    config: &InstallConfig,
    target: &str,
    progress: &mut Progress,
    window: &Window,
) -> Result<RootStorage, ProviError> {
    let devices: Vec<String> =
        parts.iter().map(zfs_member_device).collect();

    progress.update(window, 0.1, "creating ZFS pool");
    let vdevs = zfs_vdev_args(&devices, level);
    zfs::create_pool(ZFS_POOL_NAME, config.zfs_opts.ashift, target, &vdevs)?;

    progress.update(window, 0.4, "creating ZFS datasets");
    let root_dataset = format!(
        "{ZFS_POOL_NAME}/ROOT/{}",
        config.product.root_dataset()
    );
    zfs::create_dataset(&format!("{ZFS_POOL_NAME}/ROOT"))?;
    zfs::create_dataset(&root_dataset)?;

    // The altroot scopes this under the target for now; on the
    // installed system it is the real root
    zfs::set_mountpoint(&root_dataset, "/")?;

    if config.product.separates_guest_storage() {
        zfs::create_dataset(&format!("{ZFS_POOL_NAME}/data"))?;
    }

    let opts = &config.zfs_opts;
    if opts.compress != ZfsCompressOption::Off {
        zfs::set_prop(ZFS_POOL_NAME, "compression", opts.compress.as_str())?;
    }
    if opts.checksum != ZfsChecksumOption::On {
        zfs::set_prop(ZFS_POOL_NAME, "checksum", opts.checksum.as_str())?;
    }
    if opts.copies != 1 {
        zfs::set_prop(ZFS_POOL_NAME, "copies", &opts.copies.to_string())?;
    }
    zfs::set_prop(ZFS_POOL_NAME, "atime", "on")?;
    zfs::set_prop(ZFS_POOL_NAME, "relatime", "on")?;

    // Async-only while we extract; restored before export
    zfs::set_prop(ZFS_POOL_NAME, "sync", "disabled")?;

    Ok(RootStorage::Zfs {
        pool: ZFS_POOL_NAME.to_string(),
        root_dataset,
    })
}

// Pool members go in by their stable by-id alias when one exists, so
// the pool survives device renumbering.
fn zfs_member_device(part: &PartitionedDisk) -> String {
    match &part.boot.by_id {
        Some(by_id) => format!("{by_id}-part3"),
        None => part.os_partition.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::storage::BtrfsRaidLevel;

    const GIB_SECTORS: u64 = 2048 * 1024;

    fn disks(n: usize) -> Vec<BlockDevice> {
        (0..n).map(BlockDevice::dummy).collect()
    }

    #[test]
    fn test_check_duplicate_selection() {
        let mut selected = disks(2);
        selected[1].path = selected[0].path.clone();

        assert!(matches!(
            check_disks(&selected, FsType::Zfs(ZfsRaidLevel::Raid1), BootType::Efi),
            Err(ProviError::BadConfig(_))
        ));
    }

    #[test]
    fn test_check_min_disks() {
        assert!(check_disks(
            &disks(2),
            FsType::Zfs(ZfsRaidLevel::Raid1),
            BootType::Efi
        )
        .is_ok());

        assert!(matches!(
            check_disks(&disks(3), FsType::Zfs(ZfsRaidLevel::Raid10), BootType::Efi),
            Err(ProviError::DiskUnsuitable(_))
        ));

        assert!(matches!(
            check_disks(&disks(2), FsType::Ext4, BootType::Efi),
            Err(ProviError::BadConfig(_))
        ));
    }

    #[test]
    fn test_check_raid10_even_count() {
        // 6 disks is fine, 5 is not even though it exceeds the minimum
        assert!(check_disks(
            &disks(6),
            FsType::Zfs(ZfsRaidLevel::Raid10),
            BootType::Efi
        )
        .is_ok());

        assert!(check_disks(
            &disks(5),
            FsType::Zfs(ZfsRaidLevel::Raid10),
            BootType::Efi
        )
        .is_err());
    }

    #[test]
    fn test_check_4kn_bios() {
        let mut selected = disks(1);
        selected[0].logical_block_size = 4096;

        assert!(matches!(
            check_disks(&selected, FsType::Ext4, BootType::Bios),
            Err(ProviError::DiskUnsuitable(_))
        ));

        // EFI boots 4Kn just fine
        assert!(check_disks(&selected, FsType::Ext4, BootType::Efi).is_ok());
    }

    #[test]
    fn test_check_raid_size_tolerance() {
        // 100 GiB reference tolerates members within 10 GiB
        let selected = vec![
            BlockDevice::dummy_sized(0, 100 * GIB_SECTORS),
            BlockDevice::dummy_sized(1, 108 * GIB_SECTORS),
        ];
        assert!(check_disks(
            &selected,
            FsType::Zfs(ZfsRaidLevel::Raid1),
            BootType::Efi
        )
        .is_ok());

        let selected = vec![
            BlockDevice::dummy_sized(0, 100 * GIB_SECTORS),
            BlockDevice::dummy_sized(1, 80 * GIB_SECTORS),
        ];
        assert!(check_disks(
            &selected,
            FsType::Zfs(ZfsRaidLevel::Raid1),
            BootType::Efi
        )
        .is_err());

        // striped setups take any mix of sizes
        assert!(check_disks(
            &selected[..1],
            FsType::Zfs(ZfsRaidLevel::Raid0),
            BootType::Efi
        )
        .is_ok());
    }

    #[test]
    fn test_check_raid10_sizes_per_pair() {
        // Two internally matched pairs of different sizes are a valid
        // RAID10 layout
        let selected = vec![
            BlockDevice::dummy_sized(0, 100 * GIB_SECTORS),
            BlockDevice::dummy_sized(1, 100 * GIB_SECTORS),
            BlockDevice::dummy_sized(2, 200 * GIB_SECTORS),
            BlockDevice::dummy_sized(3, 200 * GIB_SECTORS),
        ];
        assert!(check_disks(
            &selected,
            FsType::Zfs(ZfsRaidLevel::Raid10),
            BootType::Efi
        )
        .is_ok());

        // A mismatch within a pair is still rejected
        let selected = vec![
            BlockDevice::dummy_sized(0, 100 * GIB_SECTORS),
            BlockDevice::dummy_sized(1, 150 * GIB_SECTORS),
            BlockDevice::dummy_sized(2, 200 * GIB_SECTORS),
            BlockDevice::dummy_sized(3, 200 * GIB_SECTORS),
        ];
        assert!(matches!(
            check_disks(
                &selected,
                FsType::Zfs(ZfsRaidLevel::Raid10),
                BootType::Efi
            ),
            Err(ProviError::DiskUnsuitable(_))
        ));
    }

    #[test]
    fn test_zfs_vdev_args() {
        struct Test<'a> {
            level: ZfsRaidLevel,
            devices: &'a [&'a str],
            expected: &'a [&'a str],
        }

        let tests = vec![
            Test {
                level: ZfsRaidLevel::Raid0,
                devices: &["a", "b"],
                expected: &["a", "b"],
            },
            Test {
                level: ZfsRaidLevel::Raid1,
                devices: &["a", "b", "c"],
                expected: &["mirror", "a", "b", "c"],
            },
            // RAID10 pairs members in selection order
            Test {
                level: ZfsRaidLevel::Raid10,
                devices: &["a", "b", "c", "d"],
                expected: &["mirror", "a", "b", "mirror", "c", "d"],
            },
            Test {
                level: ZfsRaidLevel::RaidZ,
                devices: &["a", "b", "c"],
                expected: &["raidz1", "a", "b", "c"],
            },
            Test {
                level: ZfsRaidLevel::RaidZ3,
                devices: &["a", "b", "c", "d", "e"],
                expected: &["raidz3", "a", "b", "c", "d", "e"],
            },
        ];

        for test in tests {
            let devices: Vec<String> =
                test.devices.iter().map(|d| d.to_string()).collect();

            let args = zfs_vdev_args(&devices, test.level);
            assert_eq!(test.expected, args.as_slice(), "{}", test.level);
        }
    }

    #[test]
    fn test_btrfs_profile_strings() {
        assert_eq!("raid10", BtrfsRaidLevel::Raid10.profile());
    }
}
