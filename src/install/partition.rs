use crate::constants::*;
use crate::entity::blockdev::{
    BlockDevice,
    BootDeviceInfo,
};
use crate::errors::ProviError;
use crate::sys::blockdev::resolve_by_id;
use crate::sys::partition_name;
use crate::sys::sgdisk::{
    self,
    BootLayout,
    OsPartType,
};

/// A plan produced by [`plan_bootable_layout`]: the GPT layout to
/// create plus whether the disk is small enough to warrant an explicit
/// confirmation before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub layout: BootLayout,

    /// Size of the OS partition in 512-byte sectors.
    pub os_size_sectors: u64,

    /// Below the soft minimum; the hard minimum already errored out.
    pub needs_confirm: bool,
}

/// Plans the boot layout for one disk: optional BIOS-boot stub, ESP
/// sized by disk capacity, OS partition taking the rest (clipped by
/// `hdsize` when set).
pub fn plan_bootable_layout(
    disk: &BlockDevice,
    hdsize_gib: Option<f64>,
    os_type: OsPartType,
) -> Result<PartitionPlan, ProviError> {
    let disk_mib = disk.size_kib() / 1024;

    let mut usable_mib = disk_mib;
    if let Some(gib) = hdsize_gib {
        let cap_mib = (gib * 1024.0) as u64;
        usable_mib = usable_mib.min(cap_mib);
    }

    // The ESP is sized by what the device holds, not by how much of
    // it the hdsize override lets the OS use
    let esp_size_mib = if disk_mib > ESP_LARGE_DISK_GIB * 1024 {
        ESP_SIZE_LARGE_MIB
    } else {
        ESP_SIZE_SMALL_MIB
    };
    let esp_end_mib = 1 + esp_size_mib;

    let os_size_mib = usable_mib.saturating_sub(esp_end_mib);
    if os_size_mib < OS_PART_HARD_MIN_MIB {
        return Err(ProviError::DiskUnsuitable(format!(
            "{disk}: only {os_size_mib} MiB left for the OS partition, \
             need at least {OS_PART_HARD_MIN_MIB} MiB"
        )));
    }

    let layout = BootLayout {
        esp_size_mib,
        esp_end_mib,
        // Only clip the OS partition when hdsize actually bites
        os_end_mib: (usable_mib < disk_mib).then_some(usable_mib),
        os_type,
        // The legacy boot stub assumes 512-byte sectors
        bios_boot: !disk.is_4kn(),
    };

    Ok(PartitionPlan {
        layout,
        os_size_sectors: os_size_mib * 2048,
        needs_confirm: os_size_mib < OS_PART_SOFT_MIN_MIB,
    })
}

/// One freshly partitioned disk, ready for filesystem or pool
/// creation.
#[derive(Debug, Clone)]
pub struct PartitionedDisk {
    pub disk: BlockDevice,
    pub os_partition: String,
    pub os_size_sectors: u64,
    pub boot: BootDeviceInfo,
}

/// Writes the planned GPT to `disk` and waits for the kernel to expose
/// the new partition nodes. The start of the OS partition is zeroed so
/// stale filesystem and RAID signatures cannot resurface.
pub fn partition_bootable(
    disk: &BlockDevice,
    plan: &PartitionPlan,
) -> Result<PartitionedDisk, ProviError> {
    sgdisk::zap_table(&disk.path)?;
    sgdisk::create_layout(&disk.path, &plan.layout)?;
    sgdisk::settle()?;

    let esp_partition = partition_name(&disk.path, 2);
    let os_partition = partition_name(&disk.path, 3);
    sgdisk::wait_for_partition(&os_partition)?;

    // Stale signatures on either partition could confuse later format
    // and detection steps
    let wipe_mib = SIGNATURE_WIPE_MIB.min(plan.os_size_sectors / 2048);
    sgdisk::zero_start(&os_partition, wipe_mib)?;
    sgdisk::zero_start(
        &esp_partition,
        SIGNATURE_WIPE_MIB.min(plan.layout.esp_size_mib),
    )?;

    Ok(PartitionedDisk {
        disk: disk.clone(),
        os_partition: os_partition.clone(),
        os_size_sectors: plan.os_size_sectors,
        boot: BootDeviceInfo {
            devname: disk.path.clone(),
            os_partition,
            esp_partition: Some(esp_partition),
            by_id: resolve_by_id(&disk.path),
            logical_block_size: disk.logical_block_size,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB_SECTORS: u64 = 2048 * 1024;

    #[test]
    fn test_plan_small_disk() {
        let disk = BlockDevice::dummy_sized(0, 32 * GIB_SECTORS);
        let plan = plan_bootable_layout(&disk, None, OsPartType::Lvm).unwrap();

        assert_eq!(512, plan.layout.esp_size_mib);
        assert_eq!(513, plan.layout.esp_end_mib);
        assert_eq!(None, plan.layout.os_end_mib);
        assert!(plan.layout.bios_boot);
        assert!(!plan.needs_confirm);
        assert_eq!((32 * 1024 - 513) * 2048, plan.os_size_sectors);
    }

    #[test]
    fn test_plan_large_disk_gets_big_esp() {
        let disk = BlockDevice::dummy_sized(0, 200 * GIB_SECTORS);
        let plan = plan_bootable_layout(&disk, None, OsPartType::Zfs).unwrap();

        assert_eq!(1024, plan.layout.esp_size_mib);
        assert_eq!(1025, plan.layout.esp_end_mib);
        assert_eq!(OsPartType::Zfs, plan.layout.os_type);
    }

    #[test]
    fn test_plan_hdsize_clips() {
        let disk = BlockDevice::dummy_sized(0, 200 * GIB_SECTORS);
        let plan =
            plan_bootable_layout(&disk, Some(50.0), OsPartType::Lvm).unwrap();

        // the clip shrinks the OS partition but the ESP still follows
        // the 200 GiB device
        assert_eq!(1024, plan.layout.esp_size_mib);
        assert_eq!(Some(50 * 1024), plan.layout.os_end_mib);
        assert_eq!((50 * 1024 - 1025) * 2048, plan.os_size_sectors);

        // hdsize larger than the disk changes nothing
        let plan =
            plan_bootable_layout(&disk, Some(500.0), OsPartType::Lvm).unwrap();
        assert_eq!(None, plan.layout.os_end_mib);
    }

    #[test]
    fn test_plan_4kn_disk_skips_bios_boot() {
        let mut disk = BlockDevice::dummy_sized(0, 32 * GIB_SECTORS);
        disk.logical_block_size = 4096;

        let plan = plan_bootable_layout(&disk, None, OsPartType::Lvm).unwrap();
        assert!(!plan.layout.bios_boot);
    }

    #[test]
    fn test_plan_minimum_sizes() {
        // 2 GiB of OS partition is the hard floor
        let disk = BlockDevice::dummy_sized(0, 2 * GIB_SECTORS);
        assert!(matches!(
            plan_bootable_layout(&disk, None, OsPartType::Lvm),
            Err(ProviError::DiskUnsuitable(_))
        ));

        // enough for the floor but below the 8 GiB soft minimum
        let disk = BlockDevice::dummy_sized(0, 4 * GIB_SECTORS);
        let plan = plan_bootable_layout(&disk, None, OsPartType::Lvm).unwrap();
        assert!(plan.needs_confirm);

        let disk = BlockDevice::dummy_sized(0, 9 * GIB_SECTORS);
        let plan = plan_bootable_layout(&disk, None, OsPartType::Lvm).unwrap();
        assert!(!plan.needs_confirm);
    }
}
