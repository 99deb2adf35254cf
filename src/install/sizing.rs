use crate::constants::*;

/// Aligns a KiB size down to a 4 MiB boundary.
pub fn align_down_kib(kib: u64) -> u64 {
    kib - (kib % ALIGN_KIB)
}

fn align_up_kib(kib: u64) -> u64 {
    kib.div_ceil(ALIGN_KIB) * ALIGN_KIB
}

/// Default swap size derived from total RAM, bounded by the disk.
///
/// The floors and caps are historical tuning constants; an explicit
/// override always wins, whatever RAM or disk say. The small-disk rule
/// makes the default non-monotonic in RAM right at the 2 GiB boundary
/// on disks of 16 GiB or less.
pub fn compute_swap_size_kib(
    override_mib: Option<u64>,
    total_memory_mib: u64,
    os_size_kib: u64,
) -> u64 {
    if let Some(mib) = override_mib {
        return mib * 1024;
    }

    let hd_gib = os_size_kib / (1024 * 1024);

    let mut swap_mib = total_memory_mib;
    if swap_mib < 4096 && hd_gib >= 64 {
        swap_mib = 4096;
    }
    if swap_mib < 2048 && hd_gib >= 32 {
        swap_mib = 2048;
    }
    if swap_mib >= 2048 && hd_gib <= 16 {
        swap_mib = 1024;
    }

    swap_mib = swap_mib.clamp(SWAP_MIN_MIB, SWAP_MAX_MIB);
    swap_mib = swap_mib.min(hd_gib * SWAP_PER_DISK_GIB_MIB);

    align_down_kib(swap_mib * 1024)
}

/// Free space to keep at the tail of the volume group so extent
/// rounding never fails an lvcreate: 4 MiB up to 32 GiB disks, 16 MiB
/// past 128 GiB, linear in between.
pub fn vg_cushion_kib(os_size_kib: u64) -> u64 {
    let hd_gib = os_size_kib / (1024 * 1024);

    (hd_gib * VG_CUSHION_PER_GIB_KIB)
        .clamp(VG_CUSHION_MIN_KIB, VG_CUSHION_MAX_KIB)
}

/// Root and data volume sizes computed by [`compute_lvm_sizes`]. All
/// values in KiB, 4 MiB aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvmSizes {
    pub root_kib: u64,

    /// Thin-pool size and its metadata size; `None` when the remainder
    /// was too small for a data volume.
    pub data_kib: Option<(u64, u64)>,

    /// True when a data volume was wanted but skipped for lack of
    /// space and no explicit cap excused it.
    pub data_skipped: bool,
}

/// Splits the OS partition between root, optional guest-data thin-pool
/// and reserved tail space.
///
/// Smaller disks give root a larger fraction of what remains after
/// swap; past the 48 GiB breakpoint root only grows by a quarter of
/// the remainder. Products without separate guest storage hand root
/// everything but the reserve.
pub fn compute_lvm_sizes(
    os_size_kib: u64,
    swap_kib: u64,
    separate_data: bool,
    maxroot_gib: Option<f64>,
    maxvz_gib: Option<f64>,
    minfree_gib: Option<f64>,
) -> LvmSizes {
    // The cushion comes off the top before any split so extent
    // rounding can never eat into the planned volumes
    let cushion_kib = align_up_kib(vg_cushion_kib(os_size_kib));
    let avail_kib = os_size_kib.saturating_sub(swap_kib);

    if !separate_data {
        let reserve_kib = match minfree_gib {
            Some(gib) => align_down_kib(gib_to_kib(gib)),
            None => cushion_kib,
        };

        return LvmSizes {
            root_kib: align_down_kib(avail_kib.saturating_sub(reserve_kib)),
            data_kib: None,
            data_skipped: false,
        };
    }

    let rest_kib = avail_kib.saturating_sub(cushion_kib);
    let rest_mib = rest_kib / 1024;
    let mut root_mib = if rest_mib < ROOT_SMALL_BREAK_MIB {
        rest_mib
    } else if rest_mib < ROOT_MID_BREAK_MIB {
        rest_mib / 2
    } else {
        rest_mib / 4 + ROOT_LARGE_EXTRA_MIB
    };

    if let Some(gib) = maxroot_gib {
        root_mib = root_mib.min(gib_to_kib(gib) / 1024);
    }

    let root_kib = align_down_kib(root_mib * 1024);

    let mut data_kib = rest_kib.saturating_sub(root_kib);
    if let Some(gib) = maxvz_gib {
        data_kib = data_kib.min(gib_to_kib(gib));
    }
    data_kib = align_down_kib(data_kib);

    if data_kib <= DATA_MIN_KIB {
        return LvmSizes {
            root_kib,
            data_kib: None,
            data_skipped: maxvz_gib.is_none(),
        };
    }

    // Thin-pool metadata: 1% of the pool, clamped to [1, 16] GiB. The
    // pool itself shrinks by twice the metadata plus one extent so the
    // VG can hold pool, metadata and its spare copy.
    let meta_kib = align_down_kib(
        (data_kib / 100).clamp(THINPOOL_META_MIN_KIB, THINPOOL_META_MAX_KIB),
    );
    data_kib = align_down_kib(data_kib - 2 * meta_kib - ALIGN_KIB);

    LvmSizes {
        root_kib,
        data_kib: Some((data_kib, meta_kib)),
        data_skipped: false,
    }
}

/// ZFS ARC cap policy: 0 is the "leave the ZFS default" sentinel and
/// passes through; anything else lands in [64 MiB, RAM - 1 GiB].
pub fn clamp_zfs_arc_max_mib(requested_mib: u64, total_memory_mib: u64) -> u64 {
    if requested_mib == 0 {
        return 0;
    }

    let upper = total_memory_mib
        .saturating_sub(ZFS_ARC_RESERVED_MIB)
        .max(ZFS_ARC_MIN_MIB);

    requested_mib.clamp(ZFS_ARC_MIN_MIB, upper)
}

fn gib_to_kib(gib: f64) -> u64 {
    (gib * 1024.0 * 1024.0) as u64
}
