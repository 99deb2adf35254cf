use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{
    Deserialize,
    Serialize,
};

use crate::entity::blockdev::BlockDevice;
use crate::errors::ProviError;
use crate::utils::shell;

const MODEL_MAX_LEN: usize = 30;

// Device classes that can never be install targets.
const SKIP_PREFIXES: [&str; 6] = ["ram", "loop", "md", "dm-", "fd", "sr"];

/// Ordered snapshot of candidate target disks. Built once per run; the
/// device list does not change during provisioning, so a stale cache
/// is an accepted tradeoff and [`DiskInventory::rescan`] is the only
/// invalidation.
#[derive(Debug, Clone)]
pub struct DiskInventory {
    disks: Vec<BlockDevice>,
}

impl DiskInventory {
    /// Scans `/sys/block`, or synthesizes an inventory over plain
    /// files when `test_images` is given.
    pub fn scan(test_images: Option<&[String]>) -> Result<Self, ProviError> {
        let disks = match test_images {
            Some(images) => scan_test_images(images)?,
            None => scan_sys_block("/sys/block")?,
        };

        Ok(DiskInventory { disks })
    }

    pub fn list(&self) -> &[BlockDevice] {
        &self.disks
    }

    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    pub fn find_by_devname(
        &self,
        path: &str,
    ) -> Result<&BlockDevice, ProviError> {
        self.disks
            .iter()
            .find(|disk| disk.path == path)
            .ok_or_else(|| ProviError::NoSuchDevice(path.to_string()))
    }

    pub fn rescan(
        &mut self,
        test_images: Option<&[String]>,
    ) -> Result<(), ProviError> {
        *self = Self::scan(test_images)?;

        Ok(())
    }

    #[cfg(test)]
    pub fn from_disks(disks: Vec<BlockDevice>) -> Self {
        DiskInventory { disks }
    }
}

fn scan_sys_block(sys_block: &str) -> Result<Vec<BlockDevice>, ProviError> {
    let entries = fs::read_dir(sys_block)
        .map_err(|err| ProviError::NoSuchFile(err, sys_block.to_string()))?;

    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|err| ProviError::NoSuchFile(err, sys_block.to_string()))?;
        names.push(entry.file_name().to_string_lossy().to_string());
    }

    names.sort();

    let iso_devs = iso9660_devices()?;

    let mut disks = Vec::new();
    for name in names {
        if SKIP_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }

        let sys_path = format!("{sys_block}/{name}");
        let path = format!("/dev/{name}");

        if iso_devs.contains_key(&path) {
            continue;
        }

        // A device without a valid positive size is not usable
        let Some(size_sectors) = read_u64_attr(&sys_path, "size") else {
            continue;
        };
        if size_sectors == 0 {
            continue;
        }

        let logical_block_size =
            read_u64_attr(&sys_path, "queue/logical_block_size").unwrap_or(512)
                as u32;

        let mut model = fs::read_to_string(format!("{sys_path}/device/model"))
            .unwrap_or_default()
            .trim()
            .to_string();
        model.truncate(MODEL_MAX_LEN);

        disks.push(BlockDevice {
            ordinal: disks.len(),
            path,
            size_sectors,
            model,
            logical_block_size,
            sys_path,
        });
    }

    Ok(disks)
}

// Test images are ordinary files standing in for disks: size in bytes
// over 512, always a 512-byte logical sector.
fn scan_test_images(images: &[String]) -> Result<Vec<BlockDevice>, ProviError> {
    let mut disks = Vec::new();

    for (ordinal, image) in images.iter().enumerate() {
        let meta = fs::metadata(image)
            .map_err(|err| ProviError::NoSuchFile(err, image.clone()))?;

        disks.push(BlockDevice {
            ordinal,
            path: image.clone(),
            size_sectors: meta.len() / 512,
            model: "Test image".to_string(),
            logical_block_size: 512,
            sys_path: image.clone(),
        });
    }

    Ok(disks)
}

fn read_u64_attr(sys_path: &str, attr: &str) -> Option<u64> {
    fs::read_to_string(format!("{sys_path}/{attr}"))
        .ok()?
        .trim()
        .parse()
        .ok()
}

// For parsing blkid KEY=VAL device entries
#[derive(Serialize, Deserialize)]
struct EntryBlkid {
    #[serde(rename = "TYPE")]
    dev_type: Option<String>,

    #[serde(rename = "UUID")]
    uuid: Option<String>,

    #[serde(rename = "LABEL")]
    label: Option<String>,
}

fn iso9660_devices() -> Result<HashMap<String, String>, ProviError> {
    // blkid exits 2 when nothing matched; an empty map is fine then
    let output = shell::exec_capture("blkid", &[]).unwrap_or_default();

    Ok(blkid_filter_type(&output, "iso9660"))
}

// Filters blkid output down to devices of filesystem type `fs_type`,
// mapping device path to that type.
fn blkid_filter_type(
    output_blkid: &str,
    fs_type: &str,
) -> HashMap<String, String> {
    let mut found = HashMap::new();

    for line in output_blkid.lines() {
        if line.is_empty() {
            continue;
        }

        let Some((dev_name, dev_data)) = line.split_once(':') else {
            continue;
        };

        // Make dev_data look like TOML:
        // KEY1=VAL1
        // KEY2=VAL2
        let dev_entry: Vec<&str> = dev_data.split_whitespace().collect();
        let dev_entry = dev_entry.join("\n");

        let Ok(dev_entry) = toml::from_str::<EntryBlkid>(&dev_entry) else {
            continue;
        };

        if dev_entry.dev_type.as_deref() == Some(fs_type) {
            found.insert(dev_name.to_string(), fs_type.to_string());
        }
    }

    found
}

/// Resolves the stable `/dev/disk/by-id` alias of a whole disk, so
/// storage configs survive device renumbering across reboots. Aliases
/// of individual partitions (`-part*`) are skipped.
pub fn resolve_by_id(devpath: &str) -> Option<String> {
    let canonical = fs::canonicalize(devpath).ok()?;

    resolve_by_id_in("/dev/disk/by-id", &canonical)
}

fn resolve_by_id_in(by_id_dir: &str, canonical: &Path) -> Option<String> {
    let entries = fs::read_dir(by_id_dir).ok()?;

    let mut candidates: Vec<String> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.contains("-part") {
            continue;
        }

        let Ok(target) = fs::canonicalize(format!("{by_id_dir}/{name}")) else {
            continue;
        };

        if target == canonical {
            candidates.push(name);
        }
    }

    // wwn-* ids are transport-independent, so they win over ata-*/
    // nvme-* aliases of the same disk; sorting keeps the fallback
    // deterministic
    candidates.sort();
    let name = candidates
        .iter()
        .find(|name| name.starts_with("wwn-"))
        .or_else(|| candidates.first())?;

    Some(format!("{by_id_dir}/{name}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_blkid_filter_type() {
        let output = "\
/dev/sr0: UUID=\"2024-11-21-11-12-33-00\" LABEL=\"PROVI\" TYPE=\"iso9660\"
/dev/sda1: UUID=\"6c97f9e7\" TYPE=\"ext4\"
/dev/sdb: TYPE=\"iso9660\"
/dev/sdc1: PARTUUID=\"0f1a\"
";

        let isos = blkid_filter_type(output, "iso9660");
        assert_eq!(2, isos.len());
        assert!(isos.contains_key("/dev/sr0"));
        assert!(isos.contains_key("/dev/sdb"));
        assert!(!isos.contains_key("/dev/sda1"));
    }

    #[test]
    fn test_scan_test_images() {
        let dir = tempfile::tempdir().unwrap();

        let mut paths = Vec::new();
        for (i, mib) in [64u64, 128].iter().enumerate() {
            let path = dir.path().join(format!("disk{i}.img"));
            let mut f = std::fs::File::create(&path).unwrap();
            f.set_len(mib * 1024 * 1024).unwrap();
            f.flush().unwrap();
            paths.push(path.to_string_lossy().to_string());
        }

        let inventory = DiskInventory::scan(Some(&paths)).unwrap();
        let disks = inventory.list();

        assert_eq!(2, disks.len());
        assert_eq!(64 * 2048, disks[0].size_sectors);
        assert_eq!(128 * 2048, disks[1].size_sectors);
        assert_eq!(512, disks[0].logical_block_size);
        assert_eq!(0, disks[0].ordinal);

        let found = inventory.find_by_devname(&paths[1]).unwrap();
        assert_eq!(1, found.ordinal);

        assert!(matches!(
            inventory.find_by_devname("/dev/nope"),
            Err(ProviError::NoSuchDevice(_))
        ));
    }

    #[test]
    fn test_rescan_picks_up_new_images() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("disk0.img");
        let f = std::fs::File::create(&path).unwrap();
        f.set_len(64 * 1024 * 1024).unwrap();

        let mut paths = vec![path.to_string_lossy().to_string()];
        let mut inventory = DiskInventory::scan(Some(&paths)).unwrap();
        assert_eq!(1, inventory.list().len());

        let path = dir.path().join("disk1.img");
        let f = std::fs::File::create(&path).unwrap();
        f.set_len(32 * 1024 * 1024).unwrap();
        paths.push(path.to_string_lossy().to_string());

        inventory.rescan(Some(&paths)).unwrap();
        assert_eq!(2, inventory.list().len());
        assert_eq!(32 * 2048, inventory.list()[1].size_sectors);
    }

    #[test]
    fn test_resolve_by_id_prefers_wwn() {
        let dir = tempfile::tempdir().unwrap();
        let dev = dir.path().join("sda");
        std::fs::File::create(&dev).unwrap();

        let by_id = dir.path().join("by-id");
        fs::create_dir(&by_id).unwrap();
        for name in ["ata-Model_SN123", "wwn-0x5000c500", "ata-Model_SN123-part3"] {
            std::os::unix::fs::symlink(&dev, by_id.join(name)).unwrap();
        }

        let canonical = fs::canonicalize(&dev).unwrap();
        let by_id_dir = by_id.to_string_lossy().to_string();

        let resolved = resolve_by_id_in(&by_id_dir, &canonical).unwrap();
        assert!(resolved.ends_with("/wwn-0x5000c500"), "{resolved}");

        // Without a wwn alias the first sorted id wins; partition
        // aliases never count
        std::fs::remove_file(by_id.join("wwn-0x5000c500")).unwrap();
        let resolved = resolve_by_id_in(&by_id_dir, &canonical).unwrap();
        assert!(resolved.ends_with("/ata-Model_SN123"), "{resolved}");
    }

    #[test]
    fn test_scan_missing_image_fails() {
        let images = vec!["/nonexistent/disk.img".to_string()];
        assert!(DiskInventory::scan(Some(&images)).is_err());
    }
}
