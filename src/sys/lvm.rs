use crate::constants::PV_METADATA_SIZE_KIB;
use crate::errors::ProviError;
use crate::utils::shell;

/// Executes:
/// ```shell
/// pvcreate --metadatasize 250k -y -ff {device}
/// ```
///
/// The fixed 250 KiB metadata region puts the first physical extent at
/// a 128 KiB-aligned offset, which lines up with common SSD erase
/// blocks.
pub fn create_pv(device: &str) -> Result<(), ProviError> {
    shell::exec(
        "pvcreate",
        &[
            "--metadatasize",
            &format!("{PV_METADATA_SIZE_KIB}k"),
            "-y",
            "-ff",
            device,
        ],
    )
}

/// Executes:
/// ```shell
/// vgcreate {vg} {device}
/// ```
pub fn create_vg(vg: &str, device: &str) -> Result<(), ProviError> {
    shell::exec("vgcreate", &[vg, device])
}

/// Executes:
/// ```shell
/// lvcreate -L {size_kib}K -n {name} {vg}
/// ```
pub fn create_lv(vg: &str, name: &str, size_kib: u64) -> Result<(), ProviError> {
    shell::exec(
        "lvcreate",
        &["-L", &format!("{size_kib}K"), "-n", name, vg],
    )
}

/// Converts an existing LV into a thin-pool:
/// ```shell
/// lvconvert --yes --type thin-pool --poolmetadatasize {meta_kib}K {vg}/{lv}
/// ```
pub fn convert_to_thin_pool(
    vg: &str,
    lv: &str,
    meta_kib: u64,
) -> Result<(), ProviError> {
    shell::exec(
        "lvconvert",
        &[
            "--yes",
            "--type",
            "thin-pool",
            "--poolmetadatasize",
            &format!("{meta_kib}K"),
            &format!("{vg}/{lv}"),
        ],
    )
}

/// Lists the names of all volume groups visible on the system:
/// ```shell
/// vgs --noheadings -o vg_name
/// ```
pub fn list_vg_names() -> Result<Vec<String>, ProviError> {
    let output = shell::exec_capture("vgs", &["--noheadings", "-o", "vg_name"])?;

    Ok(parse_vg_names(&output))
}

fn parse_vg_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Executes:
/// ```shell
/// vgrename {old} {new}
/// ```
pub fn rename_vg(old: &str, new: &str) -> Result<(), ProviError> {
    shell::exec("vgrename", &[old, new])
}

#[cfg(test)]
mod tests {
    use super::parse_vg_names;

    #[test]
    fn test_parse_vg_names() {
        let output = "  system\n  pve-old\n\n";
        assert_eq!(vec!["system", "pve-old"], parse_vg_names(output));

        assert!(parse_vg_names("").is_empty());
    }
}
