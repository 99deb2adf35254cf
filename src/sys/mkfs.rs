use crate::errors::ProviError;
use crate::utils::shell;

/// Executes:
/// ```shell
/// mkfs.{fs_type} {device}
/// ```
/// for the plain root filesystems (ext4, xfs).
pub fn create_fs(fs_type: &str, device: &str) -> Result<(), ProviError> {
    let opts: &[&str] = match fs_type {
        // Skip lazy init so first boot is not busy writing inode tables
        "ext4" => &["-F", "-E", "lazy_itable_init=0,lazy_journal_init=0"],
        "xfs" => &["-f"],
        other => {
            return Err(ProviError::Bug(format!(
                "no mkfs handler for filesystem {other}"
            )));
        }
    };

    let mut args = opts.to_vec();
    args.push(device);

    shell::exec(&format!("mkfs.{fs_type}"), &args)
}

/// Formats an EFI system partition:
/// ```shell
/// mkfs.vfat -F32 {device}
/// ```
pub fn create_esp(device: &str) -> Result<(), ProviError> {
    shell::exec("mkfs.vfat", &["-F32", device])
}

/// Executes:
/// ```shell
/// mkswap -f {device}
/// ```
pub fn create_swap(device: &str) -> Result<(), ProviError> {
    shell::exec("mkswap", &["-f", device])
}
