use crate::entity::blockdev::BootDeviceInfo;
use crate::env::BootType;
use crate::errors::ProviError;
use crate::sys::mount;
use crate::utils::shell;
use crate::ui::progress::{
    Progress,
    Window,
};

/// Installs the bootloader onto every partitioned disk. A single disk
/// failing is a warning, not a fatal error - the system still boots
/// from the others. Only zero bootable disks fail the stage.
pub fn install_bootloaders(
    target: &str,
    boot_devices: &[BootDeviceInfo],
    boot_type: BootType,
    progress: &mut Progress,
    window: &Window,
) -> Result<Vec<String>, ProviError> {
    let total = boot_devices.len();

    let (installed, warnings) =
        collect_boot_results(boot_devices, |i, device| {
            progress.update(
                window,
                i as f64 / total as f64,
                &format!("installing bootloader on {}", device.devname),
            );

            install_to_disk(target, device, boot_type)
        });

    if installed == 0 {
        return Err(ProviError::CmdFailed {
            error: None,
            context: "bootloader installation failed on every disk"
                .to_string(),
        });
    }

    progress.update(window, 0.9, "updating boot menu");
    shell::chroot(target, "update-grub", &[])?;

    Ok(warnings)
}

/// Runs `install_one` per disk, counting successes and turning each
/// failure into a warning naming the disk.
pub fn collect_boot_results<F>(
    boot_devices: &[BootDeviceInfo],
    mut install_one: F,
) -> (usize, Vec<String>)
where
    F: FnMut(usize, &BootDeviceInfo) -> Result<(), ProviError>,
{
    let mut installed = 0;
    let mut warnings = Vec::new();

    for (i, device) in boot_devices.iter().enumerate() {
        match install_one(i, device) {
            Ok(()) => installed += 1,
            Err(err) => warnings.push(format!(
                "bootloader installation on {} failed: {err}",
                device.devname
            )),
        }
    }

    (installed, warnings)
}

fn install_to_disk(
    target: &str,
    device: &BootDeviceInfo,
    boot_type: BootType,
) -> Result<(), ProviError> {
    match boot_type {
        BootType::Bios => shell::chroot(
            target,
            "grub-install",
            &["--target=i386-pc", "--force", &device.devname],
        ),
        BootType::Efi => install_efi(target, device),
    }
}

fn install_efi(target: &str, device: &BootDeviceInfo) -> Result<(), ProviError> {
    let esp = device.esp_partition.as_deref().ok_or_else(|| {
        ProviError::Bug(format!("no ESP recorded for {}", device.devname))
    })?;

    let efi_dir = format!("{target}/boot/efi");
    mount::mount(esp, &efi_dir, Some("vfat"), None)?;

    let args = [
        "--target=x86_64-efi",
        "--efi-directory=/boot/efi",
        "--bootloader-id=provi",
    ];

    let result = shell::chroot(target, "grub-install", &args).or_else(|_| {
        // Broken EFI variable stores are common enough; fall back to
        // the removable-media path instead of failing the disk
        let mut retry = args.to_vec();
        retry.push("--no-nvram");
        retry.push("--removable");
        shell::chroot(target, "grub-install", &retry)
    });

    // The ESP must come back off even when grub-install failed
    let umount_result = mount::umount(&efi_dir);

    result?;
    umount_result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_device(name: &str) -> BootDeviceInfo {
        BootDeviceInfo {
            devname: format!("/dev/{name}"),
            os_partition: format!("/dev/{name}3"),
            esp_partition: Some(format!("/dev/{name}2")),
            by_id: None,
            logical_block_size: 512,
        }
    }

    #[test]
    fn test_collect_boot_results_partial_failure() {
        let devices = vec![boot_device("sda"), boot_device("sdb")];

        let (installed, warnings) =
            collect_boot_results(&devices, |_, device| {
                if device.devname == "/dev/sdb" {
                    Err(ProviError::CmdFailed {
                        error: None,
                        context: "grub-install exited with non-zero status 1"
                            .to_string(),
                    })
                } else {
                    Ok(())
                }
            });

        // One disk still boots; the failure surfaces as a warning only
        assert_eq!(1, installed);
        assert_eq!(1, warnings.len());
        assert!(warnings[0].contains("/dev/sdb"));
    }

    #[test]
    fn test_collect_boot_results_all_ok() {
        let devices = vec![boot_device("sda"), boot_device("sdb")];

        let (installed, warnings) =
            collect_boot_results(&devices, |_, _| Ok(()));

        assert_eq!(2, installed);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_collect_boot_results_total_failure() {
        let devices = vec![boot_device("sda")];

        let (installed, warnings) = collect_boot_results(&devices, |_, _| {
            Err(ProviError::Aborted)
        });

        assert_eq!(0, installed);
        assert_eq!(1, warnings.len());
    }
}
