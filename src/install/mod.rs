pub mod bootloader;
pub mod configure;
pub mod extract;
pub mod partition;
pub mod sizing;
pub mod storage;

use std::fmt;
use std::time::Instant;

use crate::config::InstallConfig;
use crate::entity::blockdev::BlockDevice;
use crate::entity::report::Report;
use crate::env::RunEnv;
use crate::errors::ProviError;
use crate::sys::blockdev::DiskInventory;
use crate::sys::mount::{
    self,
    MountStack,
};
use crate::sys::sgdisk::{
    self,
    OsPartType,
};
use crate::sys::zfs;
use crate::ui::progress::{
    Progress,
    Window,
};
use crate::ui::Ui;

use self::partition::{
    PartitionPlan,
    PartitionedDisk,
};
use self::storage::{
    RootStorage,
    StorageResult,
};

/// One step of the provisioning sequence. The failing stage is carried
/// in [`ProviError::InstallFailed`] and every completed stage ends up
/// in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CleanupDisks,
    Partition,
    CreateStorage,
    MountTarget,
    ExtractImage,
    ConfigureTarget,
    ExtractPackages,
    ConfigurePackages,
    InstallBootloader,
    FinalizeCredentials,
    ConfigureProduct,
    UnmountTarget,
    ExportPool,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::CleanupDisks => "cleanup-disks",
            Stage::Partition => "partition",
            Stage::CreateStorage => "create-storage",
            Stage::MountTarget => "mount-target",
            Stage::ExtractImage => "extract-image",
            Stage::ConfigureTarget => "configure-target",
            Stage::ExtractPackages => "extract-packages",
            Stage::ConfigurePackages => "configure-packages",
            Stage::InstallBootloader => "install-bootloader",
            Stage::FinalizeCredentials => "finalize-credentials",
            Stage::ConfigureProduct => "configure-product",
            Stage::UnmountTarget => "unmount-target",
            Stage::ExportPool => "export-pool",
        })
    }
}

// Global progress windows, one per stage. Extraction dominates wall
// time and gets half the bar.
const W_CLEANUP: Window = Window { start: 0.0, end: 0.02 };
const W_PARTITION: Window = Window { start: 0.02, end: 0.07 };
const W_STORAGE: Window = Window { start: 0.07, end: 0.14 };
const W_MOUNT: Window = Window { start: 0.14, end: 0.16 };
const W_EXTRACT: Window = Window { start: 0.16, end: 0.65 };
const W_CONFIGURE: Window = Window { start: 0.65, end: 0.70 };
const W_EXTRACT_PKGS: Window = Window { start: 0.70, end: 0.72 };
const W_PACKAGES: Window = Window { start: 0.72, end: 0.88 };
const W_BOOTLOADER: Window = Window { start: 0.88, end: 0.95 };
const W_CREDENTIALS: Window = Window { start: 0.95, end: 0.97 };
const W_PRODUCT: Window = Window { start: 0.97, end: 1.0 };

/// Runs the full provisioning sequence against `target`. All blocking
/// confirmations happen before the first destructive command; once
/// disks are touched the run either completes or fails, and mounted
/// filesystems are torn down on every exit path.
pub fn install(
    config: &InstallConfig,
    env: &RunEnv,
    inventory: &DiskInventory,
    target: &str,
    ui: &mut dyn Ui,
) -> Result<Report, ProviError> {
    if env.in_test_mode() {
        return Err(ProviError::BadArgs(
            "provisioning refuses to run against test images".to_string(),
        ));
    }

    let (selected, plans) = prepare(config, env, inventory, ui)?;

    let started = Instant::now();
    let mut installer = Installer {
        config,
        env,
        target: target.to_string(),
        progress: Progress::new(ui),
        mounts: MountStack::new(),
        zfs_pool: None,
        stages_performed: Vec::new(),
        warnings: Vec::new(),
    };

    let result = installer.run_stages(&selected, &plans);
    installer.teardown();

    let Installer {
        mut progress,
        stages_performed,
        warnings,
        ..
    } = installer;

    match result {
        Ok(()) => {
            progress.update(&W_PRODUCT, 1.0, "provisioning complete");
            progress.ui().finished(
                true,
                &format!("Provisioning complete, system installed to {target}"),
            );

            Ok(Report {
                stages_performed: stages_performed
                    .iter()
                    .map(Stage::to_string)
                    .collect(),
                warnings,
                duration: started.elapsed(),
                location: target.to_string(),
            })
        }
        Err((stage, error)) => Err(ProviError::InstallFailed {
            error: Box::new(error),
            stage,
            warnings,
        }),
    }
}

// Resolves the disk selection, validates it and asks every blocking
// question up front.
fn prepare(
    config: &InstallConfig,
    env: &RunEnv,
    inventory: &DiskInventory,
    ui: &mut dyn Ui,
) -> Result<(Vec<BlockDevice>, Vec<PartitionPlan>), ProviError> {
    if config.disks.is_empty() {
        return Err(ProviError::BadConfig(
            "no target disks selected".to_string(),
        ));
    }

    let mut selected = Vec::new();
    for devname in &config.disks {
        selected.push(inventory.find_by_devname(devname)?.clone());
    }

    storage::check_disks(&selected, config.fstype, env.boot_type)?;

    let os_type = os_part_type(config);
    let mut plans = Vec::new();
    for disk in &selected {
        let plan =
            partition::plan_bootable_layout(disk, config.hdsize, os_type)?;

        if plan.needs_confirm
            && !ui.prompt(&format!(
                "{disk} leaves less than 8 GiB for the OS. \
                 Such a small system is only useful for evaluation. \
                 Continue anyway?"
            ))
        {
            return Err(ProviError::Aborted);
        }

        plans.push(plan);
    }

    let disk_list: Vec<String> =
        selected.iter().map(BlockDevice::to_string).collect();
    if !ui.prompt(&format!(
        "This will permanently erase all data on:\n  {}\nProceed?",
        disk_list.join("\n  ")
    )) {
        return Err(ProviError::Aborted);
    }

    Ok((selected, plans))
}

fn os_part_type(config: &InstallConfig) -> OsPartType {
    use crate::config::storage::FsType;

    match config.fstype {
        FsType::Ext4 | FsType::Xfs => OsPartType::Lvm,
        FsType::Zfs(_) => OsPartType::Zfs,
        FsType::Btrfs(_) => OsPartType::Btrfs,
    }
}

struct Installer<'a> {
    config: &'a InstallConfig,
    env: &'a RunEnv,
    target: String,
    progress: Progress<'a>,
    mounts: MountStack,

    /// Pool name once a ZFS root exists; drives the sync restore and
    /// pool export during teardown.
    zfs_pool: Option<String>,

    stages_performed: Vec<Stage>,
    warnings: Vec<String>,
}

impl Installer<'_> {
    fn run_stages(
        &mut self,
        selected: &[BlockDevice],
        plans: &[PartitionPlan],
    ) -> Result<(), (Stage, ProviError)> {
        self.cleanup_disks(selected)
            .map_err(|err| (Stage::CleanupDisks, err))?;
        self.stages_performed.push(Stage::CleanupDisks);

        let parts = self
            .partition_disks(selected, plans)
            .map_err(|err| (Stage::Partition, err))?;
        self.stages_performed.push(Stage::Partition);

        let storage = self
            .create_storage(&parts)
            .map_err(|err| (Stage::CreateStorage, err))?;
        self.stages_performed.push(Stage::CreateStorage);

        self.mount_target(&storage.root)
            .map_err(|err| (Stage::MountTarget, err))?;
        self.stages_performed.push(Stage::MountTarget);

        extract::extract_base_image(
            &self.config.base_image,
            &self.target,
            &mut self.progress,
            &W_EXTRACT,
        )
        .map_err(|err| (Stage::ExtractImage, err))?;
        self.stages_performed.push(Stage::ExtractImage);

        configure::configure_target(
            &self.target,
            self.config,
            self.env,
            &storage.root,
            &mut self.progress,
            &W_CONFIGURE,
        )
        .map_err(|err| (Stage::ConfigureTarget, err))?;
        self.stages_performed.push(Stage::ConfigureTarget);

        configure::extract_package_pool(
            &self.target,
            &mut self.progress,
            &W_EXTRACT_PKGS,
        )
        .map_err(|err| (Stage::ExtractPackages, err))?;
        self.stages_performed.push(Stage::ExtractPackages);

        self.configure_packages()
            .map_err(|err| (Stage::ConfigurePackages, err))?;
        self.stages_performed.push(Stage::ConfigurePackages);

        let boot_warnings = bootloader::install_bootloaders(
            &self.target,
            &storage.boot_devices,
            self.env.boot_type,
            &mut self.progress,
            &W_BOOTLOADER,
        )
        .map_err(|err| (Stage::InstallBootloader, err))?;
        self.warnings.extend(boot_warnings);
        self.stages_performed.push(Stage::InstallBootloader);

        self.progress
            .update(&W_CREDENTIALS, 0.5, "setting root credentials");
        configure::finalize_credentials(&self.target, self.config)
            .map_err(|err| (Stage::FinalizeCredentials, err))?;
        self.stages_performed.push(Stage::FinalizeCredentials);

        self.progress
            .update(&W_PRODUCT, 0.2, "writing product configuration");
        configure::configure_product(&self.target, self.config, &storage.root)
            .map_err(|err| (Stage::ConfigureProduct, err))?;
        self.stages_performed.push(Stage::ConfigureProduct);

        Ok(())
    }

    fn cleanup_disks(
        &mut self,
        selected: &[BlockDevice],
    ) -> Result<(), ProviError> {
        for (i, disk) in selected.iter().enumerate() {
            self.progress.update(
                &W_CLEANUP,
                i as f64 / selected.len() as f64,
                &format!("wiping signatures on {}", disk.path),
            );

            sgdisk::wipe_signatures(&disk.path)?;
        }

        Ok(())
    }

    fn partition_disks(
        &mut self,
        selected: &[BlockDevice],
        plans: &[PartitionPlan],
    ) -> Result<Vec<PartitionedDisk>, ProviError> {
        let mut parts = Vec::new();

        for (i, (disk, plan)) in selected.iter().zip(plans).enumerate() {
            self.progress.update(
                &W_PARTITION,
                i as f64 / selected.len() as f64,
                &format!("partitioning {}", disk.path),
            );

            parts.push(partition::partition_bootable(disk, plan)?);
        }

        Ok(parts)
    }

    fn create_storage(
        &mut self,
        parts: &[PartitionedDisk],
    ) -> Result<StorageResult, ProviError> {
        let storage = storage::create_storage(
            parts,
            self.config,
            self.env,
            &self.target,
            &mut self.progress,
            &W_STORAGE,
        )?;

        self.warnings.extend(storage.warnings.iter().cloned());

        if let RootStorage::Zfs { pool, .. } = &storage.root {
            self.zfs_pool = Some(pool.clone());
        }

        Ok(storage)
    }

    fn mount_target(&mut self, root: &RootStorage) -> Result<(), ProviError> {
        self.progress
            .update(&W_MOUNT, 0.2, "mounting target filesystems");

        match root {
            RootStorage::Lvm { volumes, fs } => {
                mount::mount(&volumes.root_device, &self.target, Some(fs), None)?;
            }
            RootStorage::Zfs { .. } => {
                // Already mounted at the target through the pool's
                // altroot
            }
            RootStorage::Btrfs { device, compress } => {
                mount::mount(
                    device,
                    &self.target,
                    Some("btrfs"),
                    Some(&format!("compress={}", compress.as_str())),
                )?;
            }
        }
        self.mounts.push(self.target.clone());

        // Chrooted package configuration needs the live kernel trio
        for dir in ["dev", "proc", "sys"] {
            let dst = format!("{}/{dir}", self.target);
            mount::mount_bind(&format!("/{dir}"), &dst)?;
            self.mounts.push(dst);
        }

        Ok(())
    }

    fn configure_packages(&mut self) -> Result<(), ProviError> {
        configure::install_diversions(&self.target)?;

        let result = configure::configure_packages(
            &self.target,
            &mut self.progress,
            &W_PACKAGES,
        );

        // The diversions must not leak into the installed system even
        // when dpkg failed half-way
        let removed = configure::remove_diversions(&self.target);

        result?;
        removed
    }

    /// Runs on every exit path. Failures here are warnings; a system
    /// that provisioned fine must not be reported broken because a
    /// mount was busy.
    fn teardown(&mut self) {
        self.progress.reset();

        if let Some(pool) = &self.zfs_pool {
            // Restore standard sync behavior disabled for extraction
            if let Err(err) = zfs::set_prop(pool, "sync", "standard") {
                self.warnings
                    .push(format!("failed to restore sync on {pool}: {err}"));
            }
        }

        if !self.mounts.is_empty() {
            self.warnings.extend(self.mounts.unmount_all());
            self.stages_performed.push(Stage::UnmountTarget);
        }

        // Mountpoints were written for the installed system at
        // creation time; dropping the altroot is all that remains
        if let Some(pool) = self.zfs_pool.take() {
            match zfs::export_pool(&pool) {
                Ok(()) => self.stages_performed.push(Stage::ExportPool),
                Err(err) => self
                    .warnings
                    .push(format!("failed to export pool {pool}: {err}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::BootType;
    use crate::ui::test_ui::RecordingUi;

    fn test_env() -> RunEnv {
        RunEnv {
            boot_type: BootType::Efi,
            total_memory_mib: 4096,
            kernel_cmdline: String::new(),
            test_images: None,
        }
    }

    fn inventory() -> DiskInventory {
        DiskInventory::from_disks(vec![
            BlockDevice::dummy_sized(0, 32 * 2048 * 1024),
            BlockDevice::dummy_sized(1, 32 * 2048 * 1024),
        ])
    }

    #[test]
    fn test_install_refuses_test_mode() {
        let config = InstallConfig::default();
        let mut env = test_env();
        env.test_images = Some(vec!["/tmp/disk.img".to_string()]);

        let mut ui = RecordingUi::default();
        let result =
            install(&config, &env, &inventory(), "/target", &mut ui);

        assert!(matches!(result, Err(ProviError::BadArgs(_))));
    }

    #[test]
    fn test_prepare_requires_disks() {
        let config = InstallConfig::default();
        let mut ui = RecordingUi::default();

        assert!(matches!(
            prepare(&config, &test_env(), &inventory(), &mut ui),
            Err(ProviError::BadConfig(_))
        ));
    }

    #[test]
    fn test_prepare_unknown_disk() {
        let mut config = InstallConfig::default();
        config.disks = vec!["/dev/nope".to_string()];
        let mut ui = RecordingUi::default();

        assert!(matches!(
            prepare(&config, &test_env(), &inventory(), &mut ui),
            Err(ProviError::NoSuchDevice(_))
        ));
    }

    #[test]
    fn test_prepare_declined_erase_aborts() {
        let mut config = InstallConfig::default();
        config.disks = vec!["/dev/dummy0".to_string()];

        let mut ui = RecordingUi::answering(&[false]);
        let result = prepare(&config, &test_env(), &inventory(), &mut ui);

        assert!(matches!(result, Err(ProviError::Aborted)));
        assert!(ui.prompts[0].contains("permanently erase"));
    }

    #[test]
    fn test_prepare_small_disk_needs_two_confirmations() {
        let mut config = InstallConfig::default();
        config.disks = vec!["/dev/dummy0".to_string()];

        let inventory = DiskInventory::from_disks(vec![
            BlockDevice::dummy_sized(0, 4 * 2048 * 1024),
        ]);

        // Declining the small-disk prompt aborts before the erase one
        let mut ui = RecordingUi::answering(&[false]);
        let result = prepare(&config, &test_env(), &inventory, &mut ui);
        assert!(matches!(result, Err(ProviError::Aborted)));
        assert_eq!(1, ui.prompts.len());
        assert!(ui.prompts[0].contains("less than 8 GiB"));

        // Accepting both yields a plan
        let mut ui = RecordingUi::answering(&[true, true]);
        let (selected, plans) =
            prepare(&config, &test_env(), &inventory, &mut ui).unwrap();
        assert_eq!(1, selected.len());
        assert!(plans[0].needs_confirm);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!("cleanup-disks", Stage::CleanupDisks.to_string());
        assert_eq!("export-pool", Stage::ExportPool.to_string());
    }
}
