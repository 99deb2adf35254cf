use crate::config::InstallConfig;
use crate::errors::ProviError;
use crate::install::storage;
use crate::sys::blockdev::DiskInventory;

/// Checks the answer file against this machine without touching any
/// disk: config consistency, then disk selection and suitability.
pub(super) fn run(answer_file: &str) -> Result<(), ProviError> {
    let start = std::time::Instant::now();

    let env = super::load_run_env()?;
    let config = super::install::load_config(answer_file, &env)?;

    check_config(&config)?;

    let inventory = DiskInventory::scan(env.test_images.as_deref())?;

    let mut selected = Vec::new();
    for devname in &config.disks {
        selected.push(inventory.find_by_devname(devname)?.clone());
    }

    if !selected.is_empty() {
        storage::check_disks(&selected, config.fstype, env.boot_type)?;
    }

    println!("validation done in {:?}", start.elapsed());

    Ok(())
}

/// Cross-field consistency checks on the sizing overrides. Individual
/// field syntax was already validated during parsing.
pub(super) fn check_config(config: &InstallConfig) -> Result<(), ProviError> {
    if let (Some(swap_mib), Some(hd_gib)) = (config.swapsize, config.hdsize) {
        let hd_mib = (hd_gib * 1024.0) as u64;
        if swap_mib > hd_mib / 2 {
            return Err(ProviError::BadConfig(format!(
                "swapsize ({swap_mib} MiB) must not exceed half of \
                 hdsize ({hd_gib} GiB)"
            )));
        }
    }

    if let (Some(maxroot), Some(hd_gib)) = (config.maxroot, config.hdsize) {
        if maxroot > hd_gib {
            return Err(ProviError::BadConfig(format!(
                "maxroot ({maxroot} GiB) must not exceed hdsize \
                 ({hd_gib} GiB)"
            )));
        }
    }

    if let Some(hd_gib) = config.hdsize {
        if hd_gib <= 0.0 {
            return Err(ProviError::BadConfig(
                "hdsize must be positive".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_yaml(yaml: &str) -> InstallConfig {
        InstallConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_check_config_swapsize() {
        // 8 GiB swap on a 32 GiB disk is fine
        let config = config_yaml("swapsize: 8192\nhdsize: 32");
        assert!(check_config(&config).is_ok());

        // more than half the disk is not
        let config = config_yaml("swapsize: 20000\nhdsize: 32");
        assert!(matches!(
            check_config(&config),
            Err(ProviError::BadConfig(_))
        ));

        // no hdsize, nothing to cross-check
        let config = config_yaml("swapsize: 20000");
        assert!(check_config(&config).is_ok());
    }

    #[test]
    fn test_check_config_maxroot() {
        let config = config_yaml("maxroot: 64\nhdsize: 32");
        assert!(check_config(&config).is_err());

        let config = config_yaml("maxroot: 16\nhdsize: 32");
        assert!(check_config(&config).is_ok());
    }

    #[test]
    fn test_check_config_hdsize_positive() {
        let config = config_yaml("hdsize: 0");
        assert!(check_config(&config).is_err());
    }
}
