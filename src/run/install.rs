use crate::config::InstallConfig;
use crate::constants::REQUIRED_COMMANDS;
use crate::entity::report::Report;
use crate::env::RunEnv;
use crate::errors::ProviError;
use crate::install;
use crate::sys::blockdev::DiskInventory;
use crate::ui::StdioUi;
use crate::utils::shell;

use super::validate::check_config;

pub(super) fn run(
    answer_file: &str,
    location: &str,
    assume_yes: bool,
) -> Result<Report, ProviError> {
    let env = super::load_run_env()?;
    let config = load_config(answer_file, &env)?;

    check_config(&config)?;
    check_required_commands()?;

    let inventory = DiskInventory::scan(env.test_images.as_deref())?;
    if inventory.is_empty() {
        return Err(ProviError::NoSuchDevice(
            "no candidate target disks on this machine".to_string(),
        ));
    }

    let mut ui = StdioUi::new(assume_yes);

    install::install(&config, &env, &inventory, location, &mut ui)
}

pub(super) fn load_config(
    answer_file: &str,
    env: &RunEnv,
) -> Result<InstallConfig, ProviError> {
    let answer_yaml = std::fs::read_to_string(answer_file)
        .map_err(|err| ProviError::NoSuchFile(err, answer_file.to_string()))?;

    let mut config = InstallConfig::from_yaml(&answer_yaml)?;

    // Kernel cmdline overrides always win over the answer file
    config.merge_cmdline(&env.kernel_cmdline)?;

    Ok(config)
}

fn check_required_commands() -> Result<(), ProviError> {
    let missing: Vec<&str> = REQUIRED_COMMANDS
        .iter()
        .filter(|cmd| !shell::in_path(cmd))
        .copied()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(ProviError::CmdFailed {
        error: None,
        context: format!(
            "required commands not found in PATH: {}",
            missing.join(", ")
        ),
    })
}
