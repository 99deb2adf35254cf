pub mod install;
pub mod validate;

use std::env;

use colored::Colorize;

use crate::cli;
use crate::constants::{
    defaults,
    ENV_PROVI_TARGET,
    RUN_ENV_FILE,
};
use crate::env::RunEnv;
use crate::errors::ProviError;
use crate::sys::blockdev::DiskInventory;
use crate::sys::user;
use crate::utils::fs::file_exists;

pub fn run(cli_args: cli::Cli) -> Result<(), ProviError> {
    let location = install_location();

    match cli_args.commands {
        // Default is to validate
        None | Some(cli::Commands::Validate) => {
            validate::run(&cli_args.answer_file)
        }
        Some(cli::Commands::Install) => {
            if !user::is_root() {
                println!("{}", "WARN: running as non-root user".yellow());
            }

            let report = install::run(
                &cli_args.answer_file,
                &location,
                cli_args.assume_yes,
            )?;

            println!("{}", report.to_json_string());

            Ok(())
        }
        Some(cli::Commands::Disks) => list_disks(),
    }
}

fn list_disks() -> Result<(), ProviError> {
    let env = load_run_env()?;
    let inventory = DiskInventory::scan(env.test_images.as_deref())?;

    if inventory.is_empty() {
        println!("no candidate disks found");
        return Ok(());
    }

    for disk in inventory.list() {
        println!("{disk}");
    }

    Ok(())
}

fn install_location() -> String {
    env::var(ENV_PROVI_TARGET).unwrap_or(defaults::TARGET_DIR.to_string())
}

pub(super) fn load_run_env() -> Result<RunEnv, ProviError> {
    if file_exists(RUN_ENV_FILE) {
        return RunEnv::from_json_file(RUN_ENV_FILE);
    }

    RunEnv::detect()
}
