mod cli;
mod config;
mod constants;
mod entity;
mod env;
mod errors;
mod install;
mod run;
mod sys;
mod ui;
mod utils;

use clap::Parser;
use colored::Colorize;

use crate::errors::ProviError;

fn main() {
    let cli_args = cli::Cli::parse();

    let Err(err) = run::run(cli_args) else {
        return;
    };

    // The user already said no at a prompt; a second error dialog
    // would just repeat their own decision back at them
    if err.is_user_abort() {
        eprintln!("aborted");
        std::process::exit(130);
    }

    eprintln!("{}", format!("ERROR: {err}").red());

    if let ProviError::InstallFailed {
        error, warnings, ..
    } = &err
    {
        eprintln!("caused by: {error}");
        for warning in warnings {
            eprintln!("{}", format!("WARN: {warning}").yellow());
        }
    }

    std::process::exit(1);
}
