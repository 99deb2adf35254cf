use clap::{
    Parser,
    Subcommand,
};

use crate::errors::ProviError;

#[derive(Debug, Parser)]
#[clap(
    name = "provi",
    version,
    about = "Disk provisioning and system extraction for provi products"
)]
pub struct Cli {
    #[command(subcommand)]
    pub commands: Option<Commands>,

    /// Answer file
    #[arg(
        global = true,
        short = 'f',
        long = "file",
        value_parser = validate_filename,
        default_value_t = String::from(crate::constants::defaults::ANSWER_FILE)
    )]
    pub answer_file: String,

    /// Answer every confirmation prompt with yes, for unattended runs
    #[arg(global = true, short = 'y', long = "assume-yes")]
    pub assume_yes: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Partition the selected disks and install the system
    Install,

    /// Check the answer file against this machine without touching disks
    Validate,

    /// List candidate target disks
    Disks,
}

fn validate_filename(name: &str) -> Result<String, ProviError> {
    if name.is_empty() {
        return Err(ProviError::BadArgs(String::from("empty filename")));
    }

    Ok(name.to_string())
}
