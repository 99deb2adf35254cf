use crate::errors::ProviError;
use crate::utils::shell;

/// Creates a (possibly multi-device) Btrfs filesystem:
/// ```shell
/// mkfs.btrfs -f -d {profile} -m {profile} {devices...}
/// ```
///
/// Data and metadata profiles are always set together; `single` for a
/// one-disk setup.
pub fn create_fs(profile: &str, devices: &[String]) -> Result<(), ProviError> {
    let mut args = vec!["-f", "-d", profile, "-m", profile];
    args.extend(devices.iter().map(String::as_str));

    shell::exec("mkfs.btrfs", &args)
}
