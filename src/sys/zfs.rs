use crate::errors::ProviError;
use crate::utils::shell;

/// Executes:
/// ```shell
/// zpool create -f -o cachefile=none -o ashift={ashift} -O mountpoint=none -R {altroot} {pool} {vdevs...}
/// ```
///
/// No cachefile: the pool must be importable on first boot of the
/// installed system, not pinned to the live environment. The altroot
/// confines every dataset mount to the install target and is gone
/// after export, so dataset mountpoints can be written as the
/// installed system will see them.
pub fn create_pool(
    pool: &str,
    ashift: usize,
    altroot: &str,
    vdev_args: &[String],
) -> Result<(), ProviError> {
    let args = pool_create_args(pool, ashift, altroot, vdev_args);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    shell::exec("zpool", &args)
}

pub fn pool_create_args(
    pool: &str,
    ashift: usize,
    altroot: &str,
    vdev_args: &[String],
) -> Vec<String> {
    let mut args: Vec<String> = [
        "create",
        "-f",
        "-o",
        "cachefile=none",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();

    args.push("-o".to_string());
    args.push(format!("ashift={ashift}"));
    args.push("-O".to_string());
    args.push("mountpoint=none".to_string());
    args.push("-R".to_string());
    args.push(altroot.to_string());
    args.push(pool.to_string());
    args.extend(vdev_args.iter().cloned());

    args
}

/// Executes:
/// ```shell
/// zfs create {dataset}
/// ```
pub fn create_dataset(dataset: &str) -> Result<(), ProviError> {
    shell::exec("zfs", &["create", dataset])
}

/// Executes:
/// ```shell
/// zfs set {prop}={value} {dataset}
/// ```
pub fn set_prop(
    dataset: &str,
    prop: &str,
    value: &str,
) -> Result<(), ProviError> {
    shell::exec("zfs", &["set", &format!("{prop}={value}"), dataset])
}

/// Executes:
/// ```shell
/// zfs set mountpoint={mountpoint} {dataset}
/// ```
pub fn set_mountpoint(
    dataset: &str,
    mountpoint: &str,
) -> Result<(), ProviError> {
    set_prop(dataset, "mountpoint", mountpoint)
}

/// Executes:
/// ```shell
/// zpool export -f {pool}
/// ```
pub fn export_pool(pool: &str) -> Result<(), ProviError> {
    shell::exec("zpool", &["export", "-f", pool])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_create_args() {
        let vdevs = vec![
            "mirror".to_string(),
            "/dev/disk/by-id/a-part3".to_string(),
            "/dev/disk/by-id/b-part3".to_string(),
        ];

        let args = pool_create_args("rpool", 12, "/target", &vdevs);

        let expected = [
            "create",
            "-f",
            "-o",
            "cachefile=none",
            "-o",
            "ashift=12",
            "-O",
            "mountpoint=none",
            "-R",
            "/target",
            "rpool",
            "mirror",
            "/dev/disk/by-id/a-part3",
            "/dev/disk/by-id/b-part3",
        ];
        assert_eq!(expected.as_slice(), args.as_slice());
    }
}
