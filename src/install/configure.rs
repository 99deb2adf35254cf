use std::path::Path;

use crate::config::InstallConfig;
use crate::constants::defaults;
use crate::env::RunEnv;
use crate::errors::ProviError;
use crate::install::sizing;
use crate::utils::fs::{
    append_line,
    write_executable,
    write_file,
};
use crate::utils::shell;
use crate::ui::progress::{
    Progress,
    Window,
};

use super::extract::{
    run_with_progress,
    DpkgConfigureMatcher,
};
use super::storage::RootStorage;

/// Writes the static system configuration of the freshly extracted
/// target: fstab, hostname, name resolution, network and locale bits.
pub fn configure_target(
    target: &str,
    config: &InstallConfig,
    env: &RunEnv,
    root: &RootStorage,
    progress: &mut Progress,
    window: &Window,
) -> Result<(), ProviError> {
    progress.update(window, 0.1, "writing system configuration");

    write_file(etc(target, "fstab"), &render_fstab(root))?;

    let hostname = config
        .hostname
        .clone()
        .unwrap_or_else(|| config.product.default_hostname().to_string());

    write_file(etc(target, "hostname"), &format!("{hostname}\n"))?;
    write_file(
        etc(target, "hosts"),
        &render_hosts(&hostname, config.domain.as_deref(), config.cidr.as_deref()),
    )?;
    write_file(
        etc(target, "resolv.conf"),
        &render_resolv_conf(config.domain.as_deref(), config.dns.as_deref()),
    )?;
    write_file(
        etc(target, "network/interfaces"),
        &render_interfaces(config.cidr.as_deref(), config.gateway.as_deref()),
    )?;

    progress.update(window, 0.4, "writing locale configuration");

    write_file(etc(target, "timezone"), &format!("{}\n", config.timezone))?;
    set_localtime_link(target, &config.timezone)?;

    write_file(
        etc(target, "default/keyboard"),
        &format!("XKBLAYOUT=\"{}\"\n", config.keymap),
    )?;

    // Empty machine-id makes systemd generate a fresh one on first boot
    write_file(etc(target, "machine-id"), "")?;

    if let Some(mirror) = &config.mirror {
        write_file(
            etc(target, "apt/sources.list"),
            &format!("deb {mirror} stable main\n"),
        )?;
    }

    progress.update(window, 0.7, "configuring storage defaults");

    if let RootStorage::Zfs { .. } = root {
        let arc_max_mib = arc_max_mib(config, env);
        if arc_max_mib > 0 {
            write_file(
                etc(target, "modprobe.d/zfs.conf"),
                &format!(
                    "options zfs zfs_arc_max={}\n",
                    arc_max_mib * 1024 * 1024
                ),
            )?;
        }
    }

    Ok(())
}

fn etc(target: &str, rel: &str) -> String {
    format!("{target}/etc/{rel}")
}

/// Effective ZFS ARC ceiling in MiB: the configured value, or the
/// product default, both clamped against installed memory.
pub fn arc_max_mib(config: &InstallConfig, env: &RunEnv) -> u64 {
    let requested = match config.zfs_opts.arc_max_mib {
        0 => env.default_arc_max_mib(config.product),
        mib => mib,
    };

    sizing::clamp_zfs_arc_max_mib(requested, env.total_memory_mib)
}

fn render_fstab(root: &RootStorage) -> String {
    let mut fstab = String::from("# <file system> <mount point> <type> <options> <dump> <pass>\n");

    match root {
        RootStorage::Lvm { volumes, fs } => {
            fstab.push_str(&format!(
                "{} / {fs} defaults 0 1\n",
                volumes.root_device
            ));
            if let Some(swap) = &volumes.swap_device {
                fstab.push_str(&format!("{swap} none swap sw 0 0\n"));
            }
        }
        // The root dataset is mounted by the initrd, not by fstab
        RootStorage::Zfs { .. } => {}
        RootStorage::Btrfs { device, compress } => {
            fstab.push_str(&format!(
                "{device} / btrfs defaults,compress={} 0 1\n",
                compress.as_str()
            ));
        }
    }

    fstab.push_str("proc /proc proc defaults 0 0\n");

    fstab
}

fn render_hosts(
    hostname: &str,
    domain: Option<&str>,
    cidr: Option<&str>,
) -> String {
    let fqdn = match domain {
        Some(domain) => format!("{hostname}.{domain}"),
        None => hostname.to_string(),
    };

    let mut hosts = String::from("127.0.0.1 localhost.localdomain localhost\n");

    if let Some(cidr) = cidr {
        let ip = cidr.split('/').next().unwrap_or(cidr);
        hosts.push_str(&format!("{ip} {fqdn} {hostname}\n"));
    } else {
        hosts.push_str(&format!("127.0.1.1 {fqdn} {hostname}\n"));
    }

    hosts.push_str(
        "\n::1     ip6-localhost ip6-loopback\n\
         fe00::0 ip6-localnet\n\
         ff00::0 ip6-mcastprefix\n\
         ff02::1 ip6-allnodes\n\
         ff02::2 ip6-allrouters\n",
    );

    hosts
}

fn render_resolv_conf(domain: Option<&str>, dns: Option<&str>) -> String {
    let mut out = String::new();

    if let Some(domain) = domain {
        out.push_str(&format!("search {domain}\n"));
    }
    if let Some(dns) = dns {
        out.push_str(&format!("nameserver {dns}\n"));
    }

    out
}

fn render_interfaces(cidr: Option<&str>, gateway: Option<&str>) -> String {
    let mut out = String::from("auto lo\niface lo inet loopback\n");

    // Without a static address the live system's DHCP setup carries
    // over and the management interface stays auto-configured
    if let Some(cidr) = cidr {
        out.push_str("\nauto eth0\niface eth0 inet static\n");
        out.push_str(&format!("    address {cidr}\n"));
        if let Some(gw) = gateway {
            out.push_str(&format!("    gateway {gw}\n"));
        }
    } else {
        out.push_str("\nauto eth0\niface eth0 inet dhcp\n");
    }

    out
}

fn set_localtime_link(target: &str, timezone: &str) -> Result<(), ProviError> {
    let link = etc(target, "localtime");

    if Path::new(&link).exists() {
        std::fs::remove_file(&link)
            .map_err(|err| ProviError::NoSuchFile(err, link.clone()))?;
    }

    std::os::unix::fs::symlink(
        format!("/usr/share/zoneinfo/{timezone}"),
        &link,
    )
    .map_err(|err| ProviError::NoSuchFile(err, link))
}

/// Copies the offline package pool from the install medium into the
/// target's package cache, when the medium carries one. A medium
/// without a pool is not an error.
pub fn extract_package_pool(
    target: &str,
    progress: &mut Progress,
    window: &Window,
) -> Result<(), ProviError> {
    use crate::utils::fs::file_exists;

    if !file_exists(defaults::PACKAGE_POOL) {
        return Ok(());
    }

    progress.update(window, 0.2, "copying package pool");

    let dst = format!("{target}/{}", defaults::PACKAGE_CACHE);
    std::fs::create_dir_all(&dst)
        .map_err(|err| ProviError::NoSuchFile(err, dst.clone()))?;

    shell::exec("cp", &["-a", &format!("{}/.", defaults::PACKAGE_POOL), &dst])
}

/// Installs the service-start guards before packages are configured in
/// the chroot. Nothing may start daemons inside a half-built target.
pub fn install_diversions(target: &str) -> Result<(), ProviError> {
    write_executable(
        format!("{target}/usr/sbin/policy-rc.d"),
        "#!/bin/sh\nexit 101\n",
    )?;

    shell::chroot(
        target,
        "dpkg-divert",
        &[
            "--add",
            "--rename",
            "--local",
            "/sbin/start-stop-daemon",
        ],
    )?;
    write_executable(
        format!("{target}/sbin/start-stop-daemon"),
        "#!/bin/sh\nexit 0\n",
    )
}

/// Reverses [`install_diversions`] once package configuration is done.
pub fn remove_diversions(target: &str) -> Result<(), ProviError> {
    let policy = format!("{target}/usr/sbin/policy-rc.d");
    std::fs::remove_file(&policy)
        .map_err(|err| ProviError::NoSuchFile(err, policy))?;

    let fake = format!("{target}/sbin/start-stop-daemon");
    std::fs::remove_file(&fake)
        .map_err(|err| ProviError::NoSuchFile(err, fake))?;

    shell::chroot(
        target,
        "dpkg-divert",
        &["--remove", "--rename", "/sbin/start-stop-daemon"],
    )
}

/// Configures every unpacked package inside the chroot, tracking
/// `Setting up` lines against the installed package count.
pub fn configure_packages(
    target: &str,
    progress: &mut Progress,
    window: &Window,
) -> Result<(), ProviError> {
    let selections = shell::exec_capture(
        "chroot",
        &[target, "dpkg", "--get-selections"],
    )?;
    let total = selections.lines().filter(|l| !l.trim().is_empty()).count();

    progress.update(window, 0.0, "configuring packages");

    run_with_progress(
        "chroot",
        &[target, "dpkg", "--configure", "-a"],
        &mut DpkgConfigureMatcher::new(total),
        progress,
        window,
        "configuring packages",
    )
}

/// Sets the root password in the target, always passing a bcrypt hash
/// so the plain-text password never reaches a command line.
pub fn finalize_credentials(
    target: &str,
    config: &InstallConfig,
) -> Result<(), ProviError> {
    let hashed = defaults::hashed_password(config.password.as_deref());

    shell::exec_stdin(
        "chroot",
        &[target, "chpasswd", "-e"],
        &format!("root:{hashed}\n"),
    )
}

/// Product-specific last touches: mail routing and the storage
/// description the management stack reads at first boot.
pub fn configure_product(
    target: &str,
    config: &InstallConfig,
    root: &RootStorage,
) -> Result<(), ProviError> {
    append_line(
        etc(target, "aliases"),
        &format!("root: {}", config.mailto),
    )?;

    let conf_dir = config.product.short_name();
    write_file(
        etc(target, &format!("{conf_dir}/storage.conf")),
        &render_storage_conf(config, root),
    )
}

fn render_storage_conf(config: &InstallConfig, root: &RootStorage) -> String {
    let mut out = String::from("dir: local\n\tpath /var/lib/provi\n\tcontent iso,backup\n");

    if !config.product.separates_guest_storage() {
        return out;
    }

    match root {
        RootStorage::Lvm { volumes, .. } => {
            if volumes.data_device.is_some() {
                out.push_str(
                    "\nlvmthin: local-data\n\tthinpool data\n\
                     \tvgname system\n\tcontent rootdir,images\n",
                );
            }
        }
        RootStorage::Zfs { pool, .. } => {
            out.push_str(&format!(
                "\nzfspool: local-data\n\tpool {pool}/data\n\
                 \tcontent rootdir,images\n"
            ));
        }
        RootStorage::Btrfs { .. } => {}
    }

    out
}
