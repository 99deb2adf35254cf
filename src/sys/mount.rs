use colored::Colorize;

use crate::errors::ProviError;
use crate::utils::shell;

/// Executes:
/// ```shell
/// mount [-t type] [-o opts] {src} {dst}
/// ```
pub fn mount(
    src: &str,
    dst: &str,
    fs_type: Option<&str>,
    opts: Option<&str>,
) -> Result<(), ProviError> {
    std::fs::create_dir_all(dst)
        .map_err(|err| ProviError::NoSuchFile(err, dst.to_string()))?;

    let mut args = Vec::new();
    if let Some(t) = fs_type {
        args.extend(["-t", t]);
    }
    if let Some(o) = opts {
        args.extend(["-o", o]);
    }
    args.extend([src, dst]);

    shell::exec("mount", &args)
}

/// Bind-mounts a live-system directory (/dev, /proc, /sys) into the
/// target for chrooted package configuration.
pub fn mount_bind(src: &str, dst: &str) -> Result<(), ProviError> {
    std::fs::create_dir_all(dst)
        .map_err(|err| ProviError::NoSuchFile(err, dst.to_string()))?;

    shell::exec("mount", &["--bind", src, dst])
}

/// Executes:
/// ```shell
/// umount {dst}
/// ```
pub fn umount(dst: &str) -> Result<(), ProviError> {
    shell::exec("umount", &[dst])
}

/// Every successful mount is pushed here, and teardown pops in reverse
/// order on all exit paths - success, fatal error or user abort. A
/// failing unmount is reported as a warning, never as a fatal error:
/// teardown must keep going.
#[derive(Debug, Default)]
pub struct MountStack {
    mounts: Vec<String>,
}

impl MountStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mountpoint: String) {
        self.mounts.push(mountpoint);
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Unmounts everything in reverse mount order, collecting warnings
    /// for mounts that refuse to go away.
    pub fn unmount_all(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        while let Some(mountpoint) = self.mounts.pop() {
            if let Err(err) = umount(&mountpoint) {
                let msg = format!("failed to unmount {mountpoint}: {err}");
                eprintln!("{}", format!("WARN: {msg}").yellow());
                warnings.push(msg);
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_stack_order() {
        let mut stack = MountStack::new();
        stack.push("/target".to_string());
        stack.push("/target/proc".to_string());
        stack.push("/target/sys".to_string());

        // Unmount attempts run child-first; the mounts don't exist, so
        // every entry comes back as a warning in reverse push order.
        let warnings = stack.unmount_all();
        assert_eq!(3, warnings.len());
        assert!(warnings[0].contains("/target/sys"));
        assert!(warnings[2].contains("/target"));
        assert!(stack.is_empty());
    }
}
