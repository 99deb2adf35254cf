pub mod storage;

use serde::{
    Deserialize,
    Serialize,
};

use crate::constants::{
    defaults,
    CMDLINE_PREFIX,
};
use crate::errors::ProviError;
use self::storage::{
    BtrfsOptions,
    FsType,
    ZfsOptions,
};

/// The product being installed. Only the hypervisor splits out a
/// separate guest-storage volume (LVM thin-pool / ZFS `data` dataset).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    #[default]
    Hypervisor,
    Backup,
    Gateway,
}

impl Product {
    pub fn short_name(&self) -> &'static str {
        match self {
            Product::Hypervisor => "hyper",
            Product::Backup => "backup",
            Product::Gateway => "gateway",
        }
    }

    pub fn default_hostname(&self) -> &'static str {
        self.short_name()
    }

    /// ZFS root dataset name under `<pool>/ROOT`.
    pub fn root_dataset(&self) -> String {
        format!("{}-1", self.short_name())
    }

    pub fn separates_guest_storage(&self) -> bool {
        matches!(self, Product::Hypervisor)
    }
}

/// The answer file driving one provisioning run. Parsed once at
/// startup and read-only during provisioning; later sources (extra
/// files, kernel cmdline) are merged in with unknown keys rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallConfig {
    #[serde(default)]
    pub product: Product,

    #[serde(default = "default_fstype", alias = "fs", alias = "filesystem")]
    pub fstype: FsType,

    /// Selected target disks, by device path, in selection order.
    #[serde(
        default,
        alias = "disk_selection",
        alias = "target_disks",
        alias = "target_hd"
    )]
    pub disks: Vec<String>,

    /// Limit the usable size of each target disk, in GiB.
    #[serde(default)]
    pub hdsize: Option<f64>,

    /// Swap override in MiB; unset means the RAM-derived default.
    #[serde(default)]
    pub swapsize: Option<u64>,

    /// LVM root volume cap in GiB.
    #[serde(default)]
    pub maxroot: Option<f64>,

    /// LVM data (thin-pool) volume cap in GiB.
    #[serde(default)]
    pub maxvz: Option<f64>,

    /// Space to leave unallocated on the volume group, in GiB.
    #[serde(default)]
    pub minfree: Option<f64>,

    #[serde(default, alias = "zfs")]
    pub zfs_opts: ZfsOptions,

    #[serde(default, alias = "btrfs")]
    pub btrfs_opts: BtrfsOptions,

    #[serde(default = "default_country")]
    pub country: String,

    #[serde(default = "default_timezone", alias = "tz")]
    pub timezone: String,

    #[serde(default = "default_keymap", alias = "kmap")]
    pub keymap: String,

    #[serde(default, alias = "name", alias = "host")]
    pub hostname: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default = "default_mailto", alias = "email")]
    pub mailto: String,

    #[serde(
        default,
        alias = "passwd",
        alias = "root-password",
        alias = "root-passwd"
    )]
    pub password: Option<String>,

    /// Static network config; unset fields keep whatever the live
    /// system was booted with.
    #[serde(default)]
    pub cidr: Option<String>,

    #[serde(default, alias = "gw")]
    pub gateway: Option<String>,

    #[serde(default, alias = "nameserver")]
    pub dns: Option<String>,

    #[serde(default = "default_base_image")]
    pub base_image: String,

    #[serde(default)]
    pub mirror: Option<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        // An all-defaults YAML document is the canonical empty config
        serde_yaml::from_str("{}").expect("default config must parse")
    }
}

fn default_fstype() -> FsType {
    FsType::Ext4
}

fn default_country() -> String {
    defaults::COUNTRY.to_string()
}

fn default_timezone() -> String {
    defaults::TIMEZONE.to_string()
}

fn default_keymap() -> String {
    defaults::KEYMAP.to_string()
}

fn default_mailto() -> String {
    defaults::MAILTO.to_string()
}

fn default_base_image() -> String {
    defaults::BASE_IMAGE.to_string()
}

/// Sparse overlay for [`InstallConfig::merge`]. Unknown keys are
/// rejected just like in the full config.
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    pub product: Option<Product>,

    #[serde(alias = "fs", alias = "filesystem")]
    pub fstype: Option<FsType>,

    #[serde(alias = "disk_selection", alias = "target_disks", alias = "target_hd")]
    pub disks: Option<Vec<String>>,

    pub hdsize: Option<f64>,
    pub swapsize: Option<u64>,
    pub maxroot: Option<f64>,
    pub maxvz: Option<f64>,
    pub minfree: Option<f64>,

    #[serde(alias = "zfs")]
    pub zfs_opts: Option<ZfsOptions>,

    #[serde(alias = "btrfs")]
    pub btrfs_opts: Option<BtrfsOptions>,

    pub country: Option<String>,

    #[serde(alias = "tz")]
    pub timezone: Option<String>,

    #[serde(alias = "kmap")]
    pub keymap: Option<String>,

    #[serde(alias = "name", alias = "host")]
    pub hostname: Option<String>,

    pub domain: Option<String>,

    #[serde(alias = "email")]
    pub mailto: Option<String>,

    #[serde(alias = "passwd", alias = "root-password", alias = "root-passwd")]
    pub password: Option<String>,

    pub cidr: Option<String>,

    #[serde(alias = "gw")]
    pub gateway: Option<String>,

    #[serde(alias = "nameserver")]
    pub dns: Option<String>,

    pub base_image: Option<String>,
    pub mirror: Option<String>,
}

impl InstallConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ProviError> {
        serde_yaml::from_str(yaml)
            .map_err(|err| ProviError::BadConfig(err.to_string()))
    }

    /// Merges new values into the config; only keys present in the
    /// overlay are replaced.
    pub fn merge(&mut self, overlay: ConfigOverlay) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(v) = overlay.$field {
                    self.$field = v;
                }
            };
            (opt $field:ident) => {
                if overlay.$field.is_some() {
                    self.$field = overlay.$field;
                }
            };
        }

        take!(product);
        take!(fstype);
        take!(disks);
        take!(opt hdsize);
        take!(opt swapsize);
        take!(opt maxroot);
        take!(opt maxvz);
        take!(opt minfree);
        take!(zfs_opts);
        take!(btrfs_opts);
        take!(country);
        take!(timezone);
        take!(keymap);
        take!(opt hostname);
        take!(opt domain);
        take!(mailto);
        take!(opt password);
        take!(opt cidr);
        take!(opt gateway);
        take!(opt dns);
        take!(base_image);
        take!(opt mirror);
    }

    pub fn merge_yaml(&mut self, yaml: &str) -> Result<(), ProviError> {
        let overlay: ConfigOverlay = serde_yaml::from_str(yaml)
            .map_err(|err| ProviError::BadConfig(err.to_string()))?;

        self.merge(overlay);

        Ok(())
    }

    /// Applies `provi.*` overrides from the kernel command line. Size
    /// values carry an explicit unit ("4GiB", "512MiB"); unknown keys
    /// are rejected like everywhere else in config handling.
    pub fn merge_cmdline(&mut self, cmdline: &str) -> Result<(), ProviError> {
        let tokens = shlex::split(cmdline).ok_or_else(|| {
            ProviError::BadConfig("unparseable kernel cmdline".to_string())
        })?;

        for token in tokens {
            let Some(rest) = token.strip_prefix(CMDLINE_PREFIX) else {
                continue;
            };

            let (key, value) = rest.split_once('=').ok_or_else(|| {
                ProviError::BadConfig(format!(
                    "cmdline option {CMDLINE_PREFIX}{rest} has no value"
                ))
            })?;

            match key {
                "swapsize" => {
                    self.swapsize = Some(parse_size_bytes(value)? / (1024 * 1024));
                }
                "hdsize" => self.hdsize = Some(parse_size_gib(value)?),
                "maxroot" => self.maxroot = Some(parse_size_gib(value)?),
                "maxvz" => self.maxvz = Some(parse_size_gib(value)?),
                "minfree" => self.minfree = Some(parse_size_gib(value)?),
                "target_disk" | "disk" => {
                    self.disks = vec![value.to_string()];
                }
                unknown => {
                    return Err(ProviError::BadConfig(format!(
                        "unknown cmdline option {CMDLINE_PREFIX}{unknown}"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn parse_size_bytes(s: &str) -> Result<u64, ProviError> {
    let bytes: humanize_rs::bytes::Bytes<u64> = s.parse().map_err(|err| {
        ProviError::BadConfig(format!("bad size '{s}': {err}"))
    })?;

    Ok(bytes.size())
}

fn parse_size_gib(s: &str) -> Result<f64, ProviError> {
    Ok(parse_size_bytes(s)? as f64 / 1024.0 / 1024.0 / 1024.0)
}
