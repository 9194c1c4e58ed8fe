//! Build configuration stored as TOML (default `imgforge.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Generation;
use crate::core::wrapper::TemplateWrapper;

pub const DEFAULT_CONFIG_FILE: &str = "imgforge.toml";

/// Backend a build runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Hyperv,
    Chroot,
}

/// Build configuration (TOML).
///
/// Missing fields default to values that validate, so a file only needs to
/// name what differs from the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Name of the VM (Hyper-V) or label of the build (chroot).
    pub vm_name: String,

    pub target: TargetKind,

    /// Truncate captured stdout/stderr of backend commands beyond this many bytes.
    pub command_output_limit_bytes: usize,

    pub hyperv: HypervConfig,
    pub chroot: ChrootConfig,
    pub provision: ProvisionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HypervConfig {
    /// PowerShell host used to drive Hyper-V.
    pub powershell: String,
    pub generation: Generation,
    pub cpus: u32,
    pub memory_mb: u64,
    pub disk_size_mb: u64,
    pub dynamic_memory: bool,
    pub secure_boot: bool,
    pub switch_name: String,
    /// `Internal`, `Private`, or `External`.
    pub switch_type: String,
    /// Install media. Disk images (`.vhd`/`.vhdx`) are not attached as DVDs.
    pub iso_path: Option<PathBuf>,
    pub floppy_path: Option<PathBuf>,
    /// Directory holding the VM files and, after export, the image.
    pub output_dir: PathBuf,
    pub export: bool,
}

impl Default for HypervConfig {
    fn default() -> Self {
        Self {
            powershell: "powershell.exe".to_string(),
            generation: Generation::One,
            cpus: 1,
            memory_mb: 1024,
            disk_size_mb: 40 * 1024,
            dynamic_memory: false,
            secure_boot: false,
            switch_name: "imgforge-switch".to_string(),
            switch_type: "Internal".to_string(),
            iso_path: None,
            floppy_path: None,
            output_dir: PathBuf::from("output-imgforge"),
            export: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChrootConfig {
    /// Mounted root filesystem that commands and transfers are confined to.
    pub root: PathBuf,
    /// Template applied to every command, e.g. `sudo -E {{ command }}`.
    pub command_wrapper: String,
    /// Environment prefixed to every provisioning command.
    pub env: BTreeMap<String, String>,
}

impl Default for ChrootConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/mnt/imgforge"),
            command_wrapper: "{{ command }}".to_string(),
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Files copied onto the target before any command runs.
    pub uploads: Vec<UploadConfig>,
    /// Shell commands run in order on the target.
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadConfig {
    pub source: PathBuf,
    pub destination: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            vm_name: "imgforge".to_string(),
            target: TargetKind::Hyperv,
            command_output_limit_bytes: 1_000_000,
            hyperv: HypervConfig::default(),
            chroot: ChrootConfig::default(),
            provision: ProvisionConfig::default(),
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<()> {
        if self.vm_name.trim().is_empty() {
            return Err(anyhow!("vm_name must be non-empty"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        for upload in &self.provision.uploads {
            if upload.destination.trim().is_empty() {
                return Err(anyhow!(
                    "provision upload of {} has an empty destination",
                    upload.source.display()
                ));
            }
        }
        let provisions = !self.provision.uploads.is_empty() || !self.provision.commands.is_empty();
        if self.target == TargetKind::Hyperv && provisions {
            return Err(anyhow!(
                "[provision] needs a communicator; only target = \"chroot\" provides one"
            ));
        }
        match self.target {
            TargetKind::Hyperv => self.hyperv.validate(),
            TargetKind::Chroot => self.chroot.validate(),
        }
    }
}

impl HypervConfig {
    fn validate(&self) -> Result<()> {
        if self.powershell.trim().is_empty() {
            return Err(anyhow!("hyperv.powershell must be non-empty"));
        }
        if self.cpus == 0 {
            return Err(anyhow!("hyperv.cpus must be > 0"));
        }
        if self.memory_mb < 32 {
            return Err(anyhow!("hyperv.memory_mb must be >= 32"));
        }
        if self.disk_size_mb == 0 {
            return Err(anyhow!("hyperv.disk_size_mb must be > 0"));
        }
        if self.switch_name.trim().is_empty() {
            return Err(anyhow!("hyperv.switch_name must be non-empty"));
        }
        if !["Internal", "Private", "External"].contains(&self.switch_type.as_str()) {
            return Err(anyhow!(
                "hyperv.switch_type must be Internal, Private, or External (got '{}')",
                self.switch_type
            ));
        }
        if self.secure_boot && self.generation != Generation::Two {
            return Err(anyhow!("hyperv.secure_boot requires generation = 2"));
        }
        if self.floppy_path.is_some() && self.generation != Generation::One {
            return Err(anyhow!("hyperv.floppy_path requires generation = 1"));
        }
        Ok(())
    }
}

impl ChrootConfig {
    fn validate(&self) -> Result<()> {
        if !self.root.is_absolute() {
            return Err(anyhow!(
                "chroot.root must be an absolute path (got {})",
                self.root.display()
            ));
        }
        TemplateWrapper::new(&self.command_wrapper).context("chroot.command_wrapper")?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BuildConfig::default()`.
pub fn load_config(path: &Path) -> Result<BuildConfig> {
    if !path.exists() {
        let cfg = BuildConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BuildConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BuildConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, BuildConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("imgforge.toml");
        let mut cfg = BuildConfig {
            target: TargetKind::Chroot,
            ..BuildConfig::default()
        };
        cfg.hyperv.iso_path = Some(PathBuf::from("install.iso"));
        cfg.chroot.env.insert("LANG".to_string(), "C".to_string());
        cfg.provision.uploads.push(UploadConfig {
            source: PathBuf::from("motd"),
            destination: "/etc/motd".to_string(),
        });
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("imgforge.toml");
        fs::write(
            &path,
            "vm_name = \"web\"\ntarget = \"chroot\"\n\n[chroot]\nroot = \"/mnt/web\"\n\n[provision]\ncommands = [\"apt-get update\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.vm_name, "web");
        assert_eq!(cfg.target, TargetKind::Chroot);
        assert_eq!(cfg.chroot.root, PathBuf::from("/mnt/web"));
        assert_eq!(cfg.chroot.command_wrapper, "{{ command }}");
        assert_eq!(cfg.provision.commands, vec!["apt-get update".to_string()]);
        assert_eq!(cfg.hyperv, HypervConfig::default());
    }

    #[test]
    fn rejects_secure_boot_on_generation_one() {
        let mut cfg = BuildConfig::default();
        cfg.hyperv.secure_boot = true;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("generation = 2"));
    }

    #[test]
    fn rejects_floppy_on_generation_two() {
        let mut cfg = BuildConfig::default();
        cfg.hyperv.generation = Generation::Two;
        cfg.hyperv.floppy_path = Some(PathBuf::from("answers.vfd"));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("generation = 1"));
    }

    #[test]
    fn rejects_provisioning_without_communicator() {
        let mut cfg = BuildConfig::default();
        cfg.provision.commands.push("echo hi".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("communicator"));
    }

    #[test]
    fn rejects_relative_chroot_root() {
        let mut cfg = BuildConfig {
            target: TargetKind::Chroot,
            ..BuildConfig::default()
        };
        cfg.chroot.root = PathBuf::from("mnt/img");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_generation() {
        let err = toml::from_str::<BuildConfig>("[hyperv]\ngeneration = 3\n").unwrap_err();
        assert!(err.to_string().contains("generation must be 1 or 2"));
    }
}
