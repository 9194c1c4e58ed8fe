//! imgforge: build machine images from a TOML config.
//!
//! `build` runs the configured step pipeline; every resource a step acquired is
//! released before the process exits, including after Ctrl-C.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use imgforge::build::{chroot_communicator, run_build};
use imgforge::cancel::CancelToken;
use imgforge::core::types::BuildOutcome;
use imgforge::driver::{HypervDriver, NullDriver};
use imgforge::exit_codes;
use imgforge::io::config::{BuildConfig, DEFAULT_CONFIG_FILE, TargetKind, load_config, write_config};
use imgforge::io::powershell::PwshRunner;
use imgforge::logging;
use imgforge::ui::ConsoleUi;

#[derive(Parser)]
#[command(name = "imgforge", version, about = "Machine image build orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Check that the configured backend is usable on this host.
    Verify {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Run the build pipeline.
    Build {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Load and validate the config without touching any backend.
    CheckConfig {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Verify { config } => cmd_verify(&config),
        Command::Build { config } => cmd_build(&config),
        Command::CheckConfig { config } => cmd_check_config(&config),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &BuildConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_check_config(path: &Path) -> Result<i32> {
    let config = load_config(path)?;
    println!(
        "{}: ok (target {:?}, vm {})",
        path.display(),
        config.target,
        config.vm_name
    );
    Ok(exit_codes::OK)
}

fn cmd_verify(path: &Path) -> Result<i32> {
    let config = load_config(path)?;
    match config.target {
        TargetKind::Hyperv => {
            hyperv_driver(&config, &CancelToken::new())?;
            println!("hyper-v is ready");
        }
        TargetKind::Chroot => {
            let root = &config.chroot.root;
            let metadata =
                fs::metadata(root).with_context(|| format!("stat {}", root.display()))?;
            if !metadata.is_dir() {
                bail!("chroot root {} is not a directory", root.display());
            }
            chroot_communicator(&config)?;
            println!("chroot root {} is ready", root.display());
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_build(path: &Path) -> Result<i32> {
    let config = load_config(path)?;
    let cancel = CancelToken::new();
    watch_ctrl_c(cancel.clone())?;
    let ui = ConsoleUi;

    let (outcome, _state) = match config.target {
        TargetKind::Hyperv => {
            let driver = hyperv_driver(&config, &cancel)?;
            run_build(&config, &cancel, &driver, &ui, None)
        }
        TargetKind::Chroot => {
            let communicator = chroot_communicator(&config)?;
            run_build(&config, &cancel, &NullDriver, &ui, Some(&communicator))
        }
    };
    info!(outcome = ?outcome, "build finished");

    Ok(match outcome {
        BuildOutcome::Completed => {
            println!("Build '{}' finished.", config.vm_name);
            exit_codes::OK
        }
        BuildOutcome::Halted { error } => {
            eprintln!("Build '{}' errored: {error}", config.vm_name);
            exit_codes::HALTED
        }
        BuildOutcome::Cancelled => {
            eprintln!("Build '{}' cancelled.", config.vm_name);
            exit_codes::CANCELLED
        }
    })
}

fn hyperv_driver(config: &BuildConfig, cancel: &CancelToken) -> Result<HypervDriver<PwshRunner>> {
    let ps = PwshRunner::new(&config.hyperv.powershell, config.command_output_limit_bytes);
    HypervDriver::new(ps, cancel).context("hyper-v pre-flight checks")
}

/// Fire `cancel` on the first Ctrl-C; exit immediately on the second.
fn watch_ctrl_c(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build signal runtime")?;
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if cancel.is_cancelled() {
                        eprintln!("interrupted again, exiting without cleanup");
                        std::process::exit(exit_codes::CANCELLED);
                    }
                    warn!("interrupt received, cancelling build");
                    eprintln!("Cancelling build, cleaning up...");
                    cancel.cancel();
                }
            });
        })
        .context("spawn ctrl-c watcher")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_build_default_config() {
        let cli = Cli::parse_from(["imgforge", "build"]);
        let Command::Build { config } = cli.command else {
            panic!("expected build");
        };
        assert_eq!(config, Path::new(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_check_config_with_path() {
        let cli = Cli::parse_from(["imgforge", "check-config", "--config", "web.toml"]);
        let Command::CheckConfig { config } = cli.command else {
            panic!("expected check-config");
        };
        assert_eq!(config, Path::new("web.toml"));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["imgforge", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }
}
