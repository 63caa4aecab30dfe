//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, bail, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tabled::{Table, Tabled};

use crate::config::Config;
use crate::inventory::{Inventory, InventoryProvider, JsonInventory, LsblkInventory};
use crate::ledger::{LedgerSnapshot, LedgerStore};
use crate::operator::{BatchOperator, ConsoleOperator, Operator};
use crate::orchestrator::Orchestrator;
use crate::scanner::{CandidateSet, Scanner};
use crate::session::Session;
use crate::system::HostSystem;
use crate::target::TargetMap;
use crate::translate::RenameTable;

/// rootmount - find and mount installed systems for upgrade
#[derive(Parser)]
#[command(name = "rootmount")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (default: /etc/rootmount.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory the target system is mounted under
    #[arg(long, global = true)]
    pub destdir: Option<PathBuf>,

    /// Directory for runtime state
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format of `scan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable table.
    Table,
    /// JSON document.
    Json,
}

/// rootmount commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Scan partitions for installed systems
    Scan {
        /// Inventory JSON file (default: probe with lsblk)
        #[arg(short, long)]
        inventory: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Mount an installed system below the destination directory
    Mount {
        /// Root partition (default: first valid one)
        device: Option<String>,

        /// Inventory JSON file (default: probe with lsblk)
        #[arg(short, long)]
        inventory: Option<PathBuf>,

        /// Never prompt; cancel on any question
        #[arg(long)]
        batch: bool,
    },

    /// Unmount everything a previous `mount` activated
    Release,

    /// Show the recorded activations
    Ledger,
}

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "VALID")]
    valid: String,
    #[tabled(rename = "SYSTEM")]
    name: String,
    #[tabled(rename = "ARCH")]
    arch: String,
    #[tabled(rename = "FS")]
    fs: String,
    #[tabled(rename = "LABEL")]
    label: String,
    #[tabled(rename = "REASON")]
    reason: String,
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "MOUNTPOINT")]
    mountpoint: String,
    #[tabled(rename = "MOUNT BY")]
    mount_by: String,
}

#[derive(Tabled)]
struct LedgerRow {
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "MOUNTPOINT")]
    mountpoint: String,
    #[tabled(rename = "ACTIVATED")]
    activated: String,
}

fn load_inventory(path: Option<&Path>) -> Result<Inventory> {
    let inventory = match path {
        Some(path) => JsonInventory::new(path).load()?,
        None => LsblkInventory.load()?,
    };
    Ok(inventory)
}

fn scan_partitions(
    system: &HostSystem,
    resolver: &RenameTable,
    session: &mut Session,
    inventory: &Inventory,
    operator: &mut dyn Operator,
) -> Result<CandidateSet> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} {bar} {pos}/{len}")
            .map_err(|e| eyre!("invalid progress template: {e}"))?,
    );
    bar.set_prefix("Scanning partitions");

    let candidates = Scanner::new(system, resolver).scan_with_progress(
        session,
        inventory,
        operator,
        |done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        },
    )?;
    bar.finish_and_clear();
    Ok(candidates.clone())
}

fn print_candidates(candidates: &CandidateSet) {
    let rows: Vec<CandidateRow> = candidates
        .iter()
        .map(|(device, c)| CandidateRow {
            device: device.clone(),
            valid: if c.valid { "yes" } else { "no" }.to_string(),
            name: c.display_name().to_string(),
            arch: c.arch.clone(),
            fs: c.fs.to_string(),
            label: c.label.clone().unwrap_or_default(),
            reason: c.mismatch.clone().unwrap_or_default(),
        })
        .collect();

    if rows.is_empty() {
        println!("No partitions found");
    } else {
        println!("{}", Table::new(rows));
    }
}

fn print_target_map(map: &TargetMap) {
    let rows: Vec<TargetRow> = map
        .iter()
        .map(|(device, entry)| TargetRow {
            device: device.clone(),
            mountpoint: entry.mountpoint.clone(),
            mount_by: entry.mount_by.to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(destdir) = &self.destdir {
            config = config.with_destdir(destdir);
        }
        if let Some(state_dir) = &self.state_dir {
            config = config.with_state_dir(state_dir);
        }
        Ok(config)
    }

    /// Execute the CLI command.
    pub fn execute(self) -> Result<()> {
        let config = self.config()?;
        let system = HostSystem::new(config.arch_probe.clone());
        let resolver = RenameTable::new(config.device_renames.clone());
        let store = LedgerStore::new(config.paths.ledger_file());

        match self.command {
            Commands::Scan { inventory, format } => {
                let inventory = load_inventory(inventory.as_deref())?;
                let mut session = Session::new(config);
                let mut operator = ConsoleOperator::new();
                let candidates =
                    scan_partitions(&system, &resolver, &mut session, &inventory, &mut operator)?;

                match format {
                    OutputFormat::Table => print_candidates(&candidates),
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&candidates)?),
                }
                Ok(())
            }

            Commands::Mount {
                device,
                inventory,
                batch,
            } => {
                if store.load()?.is_some_and(|s| !s.ledger.is_empty()) {
                    bail!("A target system is already mounted; run `rootmount release` first");
                }

                let inventory = load_inventory(inventory.as_deref())?;
                let destdir = config.paths.destdir.clone();
                let mut session = Session::new(config);
                let mut operator: Box<dyn Operator> = if batch {
                    Box::new(BatchOperator)
                } else {
                    Box::new(ConsoleOperator::new())
                };

                let candidates = scan_partitions(
                    &system,
                    &resolver,
                    &mut session,
                    &inventory,
                    operator.as_mut(),
                )?;

                match device {
                    Some(device) => match candidates.get(&device) {
                        Some(candidate) if candidate.valid => session.select(device),
                        Some(candidate) => bail!(
                            "{device} is not an upgradable root partition: {}",
                            candidate.mismatch.as_deref().unwrap_or("unknown reason")
                        ),
                        None => bail!("{device} was not found on any disk"),
                    },
                    None => {
                        if !session.select_first_valid() {
                            bail!("No upgradable root partition found");
                        }
                    }
                }

                let orchestrator = Orchestrator::new(&system, &resolver, &inventory);
                let result = orchestrator.mount(&mut session, operator.as_mut());

                store.save(&LedgerSnapshot {
                    destdir,
                    ledger: session.ledger().clone(),
                })?;

                let outcome = result?;
                println!(
                    "Mounted {} at {} ({} activations)",
                    outcome.root_device,
                    session.config().paths.destdir.display(),
                    outcome.activations
                );
                print_target_map(&outcome.target_map);
                Ok(())
            }

            Commands::Release => {
                let Some(snapshot) = store.load()? else {
                    println!("Nothing mounted");
                    return Ok(());
                };

                let config = config.with_destdir(snapshot.destdir);
                let mut session = Session::new(config).with_ledger(snapshot.ledger);
                let inventory = Inventory::new();
                let mut operator = ConsoleOperator::new();
                let count = session.ledger().len();

                Orchestrator::new(&system, &resolver, &inventory).release(
                    &mut session,
                    &mut operator,
                    false,
                );
                store.delete()?;
                println!("Released {count} activations");
                Ok(())
            }

            Commands::Ledger => {
                let Some(snapshot) = store.load()? else {
                    println!("No activations recorded");
                    return Ok(());
                };

                let rows: Vec<LedgerRow> = snapshot
                    .ledger
                    .records()
                    .iter()
                    .map(|r| LedgerRow {
                        kind: r.kind.to_string(),
                        device: r.device.clone(),
                        mountpoint: r.mountpoint.clone().unwrap_or_default(),
                        activated: r.activated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    })
                    .collect();

                println!("Target: {}", snapshot.destdir.display());
                if rows.is_empty() {
                    println!("No activations recorded");
                } else {
                    println!("{}", Table::new(rows));
                }
                Ok(())
            }
        }
    }
}
