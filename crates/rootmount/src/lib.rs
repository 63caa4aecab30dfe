//! # rootmount
//!
//! Finds the installed Linux systems on the disks of a machine, checks which
//! of them can be upgraded and mounts the chosen one, with everything its
//! fstab and cryptotab activate, below a destination directory.
//!
//! ## Features
//!
//! - **Scanning**: every partition that can hold a root filesystem is mounted
//!   read-only and checked against its own fstab, architecture and
//!   installation state
//! - **Device-name translation**: fstab entries written for an older kernel
//!   naming scheme are rewritten to the current names
//! - **Rollback**: every activation is recorded, and a failure undoes all of
//!   them in reverse order
//!
//! ## Usage
//!
//! ```no_run
//! use rootmount::config::Config;
//! use rootmount::inventory::{InventoryProvider, LsblkInventory};
//! use rootmount::operator::BatchOperator;
//! use rootmount::orchestrator::Orchestrator;
//! use rootmount::scanner::Scanner;
//! use rootmount::session::Session;
//! use rootmount::system::HostSystem;
//! use rootmount::translate::Passthrough;
//!
//! # fn example() -> rootmount_common::RootmountResult<()> {
//! let config = Config::load(None)?;
//! let system = HostSystem::new(&config.arch_probe);
//! let inventory = LsblkInventory.load()?;
//! let mut session = Session::new(config);
//! let mut operator = BatchOperator;
//!
//! Scanner::new(&system, &Passthrough).scan(&mut session, &inventory, &mut operator)?;
//! if session.select_first_valid() {
//!     let outcome = Orchestrator::new(&system, &Passthrough, &inventory)
//!         .mount(&mut session, &mut operator)?;
//!     println!("{} activations", outcome.activations);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod activate;
pub mod cli;
pub mod config;
pub mod inventory;
pub mod ledger;
pub mod operator;
pub mod orchestrator;
pub mod scanner;
pub mod session;
pub mod system;
pub mod tab;
mod tables;
pub mod target;
pub mod translate;
pub mod var;

pub use orchestrator::Orchestrator;
pub use scanner::Scanner;
pub use session::Session;
