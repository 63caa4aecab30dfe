//! Terminal prompts.

use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};

use super::{BootAdvisory, ConsistencyWarning, MountDisposition, MountTarget, Operator, VarChoice};

/// Operator answering on the controlling terminal.
pub struct ConsoleOperator {
    theme: ColorfulTheme,
}

impl ConsoleOperator {
    /// Create a console operator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    fn confirm(&self, prompt: &str, default: bool) -> bool {
        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Prompt failed");
                false
            })
    }

    fn edit_field(&self, prompt: &str, value: &str) -> Option<String> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .with_initial_text(value)
            .interact_text()
            .map_err(|e| tracing::warn!(error = %e, "Prompt failed"))
            .ok()
    }
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for ConsoleOperator {
    fn continue_after_check_failure(&mut self, device: &str, details: &str) -> bool {
        eprintln!(
            "{} The file system check of {} failed.",
            style("!").red().bold(),
            style(device).bold()
        );
        if !details.is_empty() {
            eprintln!("{}", style(details).dim());
        }
        self.confirm("Continue with this partition?", false)
    }

    fn mount_failed(&mut self, target: &MountTarget, error: &str) -> MountDisposition {
        eprintln!(
            "{} Unable to mount {} at {}: {}",
            style("!").red().bold(),
            style(&target.device).bold(),
            target.mountpoint,
            error
        );

        let items = [
            "Cancel and unmount everything",
            "Continue without this partition",
            "Specify mount options",
        ];
        let choice = Select::with_theme(&self.theme)
            .with_prompt("How do you want to proceed?")
            .items(&items)
            .default(0)
            .interact_opt();

        match choice {
            Ok(Some(1)) => MountDisposition::ForceContinue,
            Ok(Some(2)) => MountDisposition::EditAndRetry,
            Ok(_) => MountDisposition::Cancel,
            Err(e) => {
                tracing::warn!(error = %e, "Prompt failed");
                MountDisposition::Cancel
            }
        }
    }

    fn edit_mount(&mut self, target: &MountTarget) -> Option<MountTarget> {
        let mountpoint = self.edit_field("Mount point", &target.mountpoint)?;
        let device = self.edit_field("Device", &target.device)?;
        let fstype = self.edit_field("File system", &target.fstype)?;
        Some(MountTarget {
            mountpoint,
            device,
            fstype,
        })
    }

    fn confirm_small_boot(&mut self, advisory: &BootAdvisory) -> bool {
        eprintln!("{} {advisory}", style("Warning:").yellow().bold());
        self.confirm("Continue anyway?", false)
    }

    fn warn(&mut self, warning: &ConsistencyWarning) {
        eprintln!("{} {warning}", style("Warning:").yellow().bold());
    }

    fn passphrase(&mut self, device: &str, mountpoint: &str) -> Option<String> {
        let prompt = format!("Password for {device} mounted at {mountpoint} (empty to skip)");
        Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| tracing::warn!(error = %e, "Prompt failed"))
            .ok()
            .filter(|p| !p.is_empty())
    }

    fn retry_passphrase(&mut self, device: &str, error: &str) -> bool {
        eprintln!("{} {device}: {error}", style("!").red().bold());
        self.confirm("Incorrect password. Try again?", true)
    }

    fn choose_var_device(&mut self, choices: &[VarChoice]) -> Option<String> {
        eprintln!(
            "The /var partition of the system to update could not be identified \
             automatically. Select it from the list."
        );
        let items: Vec<String> = choices
            .iter()
            .map(|c| format!("{}  {}", c.device, style(&c.description).dim()))
            .collect();

        let choice = Select::with_theme(&self.theme)
            .with_prompt("/var partition")
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(|e| tracing::warn!(error = %e, "Prompt failed"))
            .ok()??;

        choices.get(choice).map(|c| c.device.clone())
    }

    fn report_error(&mut self, message: &str) {
        eprintln!("{} {message}", style("Error:").red().bold());
    }
}
