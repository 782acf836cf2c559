//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::{Confirm, Input};

use maintlink_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;
use crate::session;

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Walk the operator through the settings that differ per installation.
fn wizard(mut cfg: Config) -> Result<Config, CliError> {
    cfg.api.base_url = Input::new()
        .with_prompt("Board service URL")
        .default(cfg.api.base_url)
        .interact_text()
        .map_err(prompt_err)?;

    cfg.api.timeout_ms = Input::new()
        .with_prompt("Request timeout (ms)")
        .default(cfg.api.timeout_ms)
        .interact_text()
        .map_err(prompt_err)?;

    cfg.stream.enabled = Confirm::new()
        .with_prompt("Subscribe to the live event feed?")
        .default(cfg.stream.enabled)
        .interact()
        .map_err(prompt_err)?;

    cfg.health.enabled = Confirm::new()
        .with_prompt("Probe board health periodically?")
        .default(cfg.health.enabled)
        .interact()
        .map_err(prompt_err)?;

    Ok(cfg)
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(config::config_path);

    match args.command {
        ConfigCommand::Init { defaults } => {
            if path.exists()
                && !super::util::confirm(&format!("Overwrite {}?", path.display()), global.yes)?
            {
                return Ok(());
            }

            let base = Config::default();
            let cfg = if defaults || !std::io::stdin().is_terminal() {
                base
            } else {
                eprintln!("maintlink configuration");
                eprintln!("   Config path: {}\n", path.display());
                wizard(base)?
            };
            cfg.validate()?;

            let written = config::save_config(&cfg, Some(&path))?;
            if !global.quiet {
                eprintln!("Config written to {}", written.display());
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = session::resolve_config(global)?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Validation {
                        field: "config".into(),
                        reason: format!("failed to serialize config: {e}"),
                    })?
                }
                OutputFormat::Json => output::render_json(&cfg, false),
                OutputFormat::JsonCompact => output::render_json(&cfg, true),
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), false);
            Ok(())
        }
    }
}
