//! Configuration view and validation commands: `char3 config`.

use anyhow::Result;

use char3_dashboard::config::DashboardConfig;

use super::super::ConfigCommands;

pub fn cmd_config(config: &DashboardConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", console::style("Dashboard Configuration").bold().cyan());
            println!();
            if config.config_path.exists() {
                println!("Config file: {}", config.config_path.display());
            } else {
                println!(
                    "No config file at {} (defaults + environment)",
                    config.config_path.display()
                );
            }
            println!();
            println!("Effective values (with env/CLI overrides):");
            println!();
            print!("{}", config.toml.redacted().to_toml_string()?);
            print_warnings(&config.validate());
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                print_warnings(&warnings);
            }
        }
    }
    Ok(())
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("{}", console::style("Configuration warnings:").yellow().bold());
    for warning in warnings {
        println!("  - {}", warning);
    }
    println!();
}
