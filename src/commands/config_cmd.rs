use clap::{Args, Subcommand, ValueEnum};

use crate::config::Config;

#[derive(Clone, Debug, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("prefix: {}", config.prefix.value.display());
                        println!("  source: {}", config.prefix.source);
                        println!();

                        println!("sync:");
                        match &config.sync.remote {
                            Some(remote) => println!("  remote: {}", remote),
                            None => println!("  remote: (not configured)"),
                        }
                        println!("  mode: {}", config.sync.mode);
                        println!("  batch_size: {}", config.sync.batch_size);
                        if let Some(secs) = config.sync.timeout_secs {
                            println!("  timeout_secs: {}", secs);
                        }
                        println!();

                        if config.validation.required_fields.is_empty() {
                            println!("validation: none");
                        } else {
                            println!(
                                "validation: required fields {}",
                                config.validation.required_fields.join(", ")
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
