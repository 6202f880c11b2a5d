//! `vecbench config` command

use std::path::Path;

use crate::cli::{Cli, OutputFormat};
use vecbench_core::config::BenchConfig;
use vecbench_core::error::Result;

/// Print the default configuration, or write it to `output`
pub fn execute(cli: &Cli, output: Option<&Path>) -> Result<()> {
    let config = BenchConfig::default();

    match output {
        Some(path) => {
            config.save(path)?;
            match cli.format {
                OutputFormat::Json => {
                    let status = serde_json::json!({
                        "status": "written",
                        "path": path.display().to_string(),
                    });
                    println!("{}", serde_json::to_string_pretty(&status)?);
                }
                OutputFormat::Human => {
                    if !cli.quiet {
                        println!("Wrote default config to {}", path.display());
                    }
                }
            }
        }
        None => match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            OutputFormat::Human => print!("{}", config.to_toml()?),
        },
    }

    Ok(())
}
