//! Generate config command implementation

use crate::config::{CliConfig, DEFAULT_CONFIG_FILE};
use crate::error::CliError;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the generate-config command
#[derive(Debug, Args)]
pub struct GenerateConfigArgs {
    /// Output file path
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl GenerateConfigArgs {
    /// Execute the generate-config command
    pub fn execute(&self) -> Result<()> {
        use std::fs;

        if self.output.exists() && !self.force {
            return Err(CliError::ConfigError(format!(
                "{} already exists (use --force to overwrite)",
                self.output.display()
            ))
            .into());
        }

        let template = self.generate_template()?;
        fs::write(&self.output, template)
            .with_context(|| format!("Failed to write to {}", self.output.display()))?;

        println!("✓ Configuration written to {}", self.output.display());
        println!();
        println!("Next steps:");
        println!("1. Adjust paths and chunk size in the file");
        println!("2. Put GOOGLE_API_KEY in the environment or a .env file");
        println!(
            "3. Rehearse without API calls: tanqih --config {} run --dry-run",
            self.output.display()
        );

        Ok(())
    }

    /// Generate template configuration content
    fn generate_template(&self) -> Result<String> {
        let body = CliConfig::default().to_toml()?;
        Ok(format!(
            "# tanqih configuration\n\
             # Command line flags and TANQIH_* environment variables override these values.\n\
             # The API key is read from GOOGLE_API_KEY and never from this file.\n\
             # Optional: paths.log_file, service.prompt_file (template containing {{text}}).\n\n\
             {body}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_template_parses_back() {
        let args = GenerateConfigArgs {
            output: PathBuf::from("tanqih.toml"),
            force: false,
        };

        let template = args.generate_template().unwrap();
        assert!(template.starts_with("# tanqih configuration"));
        assert!(template.contains("[processing]"));
        let parsed: CliConfig = toml::from_str(&template).unwrap();
        assert_eq!(parsed, CliConfig::default());
    }

    #[test]
    fn test_execute_success() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("tanqih.toml");

        let args = GenerateConfigArgs {
            output: output_path.clone(),
            force: false,
        };

        assert!(args.execute().is_ok());
        let content = std::fs::read_to_string(&output_path).unwrap();
        assert!(content.contains("max_chunk_chars = 15000"));
    }

    #[test]
    fn test_refuses_to_overwrite_without_force() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("tanqih.toml");
        std::fs::write(&output_path, "# mine").unwrap();

        let args = GenerateConfigArgs {
            output: output_path.clone(),
            force: false,
        };
        assert!(args.execute().is_err());
        assert_eq!(std::fs::read_to_string(&output_path).unwrap(), "# mine");

        let args = GenerateConfigArgs {
            output: output_path.clone(),
            force: true,
        };
        assert!(args.execute().is_ok());
    }
}
