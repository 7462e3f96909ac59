use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "docwright")]
#[command(about = "Extracts C and C++ documentation comments into one markdown page per symbol")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract pages for changed sources into the extract directory
    Extract {
        /// Source file or directory (defaults to the configured source dirs)
        source: Option<PathBuf>,

        /// Directory receiving the pages and the cache
        #[arg(short, long)]
        extract_dir: Option<PathBuf>,

        /// Write one page per associated comment block instead of per construct
        #[arg(long)]
        comments: bool,

        /// Re-extract files the cache considers unchanged
        #[arg(long)]
        force: bool,
    },

    /// Extract, then copy every page into the output directory
    Generate {
        /// Source file or directory (defaults to the configured source dirs)
        source: Option<PathBuf>,

        /// Directory receiving the pages and the cache
        #[arg(short, long)]
        extract_dir: Option<PathBuf>,

        /// Output directory for documentation
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force regeneration of all pages
        #[arg(long)]
        force: bool,
    },

    /// Remove pages whose source files are gone
    Prune {
        /// Directory holding the pages and the cache
        #[arg(short, long)]
        extract_dir: Option<PathBuf>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Show built-in grammars and configured languages
    ListParsers,

    /// Write a default configuration file
    InitConfig {
        /// Target file
        #[arg(default_value = "docwright.toml")]
        path: PathBuf,
    },
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        if let Commands::InitConfig { path } = &self.command {
            return Engine::init_config(path);
        }

        let engine = Engine::new(self.config.as_deref())?;

        match self.command {
            Commands::Extract { source, extract_dir, comments, force } => {
                engine.extract(source, extract_dir, comments, force).map(|_| ())
            }
            Commands::Generate { source, extract_dir, output, force } => {
                engine.generate(source, extract_dir, output, force).map(|_| ())
            }
            Commands::Prune { extract_dir, dry_run } => {
                engine.prune(extract_dir, dry_run).map(|_| ())
            }
            Commands::ListParsers => {
                engine.list_parsers();
                Ok(())
            }
            Commands::InitConfig { path } => Engine::init_config(&path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_extract_arguments() {
        let cli = Cli::try_parse_from(["docwright", "extract", "src", "--comments", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Extract { source, extract_dir, comments, force } => {
                assert_eq!(source, Some(PathBuf::from("src")));
                assert_eq!(extract_dir, None);
                assert!(comments);
                assert!(!force);
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_init_config_default_path() {
        let cli = Cli::try_parse_from(["docwright", "init-config"]).unwrap();
        match cli.command {
            Commands::InitConfig { path } => assert_eq!(path, PathBuf::from("docwright.toml")),
            _ => panic!("expected init-config"),
        }
    }
}
