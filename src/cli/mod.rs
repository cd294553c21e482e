use crate::options::InstallOptions;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod config;
mod install;
pub mod logging;
mod progress;

#[derive(Parser, Debug)]
#[command(
    name = "nestpm",
    version,
    about = "npm-compatible installer with a shared content-addressable package store",
    long_about = "nestpm resolves package.json dependencies, dedupes them into a flat node_modules and\nhard-links package files from a shared store.\n\nExamples:\n  nestpm install\n  nestpm install --quick --cas-dir ~/.cache/nestpm/cas\n  nestpm install --override left-pad=https://example.com/left-pad.tgz\n  nestpm show-options"
)]
pub struct NestCli {
    #[command(subcommand)]
    pub(crate) command: Commands,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the dependencies of the project in --cwd
    #[command(alias = "i")]
    Install {
        #[command(flatten)]
        args: InstallArgs,
        /// Disable progress rendering
        #[arg(long)]
        no_progress: bool,
    },
    /// Print the options an install would run with, as JSON
    ShowOptions {
        #[command(flatten)]
        args: InstallArgs,
    },
}

/// Flags that overlay `.nestpm.json`.
#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,
    #[arg(long)]
    pub registry_url: Option<String>,
    /// Package-info cache directory
    #[arg(long)]
    pub info_dir: Option<PathBuf>,
    /// Content-addressable package store directory
    #[arg(long)]
    pub cas_dir: Option<PathBuf>,
    /// Replace a dependency's spec everywhere (repeatable)
    #[arg(long = "override", value_name = "NAME=SPEC", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,
    /// Never install this package (repeatable)
    #[arg(long, value_name = "NAME")]
    pub ignore: Vec<String>,
    /// Reinstall packages that are already up to date
    #[arg(long)]
    pub full: bool,
    /// Skip the install when direct dependencies already match
    #[arg(long)]
    pub quick: bool,
    #[arg(long)]
    pub no_dedupe: bool,
    /// Keep package directories the tree no longer needs
    #[arg(long)]
    pub no_clean: bool,
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, spec)) if !name.is_empty() && !spec.is_empty() => Ok((name.to_string(), spec.to_string())),
        _ => Err(format!("expected NAME=SPEC, got '{raw}'")),
    }
}

impl InstallArgs {
    /// Options from the project's config file with these flags on top.
    pub async fn resolve(&self) -> Result<InstallOptions> {
        let cwd = match &self.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("read current directory")?,
        };
        let mut options = config::load(&cwd).await?;
        self.apply(&mut options);
        Ok(options)
    }

    pub fn apply(&self, options: &mut InstallOptions) {
        if let Some(url) = &self.registry_url {
            options.registry_url = url.clone();
        }
        if let Some(dir) = &self.info_dir {
            options.info_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.cas_dir {
            options.cas_dir = Some(dir.clone());
        }
        options.overrides.extend(self.overrides.iter().cloned());
        options.ignore.extend(self.ignore.iter().cloned());
        options.full |= self.full;
        options.quick |= self.quick;
        if self.no_dedupe {
            options.dedupe = false;
        }
        if self.no_clean {
            options.clean = false;
        }
    }
}

impl NestCli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Install { args, no_progress } => install::run(args.resolve().await?, !no_progress).await,
            Commands::ShowOptions { args } => {
                let options = args.resolve().await?;
                println!("{}", serde_json::to_string_pretty(&options)?);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_overlay_config() {
        let cli = NestCli::parse_from([
            "nestpm",
            "install",
            "--override",
            "left-pad=https://example.com/lp.tgz",
            "--ignore",
            "fsevents",
            "--no-dedupe",
            "-v",
        ]);
        assert_eq!(cli.verbose, 1);
        let Commands::Install { args, no_progress } = cli.command else {
            panic!("expected install");
        };
        assert!(!no_progress);

        let mut options = InstallOptions::new("/p");
        options.overrides.insert("a".into(), "^1.0.0".into());
        args.apply(&mut options);
        assert_eq!(options.overrides.len(), 2);
        assert!(options.ignore.contains("fsevents"));
        assert!(!options.dedupe);
        assert!(options.clean);
    }

    #[test]
    fn rejects_override_without_spec() {
        assert!(parse_override("left-pad").is_err());
        assert!(parse_override("=1.0.0").is_err());
        assert_eq!(parse_override("@s/x=^2").unwrap(), ("@s/x".to_string(), "^2".to_string()));
    }
}
