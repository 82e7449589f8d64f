// Copyright 2024 SAP SE
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(clippy::pedantic)]

mod checker;
mod config;
mod decorate;
mod manifest;
mod registry;
mod resolve;
mod validate;

use std::collections::BTreeMap;
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::Context;
use clap::builder::styling::Style;
use clap::{Parser, Subcommand};
use config::{Defaults, ImageConfig};
use registry::EcrConnector;
use tracing::error;
use tracing_subscriber::EnvFilter;

const BOLD_UNDERLINE: Style = Style::new().bold().underline();
static ENV_HELP: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{BOLD_UNDERLINE}Environment variables:{BOLD_UNDERLINE:#}
  LOG_LEVEL                    Log filter for the JSON logs on stderr (default: error)
  GITHUB_OUTPUT                File the manifest is appended to with --github-output
  AWS_*                        Standard AWS SDK credential and profile settings
"
    )
});

/// Finds container images whose tag does not exist yet in their ECR registries
#[derive(Parser)]
#[command(version, about, long_about = None, after_help = ENV_HELP.to_string(), propagate_version = true)]
struct Cli {
    /// Root directory which contains the image directories, each with its own config.yml
    #[arg(long, default_value = ".", env = "IMAGE_DIRECTORY", global = true)]
    image_directory: PathBuf,

    /// Config file with the default account, region and role
    #[arg(long, default_value = "config-defaults.yml", env = "DEFAULTS_FILE", global = true)]
    defaults_file: PathBuf,

    /// Also append the manifest line to $GITHUB_OUTPUT
    #[arg(long, global = true)]
    github_output: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Checks every target in ECR and prints the ones that need to be built
    #[command(after_help = ENV_HELP.to_string())]
    Run,

    /// Resolves and validates all image configs without contacting ECR
    Lint,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_logging()?;
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run => {
            let mut repos = load(&cli.defaults_file, &cli.image_directory)?;
            checker::check_all(Arc::new(EcrConnector), &mut repos)
                .await
                .context("while checking ECR image tags")?;

            let line = manifest::render(&manifest::missing_targets(&repos))?;
            println!("{line}");
            if cli.github_output {
                append_github_output(&line)?;
            }
        },
        Commands::Lint => {
            let repos = load(&cli.defaults_file, &cli.image_directory)?;
            let target_count: usize = repos.values().map(|repo| repo.targets().len()).sum();
            println!("{} images, {target_count} targets valid", repos.len());
        },
    }

    Ok(())
}

/// Loads, resolves, validates and decorates every image config.
fn load(defaults_file: &Path, image_directory: &Path) -> Result<BTreeMap<PathBuf, ImageConfig>, anyhow::Error> {
    let defaults = Defaults::load(defaults_file)?;
    let repos = config::discover(image_directory)
        .with_context(|| format!("while reading image configs under {}", image_directory.display()))?;

    let mut repos = resolve::resolve_all(&defaults, repos);
    if let Err(err) = validate::validate(&repos) {
        error!(path = %err.path().display(), field = err.field(), "invalid image config");
        return Err(err).context("while validating config");
    }
    decorate::decorate(&mut repos);

    Ok(repos)
}

fn init_logging() -> Result<(), anyhow::Error> {
    let level = env::var("LOG_LEVEL").unwrap_or_default();
    let filter = if level.is_empty() {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_new(&level).with_context(|| format!("unable to parse LOG_LEVEL {level:?}"))?
    };

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn append_github_output(line: &str) -> Result<(), anyhow::Error> {
    let path = env::var("GITHUB_OUTPUT").context("cannot find GITHUB_OUTPUT")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot write to $GITHUB_OUTPUT {path}"))?;
    writeln!(file, "{line}").with_context(|| format!("cannot write to $GITHUB_OUTPUT {path}"))?;

    Ok(())
}
