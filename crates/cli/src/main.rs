//! dmake - build, tag, and push a set of related container images from one
//! declarative configuration file.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dmake_lib::cleanup::ArtifactRegistry;
use dmake_lib::engine::docker::DockerEngine;
use dmake_lib::error::RunError;
use dmake_lib::manifest::BuildManifest;
use dmake_lib::release::ReleaseContext;
use dmake_lib::run::{self, RunOptions, RunSummary};

mod output;

use output::{short_image_id, symbols};

/// Build, tag, and push a set of related container images.
#[derive(Parser)]
#[command(name = "dmake")]
#[command(version, about)]
struct Cli {
  /// Path to the build configuration file
  #[arg(short = 'f', long = "file", default_value = ".docker-make.yml")]
  file: PathBuf,

  /// Build only these targets and their dependencies (default: all)
  builds: Vec<String>,

  /// Print the equivalent build commands without contacting the daemon
  #[arg(short = 'd', long)]
  dry_run: bool,

  /// Skip the push stage entirely
  #[arg(long)]
  no_push: bool,

  /// Enable debug-level logging
  #[arg(short, long)]
  verbose: bool,
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Err(err) = cmd_build(&cli) {
    output::print_error(&format!("{err:#}"));
    std::process::exit(1);
  }
}

fn init_logging(verbose: bool) {
  let fallback = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .with_writer(std::io::stderr)
    .init();
}

fn cmd_build(cli: &Cli) -> Result<()> {
  let manifest = BuildManifest::load(&cli.file).map_err(RunError::from)?;
  let ctx = ReleaseContext::capture(&manifest.tag_names);

  if cli.dry_run {
    let lines = run::dry_run(&manifest, &ctx, &cli.builds)?;
    for line in &lines {
      println!("{line}");
    }
    output::print_success(&format!("dry run complete: {} build(s)", lines.len()));
    return Ok(());
  }

  let engine = DockerEngine::connect().context("failed to connect to the container daemon")?;
  let runtime = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
  let options = RunOptions { no_push: cli.no_push };
  let mut artifacts = ArtifactRegistry::new();
  let started = Instant::now();

  let result = runtime.block_on(run::execute(
    &manifest,
    &ctx,
    &engine,
    &cli.builds,
    &options,
    &mut artifacts,
  ));
  artifacts.drain();
  let summary = result?;

  print_summary(&summary, cli.no_push, started.elapsed());
  Ok(())
}

fn print_summary(summary: &RunSummary, no_push: bool, elapsed: Duration) {
  println!();
  println!("Build complete!");
  for record in &summary.records {
    let image = record.final_image.as_deref().unwrap_or("<none>");
    println!("  {} {} {} {}", symbols::SUCCESS, record.name, symbols::ARROW, short_image_id(image));
  }
  println!("  Images built: {}", summary.images_built());
  println!("  Tags applied: {}", summary.tags_applied());
  if no_push {
    println!("  Pushes skipped (--no-push)");
  } else {
    println!("  Images pushed: {}", summary.images_pushed());
  }
  println!(
    "  Elapsed: {}",
    humantime::format_duration(Duration::from_secs(elapsed.as_secs()))
  );
}
