//! CLI entry point for the transcode queue
//!
//! Collects candidate files, routes them through the queue pool and prints
//! the run report. An interrupt (Ctrl-C) stops the process at once; encodes
//! in flight leave their temporary output behind.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use transcode_queue::{
    cleanup_queuefile, expand_inputs, files_from_file, format_completion_report, Candidate,
    Config, PoolOptions, ProcessorSet, ProfileCatalog, QueuePool,
};

/// Batch transcoder driven by profiles and rules
#[derive(Parser, Debug)]
#[command(name = "transcode-queue")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files or directories to transcode
    files: Vec<PathBuf>,

    /// Read paths to transcode from a file, one per line
    #[arg(long)]
    from_file: Option<PathBuf>,

    /// Use this profile for every file instead of matching rules
    #[arg(short, long)]
    profile: Option<String>,

    /// Mixins to add to the profile, comma separated
    #[arg(short, long, value_delimiter = ',')]
    mixins: Vec<String>,

    /// Keep source files after a successful encode
    #[arg(short, long)]
    keep: bool,

    /// Show what would be done without encoding anything
    #[arg(long)]
    dry_run: bool,

    /// Run every queue with a single worker
    #[arg(short, long)]
    sequential: bool,

    /// Path to the configuration file
    #[arg(short = 'y', long, default_value = "transcode.toml")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "transcode_queue=debug,transcode_queue_cli=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    if let Some(name) = &args.profile {
        if !config.has_profile(name) {
            eprintln!(
                "Profile \"{}\" is not defined. Available: {}",
                name,
                config.profile_names().join(", ")
            );
            return ExitCode::FAILURE;
        }
    }

    // explicit files win, then --from-file, then the configured default queue file
    let mut paths = expand_inputs(
        &args.files,
        &config.settings.extensions,
        config.settings.recursive,
    );
    let mut queue_file = None;
    if let Some(file) = &args.from_file {
        queue_file = Some(file.clone());
    } else if paths.is_empty() {
        queue_file = config.settings.default_queue_file.clone();
    }
    if let Some(file) = &queue_file {
        match files_from_file(file) {
            Ok(listed) => paths.extend(listed),
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if paths.is_empty() {
        println!("Nothing to do");
        return ExitCode::SUCCESS;
    }

    let candidates: Vec<Candidate> = paths
        .into_iter()
        .map(|path| Candidate {
            path,
            forced_profile: args.profile.clone(),
            mixins: args.mixins.clone(),
        })
        .collect();

    let processors = ProcessorSet::from_settings(&config.settings);
    let options = PoolOptions {
        dry_run: args.dry_run,
        keep_original: args.keep,
        sequential: args.sequential,
        poll_interval: Duration::from_millis(config.settings.status_poll_ms),
    };
    let mut pool = QueuePool::new(config, processors, options);

    match pool.enqueue_files(&candidates) {
        Ok(0) => tracing::info!("no files queued"),
        Ok(queued) => tracing::info!(queued, "files queued"),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    let summary = pool.start();

    if !args.dry_run && !summary.completed.is_empty() {
        println!("Completed:");
        for line in format_completion_report(&summary.completed) {
            println!("{}", line);
        }
    }
    for line in summary.summary_lines() {
        println!("{}", line);
    }
    if !summary.errors.is_empty() {
        println!("Errors:");
        for error in &summary.errors {
            println!("  {}", error);
        }
    }

    if let Some(file) = &queue_file {
        if let Err(e) = cleanup_queuefile(file, &summary.completed_paths(), args.dry_run) {
            eprintln!("{}", e);
        }
    }

    ExitCode::SUCCESS
}
