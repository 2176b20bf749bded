mod aggregate;
mod cancel;
mod changeset;
mod cli;
mod config;
mod constants;
mod error;
mod git;
mod git_command;
mod source;
mod ui;

use crate::aggregate::{CollectReport, Collector};
use crate::cancel::{CancelToken, Interrupt, InterruptHandler};
use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::constants::{DEFAULT_PREVIEW_CHARS, EXIT_CANCELLED, EXIT_FATAL, EXIT_PARTIAL};
use crate::error::CollectError;
use anyhow::{Context, Result, bail};
use log::debug;

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            let code = match e.downcast_ref::<CollectError>() {
                Some(CollectError::Cancelled) => EXIT_CANCELLED,
                _ => EXIT_FATAL,
            };
            std::process::exit(code);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// returns the process exit code
fn run(cli: &Cli) -> Result<i32> {
    let Some(command) = &cli.command else {
        bail!("no command provided (try `diff` or `gen`)");
    };

    let settings = Settings::resolve(cli, config::load(cli.config.as_deref())?);
    debug!("effective settings: {settings:?}");

    let json = matches!(command, Command::Diff { json: true, .. });
    ui::configure_color(json);

    // Ctrl-C and --timeout both end up as a cancelled collection
    let cancel = match settings.timeout {
        Some(timeout) => CancelToken::with_timeout(timeout),
        None => CancelToken::new(),
    };
    let interrupts = InterruptHandler::new(cancel.clone());
    let handler = interrupts.clone();
    ctrlc::set_handler(move || {
        if handler.interrupt() == Interrupt::Exit {
            std::process::exit(EXIT_CANCELLED);
        }
    })
    .context("failed to install Ctrl-C handler")?;

    let source = settings.backend.build(
        settings.context_lines,
        &settings.git_program,
        settings.git_timeout,
    );
    let collector = Collector::new(source.clone(), settings.collect.clone());

    let spinner = ui::spinner(!json, "collecting staged changes...");
    let result = collector.collect(&settings.repo, &cancel);
    interrupts.collection_finished();
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = result?;

    let branch = source.current_branch(&settings.repo).unwrap_or_else(|e| {
        debug!("could not read current branch: {e}");
        None
    });

    match command {
        Command::Diff {
            name_only,
            preview,
            json,
        } => {
            let preview = preview.map(|chars| chars.unwrap_or(DEFAULT_PREVIEW_CHARS));
            show_diff(&report, branch.as_deref(), *name_only, preview, *json)?;
        }
        Command::Gen { message } => preview_commit(&report, message),
    }

    Ok(if report.is_partial() { EXIT_PARTIAL } else { 0 })
}

/// print the staged diffs (or just their names, or JSON)
fn show_diff(
    report: &CollectReport,
    branch: Option<&str>,
    name_only: bool,
    preview: Option<usize>,
    json: bool,
) -> Result<()> {
    if json {
        return ui::print_json(report, branch);
    }

    if report.is_clean() {
        info!("No staged files found.");
        return Ok(());
    }

    ui::print_summary(report, branch);

    if name_only {
        status!("files captured:");
        for path in report.changes.paths() {
            info!("{path}");
        }
    } else {
        for file in report.changes.files() {
            ui::print_file_diff(file, preview);
        }
    }

    ui::print_errors(&report.errors);
    Ok(())
}

/// show what a commit of the staged files would contain, without committing
fn preview_commit(report: &CollectReport, message: &str) {
    if report.changes.is_empty() {
        if report.errors.is_empty() {
            info!("No staged files found.");
        }
        ui::print_errors(&report.errors);
        return;
    }

    status!("commit message: {message}");
    info!();
    status!("files:");
    ui::print_file_list(report.changes.files());
    info!();
    ui::print_errors(&report.errors);
    warning!("dry run: no commit was created");
}
