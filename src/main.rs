mod cli;
mod cloud;
mod commands;
mod config;
mod params;
mod paths;
mod prompt;
mod store;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };

    match run(&ctx, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&ctx, &err),
    }
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Create(args) => commands::create::run(ctx, &args),
        Command::Update(args) => commands::update::run(ctx, &args),
        Command::Show(args) => commands::show::run(ctx, &args),
        Command::List => commands::list::run(ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "akscli", &mut io::stdout());
            Ok(())
        }
    }
}

/// Print a failed command's error and pick the exit code.
///
/// A declined confirmation is not a failure.
fn report(ctx: &Context, err: &anyhow::Error) -> ExitCode {
    let Some(decorator_err) = err.downcast_ref::<decorator::Error>() else {
        ui::error(&format!("{err:#}"));
        return ExitCode::FAILURE;
    };

    let category = decorator_err.category();
    if category.is_benign() {
        if !ctx.quiet {
            ui::warn(&format!("{}: {}", category.description(), category.advice()));
        }
        return ExitCode::SUCCESS;
    }

    ui::error(&format!("{}: {err:#}", category.description()));
    if ctx.verbose > 1 {
        ui::dim(&format!("{err:?}"));
    }
    ui::dim(category.advice());
    ExitCode::FAILURE
}
