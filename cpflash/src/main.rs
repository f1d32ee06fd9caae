use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use cpflash_core::deliver::FsCopier;
use cpflash_core::reset::SerialPortOpener;
use cpflash_core::toolchain::ProcessRunner;
use cpflash_core::volume::DEFAULT_LABELS;
use cpflash_core::{Action, FlashOptions, FlashState, Flasher, Project, platform};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(unix)]
use libc::ECHOCTL;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use termios::{TCSANOW, Termios, tcsetattr};

#[derive(Parser)]
#[command(name = "cpflash")]
#[command(about = "Build and copy sketches and scripts onto UF2 and CircuitPython boards", version)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (if needed) and deliver a file to the board
    Flash {
        /// Source file, absolute or relative to the project
        #[arg(default_value = "main.py")]
        file: PathBuf,

        /// What to do with the file
        #[arg(short, long, default_value_t = Action::default())]
        action: Action,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Deliver to this volume instead of looking for one
        #[arg(short, long, env = "CPFLASH_TARGET")]
        target: Option<PathBuf>,

        /// Directory containing the `arduino` compiler
        #[arg(long, env = "CPFLASH_COMPILER_DIR")]
        compiler_dir: Option<PathBuf>,

        /// Directory containing `uf2conv.py`
        #[arg(long, env = "CPFLASH_CONVERTER_DIR")]
        converter_dir: Option<PathBuf>,

        /// Directory containing `mpy-cross`
        #[arg(long, env = "CPFLASH_MPY_CROSS_DIR")]
        mpy_cross_dir: Option<PathBuf>,

        /// Serial port used to reset the board into its bootloader
        #[arg(long, env = "CPFLASH_PORT", default_value = platform::DEFAULT_CONTROL_PORT)]
        port: String,

        /// Seconds to wait for the bootloader volume to mount
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// List mounted board volumes
    List,
}

/// A helper struct that, on Unix, disables `ECHOCTL` for the terminal.
///
/// `ECHOCTL` is the terminal flag that causes Ctrl+C to be printed as `^C`.
/// By disabling it, we can have a cleaner exit when the user cancels the
/// wait for a board, as the `ctrlc` handler ends it on its own.
/// The original terminal state is restored when this struct is dropped.
struct TermRestorer {
    #[cfg(unix)]
    original_termios: Option<Termios>,
}

impl TermRestorer {
    fn new() -> Self {
        #[cfg(unix)]
        {
            let fd = stdout().as_raw_fd();
            if !stdout().is_terminal() {
                return Self {
                    original_termios: None,
                };
            }

            let original_termios = Termios::from_fd(fd).ok().filter(|original| {
                let mut quiet = *original;
                // Disable printing of control characters.
                quiet.c_lflag &= !ECHOCTL;
                tcsetattr(fd, TCSANOW, &quiet).is_ok()
            });
            Self { original_termios }
        }
        #[cfg(not(unix))]
        {
            // This is a no-op on non-Unix platforms.
            Self {}
        }
    }
}

impl Drop for TermRestorer {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(ref original_termios) = self.original_termios {
            let fd = stdout().as_raw_fd();
            // Restore the original terminal settings.
            tcsetattr(fd, TCSANOW, original_termios).ok();
        }
    }
}

/// Maps the `-v` count to the default log level.
fn log_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Logger configured from the `-v` count; `RUST_LOG` overrides it.
fn log_builder(verbose: u8) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log_level(verbose)).parse_default_env();
    builder
}

fn init_logging(verbose: u8) {
    log_builder(verbose).init();
}

/// Spinner message for each workflow state.
fn state_message(state: FlashState) -> &'static str {
    match state {
        FlashState::Compiling => "Compiling",
        FlashState::Converting => "Converting",
        FlashState::AwaitingVolume => "Waiting for board volume",
        FlashState::Copying => "Copying",
        FlashState::Done => "Done.",
        FlashState::Failed => "❌ Operation failed.",
    }
}

fn main() -> Result<()> {
    // This guard will be dropped when main() exits, restoring the terminal.
    let _term_restorer = TermRestorer::new();

    // This flag allows for graceful cancellation of the volume wait.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Set up the Ctrl+C handler to toggle the `running` flag.
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Flash {
            file,
            action,
            project,
            target,
            compiler_dir,
            converter_dir,
            mpy_cross_dir,
            port,
            timeout,
        } => {
            let project = Project {
                root: project,
                source: file,
                compiler_dir,
                converter_dir,
                script_compiler_dir: mpy_cross_dir,
                target,
                verbose: cli.verbose,
            };
            let options = FlashOptions {
                port,
                poll_timeout: Duration::from_secs(timeout),
                ..FlashOptions::default()
            };

            println!("  Action: {}", style(action).cyan());
            println!("  Source: {}", style(project.source_path().display()).cyan());
            println!();

            let volumes = platform::default_probe(DEFAULT_LABELS);
            let flasher = Flasher::new(&ProcessRunner, &SerialPortOpener, &*volumes, &FsCopier)
                .with_options(options);

            // Hide the spinner when logs go to the same terminal at high verbosity.
            let spinner = if cli.verbose < 2 && stdout().is_terminal() {
                ProgressBar::new_spinner()
            } else {
                ProgressBar::hidden()
            };
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{prefix:12} [{elapsed_precise}] {spinner:.blue} {msg}")
                    .unwrap()
                    .tick_chars("■□▪▫ "),
            );
            spinner.set_prefix(action.to_string());
            spinner.enable_steady_tick(Duration::from_millis(100));

            let on_state = |state: FlashState| match state {
                FlashState::Done => spinner.finish_with_message(state_message(state)),
                FlashState::Failed => spinner.abandon_with_message(state_message(state)),
                _ => spinner.set_message(state_message(state)),
            };

            let report = flasher
                .run(action, &project, running, on_state)
                .with_context(|| format!("{action} of {} failed", project.source.display()))?;

            println!(
                "\n✨ Successfully delivered {} to {}.",
                style(report.artifact.display()).cyan(),
                style(report.destination.display()).cyan()
            );
        }
        Commands::List => {
            let volumes = platform::mounted_volumes(DEFAULT_LABELS);
            if volumes.is_empty() {
                println!("No board volumes found.");
                return Ok(());
            }

            println!("Found {} board volumes:", volumes.len());
            println!("\n  {:<12} {}", "LABEL", "LOCATION");
            println!("  {:-<12} {:-<20}", "", "");
            for volume in volumes {
                println!("  {volume}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Metadata};

    fn enabled(logger: &env_logger::Logger, level: Level) -> bool {
        logger.enabled(
            &Metadata::builder()
                .level(level)
                .target("cpflash_core::toolchain")
                .build(),
        )
    }

    #[test]
    fn verbosity_raises_the_logger_filter() {
        let quiet = log_builder(0).build();
        assert!(enabled(&quiet, Level::Warn));
        assert!(!enabled(&quiet, Level::Info));

        let debug = log_builder(2).build();
        assert!(enabled(&debug, Level::Debug));
        assert!(!enabled(&debug, Level::Trace));

        let trace = log_builder(5).build();
        assert!(enabled(&trace, Level::Trace));
    }

    #[test]
    fn debug_records_pass_after_init_with_two_verbose_flags() {
        init_logging(2);
        assert!(log::log_enabled!(target: "cpflash_core::toolchain", Level::Debug));
    }
}
