//! Command-line tutorial runner.
//!
//! Shows the problem menu, selects the active problem and verifies the
//! learner's work against the reference solution. Progress is kept in a
//! per-tutorial data directory so it survives across invocations.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use tutor::controller::{Action, ActionOutcome, Controller};
use tutor::exit_codes;
use tutor::io::presenter::TerminalPresenter;
use tutor::io::setup::TomlSetupLoader;
use tutor::io::verifier::ProcessVerifier;
use tutor::logging;
use tutor::select::problem_name;
use tutor::tutorial::Tutorial;
use tutor::verify::NoActiveProblemError;

#[derive(Parser)]
#[command(
    name = "tutor",
    about = "Interactive command-line tutorials",
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct Cli {
    /// Tutorial directory containing `tutorial.toml`.
    #[arg(long, global = true, env = "TUTOR_APP_DIR", default_value = ".")]
    app_dir: PathBuf,

    /// Where learner progress is stored. Defaults to `~/.config/<name>`.
    #[arg(long, global = true, env = "TUTOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print the tutorial version.
    #[arg(short = 'v', long = "version")]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show the menu of problems (default).
    Menu,
    /// Print usage and the tutorial's help text.
    Help,
    /// Serve the guide on a local port.
    Server {
        /// Guide language, e.g. `ja`.
        lang: Option<String>,
    },
    /// Print the tutorial credits.
    Credits,
    /// Print what the learner needs before starting.
    Prerequisites,
    /// Print the tutorial version.
    Version,
    /// List every problem in order.
    List,
    /// Print the active problem.
    Current,
    /// Select a problem and print its statement.
    #[command(alias = "print")]
    Select {
        /// Problem name; may be given as several words. Defaults to the active problem.
        name: Vec<String>,
    },
    /// Verify the learner's program against the reference solution.
    Verify {
        /// Program to verify instead of the problem's default entry.
        file: Option<PathBuf>,
    },
    /// Run the learner's program without comparing output.
    Run {
        file: Option<PathBuf>,
    },
}

impl Cli {
    fn action(self) -> Action {
        if self.version {
            return Action::Version;
        }
        match self.command.unwrap_or(Command::Menu) {
            Command::Menu => Action::Menu,
            Command::Help => Action::Help,
            Command::Server { lang } => Action::Server { lang },
            Command::Credits => Action::Credits,
            Command::Prerequisites => Action::Prerequisites,
            Command::Version => Action::Version,
            Command::List => Action::List,
            Command::Current => Action::Current,
            Command::Select { name } => Action::Select {
                name: problem_name(&name),
            },
            Command::Verify { file } => Action::Verify { file },
            Command::Run { file } => Action::Run { file },
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(outcome) => {
            debug!(?outcome, "action finished");
            std::process::exit(exit_codes::OK);
        }
        Err(err) => {
            eprintln!("{err:#}");
            let code = if err.downcast_ref::<NoActiveProblemError>().is_some() {
                exit_codes::NO_ACTIVE_PROBLEM
            } else {
                exit_codes::INVALID
            };
            std::process::exit(code);
        }
    }
}

fn run() -> Result<ActionOutcome> {
    let cli = Cli::parse();
    let tutorial = Tutorial::open(&cli.app_dir, cli.data_dir.clone())?;
    let presenter = TerminalPresenter::new(tutorial.config.name.clone(), tutorial.config.width);
    let verifier = ProcessVerifier::new(&tutorial.config.verify);
    let mut controller = Controller::new(tutorial, TomlSetupLoader, verifier, presenter);
    controller.dispatch(cli.action())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_shows_menu() {
        let cli = Cli::parse_from(["tutor"]);
        assert_eq!(cli.action(), Action::Menu);
    }

    #[test]
    fn version_flag_wins() {
        let cli = Cli::parse_from(["tutor", "-v"]);
        assert_eq!(cli.action(), Action::Version);
    }

    #[test]
    fn select_joins_words_and_print_is_an_alias() {
        let cli = Cli::parse_from(["tutor", "select", "Get", "Git"]);
        assert_eq!(
            cli.action(),
            Action::Select {
                name: Some("Get Git".to_string())
            }
        );
        let cli = Cli::parse_from(["tutor", "print"]);
        assert_eq!(cli.action(), Action::Select { name: None });
    }

    #[test]
    fn verify_takes_optional_file_and_global_dirs() {
        let cli = Cli::parse_from([
            "tutor",
            "verify",
            "mine.sh",
            "--app-dir",
            "/app",
            "--data-dir",
            "/data",
        ]);
        assert_eq!(cli.app_dir, PathBuf::from("/app"));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/data")));
        assert_eq!(
            cli.action(),
            Action::Verify {
                file: Some(PathBuf::from("mine.sh"))
            }
        );
    }

    #[test]
    fn server_accepts_language() {
        let cli = Cli::parse_from(["tutor", "server", "ja"]);
        assert_eq!(
            cli.action(),
            Action::Server {
                lang: Some("ja".to_string())
            }
        );
    }
}
