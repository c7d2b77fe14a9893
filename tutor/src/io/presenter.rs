//! Presentation layer seam.
//!
//! The core only decides *what* to show and in which order; a [`Presenter`]
//! decides how it looks. [`TerminalPresenter`] writes colored text to stdout.

use std::path::PathBuf;

use colored::Colorize;

use crate::core::progress::{Progress, remaining_message};
use crate::core::types::{FailKind, RunMode};
use crate::io::solutions::SolutionFile;
use crate::io::text::{RenderedText, TextKind};

/// Problems as shown by the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuView {
    pub title: String,
    pub subtitle: Option<String>,
    pub entries: Vec<MenuEntry>,
    pub has_help: bool,
    pub has_credits: bool,
    pub has_prerequisites: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub name: String,
    pub completed: bool,
}

/// Where to point the learner after a problem statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemFooter {
    pub app_name: String,
    /// Offline guide entry page (without extension).
    pub guide_index: PathBuf,
}

pub trait Presenter {
    /// An attempt is about to run.
    fn starting(&mut self, mode: RunMode, problem: &str);
    fn passed(&mut self, problem: &str);
    /// Reference solutions, in display order.
    fn solutions(&mut self, files: &[SolutionFile]);
    fn progress(&mut self, progress: Progress);
    fn failed(&mut self, problem: &str, kind: FailKind);
    fn setup_failed(&mut self, err: &anyhow::Error);
    fn problem_banner(&mut self, problem: &str);
    fn problem_footer(&mut self, footer: &ProblemFooter);
    fn menu(&mut self, menu: &MenuView);
    fn text(&mut self, text: &RenderedText);
    fn line(&mut self, line: &str);
}

/// Colored stdout presenter.
#[derive(Debug, Clone)]
pub struct TerminalPresenter {
    app_name: String,
    width: usize,
}

impl TerminalPresenter {
    pub fn new(app_name: impl Into<String>, width: usize) -> Self {
        Self {
            app_name: app_name.into(),
            width,
        }
    }

    fn separator(&self) -> String {
        "-".repeat(self.width)
    }
}

impl Presenter for TerminalPresenter {
    fn starting(&mut self, mode: RunMode, problem: &str) {
        println!(
            "{}\n",
            format!("{} \"{}\"...", mode.verb(), problem).yellow().bold()
        );
    }

    fn passed(&mut self, problem: &str) {
        println!("{}", "# PASS".green().bold());
        println!(
            "{}",
            format!("\nYour solution to {problem} passed!").green().bold()
        );
    }

    fn solutions(&mut self, files: &[SolutionFile]) {
        for file in files {
            println!("{}", file.code_block());
        }
    }

    fn progress(&mut self, progress: Progress) {
        match progress {
            Progress::Finished => println!("You've finished all the challenges! Hooray!\n"),
            Progress::Remaining(remaining) => {
                println!("{}\n", self.separator());
                println!("{}", remaining_message(remaining));
                println!("Type `{}` to show the menu.\n", self.app_name);
                println!("{}\n", self.separator());
            }
        }
    }

    fn failed(&mut self, problem: &str, kind: FailKind) {
        println!("{}", "# FAIL".red().bold());
        match kind {
            FailKind::Custom => println!("\nYour solution to {problem} didn't pass. Try again!"),
            FailKind::OutputMismatch => println!(
                "\nYour solution to {problem} didn't match the expected output.\nTry again!"
            ),
        }
        println!("{}\n", self.separator());
    }

    fn setup_failed(&mut self, err: &anyhow::Error) {
        eprintln!("{} {err:#}", "An error occurred during setup:".red());
    }

    fn problem_banner(&mut self, problem: &str) {
        let rule = "#".repeat(69);
        println!("\n  {rule}");
        println!("{}", center(self.width, &format!("~~  {problem}  ~~")));
        println!("  {rule}\n");
    }

    fn problem_footer(&mut self, footer: &ProblemFooter) {
        println!(
            "{}",
            format!(
                "  » To verify your work for this problem, run: `{name} verify`.\n  » Run `{name}` again to launch menu & go onto next challenge\n",
                name = footer.app_name
            )
            .green()
            .bold()
        );
        println!("{}", "  GUIDE\n".green().bold());
        println!(
            "  » To view guide offline, copy this address to your browser:\n  » {}.html\n",
            footer.guide_index.display()
        );
    }

    fn menu(&mut self, menu: &MenuView) {
        println!("{}", center(self.width, &menu.title).bold());
        if let Some(subtitle) = &menu.subtitle {
            println!("{}", center(self.width, subtitle).dimmed());
        }
        println!("{}", self.separator());
        for entry in &menu.entries {
            if entry.completed {
                println!("  {} {}", entry.name, "[COMPLETED]".green());
            } else {
                println!("  {}", entry.name);
            }
        }
        println!("{}", self.separator());
        println!("  Select a problem with `{} select <name>`.", self.app_name);
        if menu.has_help {
            println!("  {} help", self.app_name);
        }
        if menu.has_credits {
            println!("  {} credits", self.app_name);
        }
        if menu.has_prerequisites {
            println!("  {} prerequisites", self.app_name);
        }
        println!();
    }

    fn text(&mut self, text: &RenderedText) {
        match text.kind {
            TextKind::Plain => println!("{}", text.body),
            TextKind::Markdown => {
                for line in text.body.lines() {
                    match markdown_heading(line) {
                        Some(heading) => println!("{}", heading.bold()),
                        None => println!("{line}"),
                    }
                }
            }
        }
    }

    fn line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Text of an ATX heading (`# Title` .. `###### Title`), markers stripped.
pub fn markdown_heading(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches('#');
    let level = line.len() - rest.len();
    if !(1..=6).contains(&level) {
        return None;
    }
    rest.strip_prefix(' ').map(str::trim)
}

/// Left-pad `text` so it sits in the middle of `width` columns.
pub fn center(width: usize, text: &str) -> String {
    let len = text.chars().count();
    let pad = width.saturating_sub(len) / 2;
    format!("{}{}", " ".repeat(pad), text)
}
