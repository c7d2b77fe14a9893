//! `select`: make a problem the active one and print its statement.

use anyhow::Result;
use tracing::{info, instrument};

use crate::io::presenter::{Presenter, ProblemFooter};
use crate::io::text::{problem_text_path, render_text_file};
use crate::tutorial::Tutorial;
use crate::verify::NoActiveProblemError;

/// Join the words given on the command line into one problem name.
///
/// `select Get Git` and `select "Get Git"` name the same problem.
pub fn problem_name(words: &[String]) -> Option<String> {
    let name = words.join(" ");
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Select `name`, or re-print the active problem when `name` is absent.
pub fn select_or_current<P: Presenter>(
    tutorial: &Tutorial,
    presenter: &mut P,
    name: Option<&str>,
) -> Result<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => tutorial.store.current().ok_or(NoActiveProblemError)?,
    };
    select_problem(tutorial, presenter, &name)
}

/// Persist `name` as current, then present its statement.
///
/// `current` is written before anything is printed so an interrupted
/// presentation still leaves the learner on the new problem.
#[instrument(skip(tutorial, presenter))]
pub fn select_problem<P: Presenter>(tutorial: &Tutorial, presenter: &mut P, name: &str) -> Result<()> {
    tutorial.store.set_current(name)?;
    info!("current problem updated");
    presenter.problem_banner(name);

    let dir = tutorial.catalog.directory_for(name);
    let text = render_text_file(
        &tutorial.config.name,
        &tutorial.paths.app_dir,
        &problem_text_path(&dir),
    )?;
    presenter.text(&text);
    presenter.problem_footer(&ProblemFooter {
        app_name: tutorial.config.name.clone(),
        guide_index: tutorial.paths.guide_dir.join("index"),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_join_into_name() {
        let words = vec!["Get".to_string(), "Git".to_string()];
        assert_eq!(problem_name(&words).as_deref(), Some("Get Git"));
        assert_eq!(problem_name(&[]), None);
        assert_eq!(problem_name(&["  ".to_string()]), None);
    }
}
