//! Completion bookkeeping rules.

/// Where the learner stands after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Every problem in the catalog is completed.
    Finished,
    /// This many problems are left.
    Remaining(usize),
}

impl Progress {
    pub fn from_counts(total: usize, completed: usize) -> Self {
        match total.saturating_sub(completed) {
            0 => Progress::Finished,
            remaining => Progress::Remaining(remaining),
        }
    }
}

/// Add `name` to the completed list with set semantics.
///
/// Existing entries keep their position; a name already present is not
/// appended again.
pub fn record_completion(completed: Option<Vec<String>>, name: &str) -> Vec<String> {
    let mut completed = completed.unwrap_or_default();
    if !completed.iter().any(|done| done == name) {
        completed.push(name.to_string());
    }
    completed
}

/// "You have 1 challenge left." / "You have 3 challenges left."
pub fn remaining_message(remaining: usize) -> String {
    let noun = if remaining == 1 { "challenge" } else { "challenges" };
    format!("You have {remaining} {noun} left.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_twice_keeps_one_entry_in_place() {
        let first = record_completion(None, "Get Git");
        let second = record_completion(Some(first), "Repository");
        let again = record_completion(Some(second), "Get Git");
        assert_eq!(again, vec!["Get Git".to_string(), "Repository".to_string()]);
    }

    #[test]
    fn remaining_counts_catalog_minus_completed() {
        assert_eq!(Progress::from_counts(5, 4), Progress::Remaining(1));
        assert_eq!(Progress::from_counts(5, 5), Progress::Finished);
        assert_eq!(Progress::from_counts(2, 3), Progress::Finished);
    }

    #[test]
    fn remaining_message_pluralizes() {
        assert_eq!(remaining_message(1), "You have 1 challenge left.");
        assert_eq!(remaining_message(2), "You have 2 challenges left.");
        assert_eq!(remaining_message(0), "You have 0 challenges left.");
    }
}
