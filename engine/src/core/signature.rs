//! Classification of git output text.
//!
//! Git reports several benign conditions through a non-zero exit status. The
//! transaction tells them apart by matching known phrases, case-insensitively.

const NOTHING_TO_COMMIT: &[&str] = &[
    "nothing to commit",
    "nothing added to commit",
    "no changes added to commit",
];

const ALREADY_UP_TO_DATE: &[&str] = &["already up to date", "already up-to-date"];

const NO_MERGE_IN_PROGRESS: &[&str] = &["there is no merge to abort", "merge_head missing"];

/// True if a failed `git commit` only means there was nothing staged.
pub fn is_nothing_to_commit(output: &str) -> bool {
    contains_any(output, NOTHING_TO_COMMIT)
}

/// True if a failed `git commit` reports that a hook rewrote staged files.
pub fn is_hook_rewrite<S: AsRef<str>>(output: &str, markers: &[S]) -> bool {
    let lower = output.to_lowercase();
    markers
        .iter()
        .map(|marker| marker.as_ref().trim().to_lowercase())
        .any(|marker| !marker.is_empty() && lower.contains(&marker))
}

/// True if a failed `git pull` still left the branch current.
pub fn is_already_up_to_date(output: &str) -> bool {
    contains_any(output, ALREADY_UP_TO_DATE)
}

/// True if a failed `git merge --abort` only means no merge was under way.
pub fn is_no_merge_in_progress(output: &str) -> bool {
    contains_any(output, NO_MERGE_IN_PROGRESS)
}

/// Single-line excerpt of command output for log fields.
pub fn summarize(output: &str, max_chars: usize) -> String {
    let joined = output.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.chars().count() <= max_chars {
        return joined;
    }
    let mut cut: String = joined.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn contains_any(output: &str, phrases: &[&str]) -> bool {
    let lower = output.to_lowercase();
    phrases.iter().any(|phrase| lower.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_nothing_to_commit_variants() {
        assert!(is_nothing_to_commit(
            "On branch main\nnothing to commit, working tree clean\n"
        ));
        assert!(is_nothing_to_commit(
            "Nothing added to commit but untracked files present"
        ));
        assert!(is_nothing_to_commit(
            "no changes added to commit (use \"git add\" and/or \"git commit -a\")"
        ));
        assert!(!is_nothing_to_commit("fatal: unable to auto-detect email address"));
    }

    #[test]
    fn detects_hook_rewrite_with_configured_markers() {
        let markers = vec!["files were modified by this hook".to_string()];
        let output = "trim trailing whitespace.................Failed\n\
                      - hook id: trailing-whitespace\n\
                      - exit code: 1\n\
                      - Files were modified by this hook. Additional output:";
        assert!(is_hook_rewrite(output, &markers));
        assert!(!is_hook_rewrite("error: pathspec did not match", &markers));
    }

    #[test]
    fn blank_markers_never_match() {
        assert!(!is_hook_rewrite("anything", &["", "  "]));
    }

    #[test]
    fn detects_already_up_to_date() {
        assert!(is_already_up_to_date("Already up to date."));
        assert!(is_already_up_to_date("Already up-to-date."));
        assert!(!is_already_up_to_date("CONFLICT (content): Merge conflict"));
    }

    #[test]
    fn detects_missing_merge_on_abort() {
        assert!(is_no_merge_in_progress(
            "fatal: There is no merge to abort (MERGE_HEAD missing)."
        ));
        assert!(!is_no_merge_in_progress("error: Entry 'a.json' not uptodate."));
    }

    #[test]
    fn summarize_collapses_whitespace_and_truncates() {
        assert_eq!(summarize("a\n  b\tc", 10), "a b c");
        assert_eq!(summarize("abcdefghij", 4), "abcd…");
    }
}
