//! Changeset derivation from the sync tool's verbose log.
//!
//! The text format is owned by the tool and may drift between releases, so
//! every assumption about it lives here behind [`LogInterpreter`].
//!
//! Recognised records (`rclone bisync -v`):
//!
//! ```text
//! 2024/01/02 10:11:12 INFO  : docs/a.txt: Copied (new)
//! 2024/01/02 10:11:12 INFO  : docs/b.txt: Copied (replaced existing)
//! 2024/01/02 10:11:12 INFO  : docs/c.txt: Deleted
//! 2024/01/02 10:11:12 INFO  : Path1:    3 changes:    1 new,    1 newer,    0 older,    1 deleted
//! ```
//!
//! Duplication rule: a new copy lands in `create` and `modify`, a replacement
//! in `modify` and `remove`. Watchers on other hosts report these operations
//! as either kind depending on platform and write strategy.

use std::sync::LazyLock;

use meshsync_core::{ChangeKind, ChangeSet};
use regex::Regex;

static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^.*?\b(?:INFO|NOTICE|DEBUG)\s*:\s(?P<path>.+?): (?:Copied \((?P<detail>[^)]*)\)|(?P<deleted>Deleted))\s*$",
    )
    .expect("action regex")
});

static OWN_SIDE_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bPath1:\s+(?P<count>\d+) changes?:").expect("summary regex"));

/// Parsing interface between the raw tool log and structured data.
pub trait LogInterpreter: Send + Sync {
    /// Derive the changeset of one run.
    fn interpret(&self, raw: &str) -> ChangeSet;

    /// Number of changes the tool detected on the local side. Zero when the
    /// summary is absent.
    fn own_side_changes(&self, raw: &str) -> usize;
}

/// Interpreter for `rclone bisync -v` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct BisyncLog;

/// What a single action record does to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    NewCopy,
    Replace,
    Update,
    Delete,
}

impl Action {
    fn kinds(self) -> &'static [ChangeKind] {
        match self {
            Action::NewCopy => &[ChangeKind::Create, ChangeKind::Modify],
            Action::Replace => &[ChangeKind::Modify, ChangeKind::Remove],
            Action::Update => &[ChangeKind::Modify],
            Action::Delete => &[ChangeKind::Remove],
        }
    }
}

fn parse_action(line: &str) -> Option<(String, Action)> {
    let caps = ACTION.captures(line)?;
    let path = caps.name("path")?.as_str().trim().to_string();
    let action = if caps.name("deleted").is_some() {
        Action::Delete
    } else {
        let detail = caps.name("detail").map(|m| m.as_str()).unwrap_or_default();
        if detail.contains("replaced") {
            Action::Replace
        } else if detail.contains("new") {
            Action::NewCopy
        } else {
            Action::Update
        }
    };
    Some((path, action))
}

impl LogInterpreter for BisyncLog {
    fn interpret(&self, raw: &str) -> ChangeSet {
        let mut changeset = ChangeSet::new();
        for (path, action) in raw.lines().filter_map(parse_action) {
            for kind in action.kinds() {
                changeset.insert(*kind, &path);
            }
        }
        changeset
    }

    fn own_side_changes(&self, raw: &str) -> usize {
        raw.lines()
            .filter_map(|line| OWN_SIDE_SUMMARY.captures(line))
            .filter_map(|caps| caps["count"].parse::<usize>().ok())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_action_shape() {
        assert_eq!(
            parse_action("2024/01/02 10:11:12 INFO  : a.txt: Copied (new)"),
            Some(("a.txt".to_string(), Action::NewCopy))
        );
        assert_eq!(
            parse_action("2024/01/02 10:11:12 INFO  : dir/b.txt: Copied (replaced existing)"),
            Some(("dir/b.txt".to_string(), Action::Replace))
        );
        assert_eq!(
            parse_action("2024/01/02 10:11:12 INFO  : c.txt: Deleted"),
            Some(("c.txt".to_string(), Action::Delete))
        );
        assert_eq!(
            parse_action("2024/01/02 10:11:12 INFO  : d.txt: Copied (server-side copy)"),
            Some(("d.txt".to_string(), Action::Update))
        );
    }

    #[test]
    fn ignores_non_action_lines() {
        assert_eq!(parse_action("2024/01/02 10:11:12 INFO  : Path1 checking for diffs"), None);
        assert_eq!(
            parse_action("2024/01/02 10:11:12 INFO  : - Path1    File is new  - a.txt"),
            None
        );
        assert_eq!(parse_action(""), None);
    }

    #[test]
    fn path_may_contain_colons() {
        assert_eq!(
            parse_action("2024/01/02 10:11:12 INFO  : notes: draft.md: Copied (new)"),
            Some(("notes: draft.md".to_string(), Action::NewCopy))
        );
    }

    #[test]
    fn own_side_count_reads_path1_summary_only() {
        let raw = "\
2024/01/02 10:11:12 INFO  : Path1:    2 changes:    1 new,    1 newer,    0 older,    0 deleted
2024/01/02 10:11:12 INFO  : Path2:    5 changes:    5 new,    0 newer,    0 older,    0 deleted
";
        assert_eq!(BisyncLog.own_side_changes(raw), 2);
        assert_eq!(BisyncLog.own_side_changes("no summary here"), 0);
    }
}
