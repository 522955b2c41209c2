//! Orchestration verdicts.
//!
//! Pure decision logic: given the caller's head, the remote head, and the
//! tagged lock overlay, produce the single actionable command the caller
//! should follow next. No I/O here.

use crate::graph::DependencyGraph;
use crate::locks::Lock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The verdict returned to every caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationAction {
    Proceed,
    Pull,
    Push,
    Wait,
    SwitchTask,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationCommand {
    /// Constant label `"orchestration_command"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub action: OrchestrationAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub reason: String,
}

impl OrchestrationCommand {
    fn new(action: OrchestrationAction, command: Option<&str>, reason: String) -> Self {
        Self {
            kind: "orchestration_command".to_string(),
            action,
            command: command.map(str::to_string),
            reason,
        }
    }

    pub fn proceed(reason: impl Into<String>) -> Self {
        Self::new(OrchestrationAction::Proceed, None, reason.into())
    }

    pub fn pull(branch: &str, remote_head: &str) -> Self {
        Self::new(
            OrchestrationAction::Pull,
            Some("git pull --rebase"),
            format!("Your branch is behind origin/{branch}; remote head is {remote_head}"),
        )
    }

    pub fn push() -> Self {
        Self::new(
            OrchestrationAction::Push,
            Some("git push"),
            "Repo head unchanged since your last sync; push your commits first".to_string(),
        )
    }

    pub fn switch_task(reason: impl Into<String>) -> Self {
        Self::new(OrchestrationAction::SwitchTask, None, reason.into())
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        Self::new(OrchestrationAction::Stop, None, reason.into())
    }
}

/// Whether a lock names a requested file or a graph neighbor of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockKind {
    Direct,
    Neighbor,
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "DIRECT"),
            Self::Neighbor => write!(f, "NEIGHBOR"),
        }
    }
}

/// A lock as reported to callers: the record plus the `user` alias and the
/// direct/neighbor tag.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedLock {
    #[serde(flatten)]
    pub lock: Lock,
    /// Alias of `user_id` for legacy consumers.
    pub user: String,
    pub lock_type: LockKind,
}

/// Overlay lock kinds onto the active lock set.
///
/// Direct tagging wins when a lock is both requested and adjacent. Locks
/// that are neither requested nor adjacent are omitted.
pub fn tag_locks(
    locks: &HashMap<String, Lock>,
    requested: &[String],
    graph: Option<&DependencyGraph>,
) -> HashMap<String, TaggedLock> {
    let neighbors = graph
        .map(|g| g.neighbors_of(requested))
        .unwrap_or_default();

    locks
        .iter()
        .filter_map(|(path, lock)| {
            let lock_type = if requested.iter().any(|r| r == path) {
                LockKind::Direct
            } else if neighbors.contains(path) {
                LockKind::Neighbor
            } else {
                return None;
            };
            Some((
                path.clone(),
                TaggedLock {
                    lock: lock.clone(),
                    user: lock.user_id.clone(),
                    lock_type,
                },
            ))
        })
        .collect()
}

/// Top-level `status` field of a `check_status` response. Precedence for
/// the label is `STALE > CONFLICT > OK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatusLabel {
    Ok,
    Stale,
    Conflict,
}

#[derive(Debug, Clone)]
pub struct CheckDecision {
    pub status: CheckStatusLabel,
    pub warnings: Vec<String>,
    pub orchestration: OrchestrationCommand,
}

/// The first lock held by someone else, in deterministic path order.
fn first_foreign_lock<'a>(
    caller_id: &str,
    locks: &'a HashMap<String, TaggedLock>,
) -> Option<&'a TaggedLock> {
    let mut paths: Vec<&String> = locks
        .iter()
        .filter(|(_, tagged)| tagged.lock.user_id != caller_id)
        .map(|(path, _)| path)
        .collect();
    paths.sort();
    paths.first().map(|path| &locks[*path])
}

/// Decision rules for `check_status` (implicit read intent).
pub fn decide_check(
    caller_id: &str,
    agent_head: &str,
    remote_head: &str,
    branch: &str,
    locks: &HashMap<String, TaggedLock>,
) -> CheckDecision {
    let stale = agent_head != remote_head;
    let foreign = first_foreign_lock(caller_id, locks);

    let status = if stale {
        CheckStatusLabel::Stale
    } else if foreign.is_some() {
        CheckStatusLabel::Conflict
    } else {
        CheckStatusLabel::Ok
    };

    let warnings = if stale {
        vec![format!("STALE_BRANCH: Your branch is behind origin/{branch}")]
    } else {
        Vec::new()
    };

    let orchestration = if stale {
        OrchestrationCommand::pull(branch, remote_head)
    } else if let Some(tagged) = foreign {
        OrchestrationCommand::switch_task(format!(
            "{} is locked ({}) by {}; work on something else",
            tagged.lock.file_path, tagged.lock_type, tagged.lock.user_id
        ))
    } else {
        OrchestrationCommand::proceed("Working tree is current and no conflicting locks exist")
    };

    CheckDecision {
        status,
        warnings,
        orchestration,
    }
}

/// `SWITCH_TASK` for a failed acquire. The reason carries the
/// `FILE_CONFLICT` marker plus the blocking file and its owner.
pub fn acquire_conflict(file: &str, owner: &str) -> OrchestrationCommand {
    OrchestrationCommand::switch_task(format!("FILE_CONFLICT: {file} is locked by {owner}"))
}
