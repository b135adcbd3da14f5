//! Restore requests: immutable descriptions of why a restore is needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What triggered a restore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreReason {
    /// The workspace finished loading.
    WorkspaceLoaded,
    /// A project or manifest changed on disk.
    ProjectChanged,
    /// A build is about to start.
    OnBuild,
    /// The user asked for a restore.
    Explicit,
    /// Anything else the host considers an implicit trigger.
    Implicit,
}

impl RestoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreReason::WorkspaceLoaded => "workspace_loaded",
            RestoreReason::ProjectChanged => "project_changed",
            RestoreReason::OnBuild => "on_build",
            RestoreReason::Explicit => "explicit",
            RestoreReason::Implicit => "implicit",
        }
    }
}

impl std::fmt::Display for RestoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request for a restore. Created by callers and consumed once by the executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub reason: RestoreReason,
    /// Skip no-op checks and resolve the full dependency set.
    #[serde(default)]
    pub force: bool,
    pub requested_at: DateTime<Utc>,
}

impl RestoreRequest {
    pub fn new(reason: RestoreReason) -> Self {
        Self {
            reason,
            force: false,
            requested_at: Utc::now(),
        }
    }

    pub fn forced(reason: RestoreReason) -> Self {
        Self::new(reason).with_force(true)
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_request_sets_flag() {
        let req = RestoreRequest::forced(RestoreReason::Explicit);
        assert!(req.force);
        assert_eq!(req.reason, RestoreReason::Explicit);
        assert!(!RestoreRequest::new(RestoreReason::OnBuild).force);
    }

    #[test]
    fn request_deserializes_without_force_flag() {
        let req: RestoreRequest = serde_json::from_value(serde_json::json!({
            "reason": "project_changed",
            "requested_at": "2024-05-01T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(req.reason, RestoreReason::ProjectChanged);
        assert!(!req.force);
        assert_eq!(req.reason.to_string(), "project_changed");
    }
}
