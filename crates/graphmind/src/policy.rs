//! Runtime policy: role-based authorization plus workspace-id validation.
//!
//! The deployment is single-tenant for now, but every runtime call carries a
//! `workspace_id` so the plumbing is in place. Authorization on the hot path
//! is plain RBAC; ontology-level reasoning is deliberately kept offline.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static WORKSPACE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]{1,63}$").expect("workspace regex is valid")
});

/// Whether `workspace_id` is syntactically valid.
#[must_use]
pub fn is_valid_workspace_id(workspace_id: &str) -> bool {
    WORKSPACE_RE.is_match(workspace_id)
}

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
}

impl PolicyDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "ok".to_string(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

const FULL_ACTION_SET: [&str; 13] = [
    "run_agent",
    "run_debate",
    "run_semantic",
    "read_databases",
    "read_agents",
    "infer_rules",
    "validate_rules",
    "manage_rule_profiles",
    "manage_semantic_artifacts",
    "export_rules",
    "manage_indexes",
    "run_platform",
    "ingest_raw",
];

const VIEWER_ACTION_SET: [&str; 2] = ["read_databases", "read_agents"];

/// Role-based policy engine
#[derive(Debug)]
pub struct RuntimePolicyEngine {
    role_permissions: HashMap<&'static str, HashSet<&'static str>>,
}

impl RuntimePolicyEngine {
    #[must_use]
    pub fn new() -> Self {
        let full: HashSet<&'static str> = FULL_ACTION_SET.into_iter().collect();
        let viewer: HashSet<&'static str> = VIEWER_ACTION_SET.into_iter().collect();
        let mut role_permissions = HashMap::new();
        role_permissions.insert("admin", full.clone());
        role_permissions.insert("user", full);
        role_permissions.insert("viewer", viewer);
        Self { role_permissions }
    }

    /// Validate the workspace id alone.
    #[must_use]
    pub fn validate_workspace_id(&self, workspace_id: &str) -> PolicyDecision {
        if workspace_id.is_empty() {
            return PolicyDecision::deny("workspace_id is required");
        }
        if !is_valid_workspace_id(workspace_id) {
            return PolicyDecision::deny("invalid workspace_id format");
        }
        PolicyDecision::allow()
    }

    /// Authorize `role` for `action` within `workspace_id`.
    #[must_use]
    pub fn authorize(&self, role: &str, action: &str, workspace_id: &str) -> PolicyDecision {
        let workspace = self.validate_workspace_id(workspace_id);
        if !workspace.allowed {
            return workspace;
        }
        let allowed = self
            .role_permissions
            .get(role)
            .is_some_and(|actions| actions.contains(action));
        if allowed {
            PolicyDecision::allow()
        } else {
            PolicyDecision::deny(format!("role '{role}' not allowed for action '{action}'"))
        }
    }
}

impl Default for RuntimePolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Authorization guard used by request handlers.
///
/// # Errors
///
/// Returns a validation error for bad workspace ids and a permission error
/// when the role lacks the action.
pub fn require_runtime_permission(
    engine: &RuntimePolicyEngine,
    role: &str,
    action: &str,
    workspace_id: &str,
) -> Result<()> {
    let workspace = engine.validate_workspace_id(workspace_id);
    if !workspace.allowed {
        return Err(Error::validation(workspace.reason));
    }
    let decision = engine.authorize(role, action, workspace_id);
    if decision.allowed {
        Ok(())
    } else {
        Err(Error::permission(decision.reason))
    }
}
