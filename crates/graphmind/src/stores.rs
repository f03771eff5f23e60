//! On-disk stores for rule profiles and semantic artifacts.
//!
//! Both stores write one JSON file per item under
//! `{base_dir}/{workspace_id}/{item_id}.json`. Rule profiles are immutable
//! once saved; semantic artifacts move from `draft` to `approved`.

use crate::error::{Error, Result};
use crate::passes::{OntologyCandidate, ShaclCandidate};
use crate::rules::RuleProfile;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A persisted rule profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRuleProfile {
    pub profile_id: String,
    pub workspace_id: String,
    pub name: String,
    pub created_at: String,
    pub schema_version: String,
    pub rule_count: usize,
    pub rule_profile: RuleProfile,
}

/// Listing row for rule profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleProfileSummary {
    pub profile_id: String,
    pub workspace_id: String,
    pub name: String,
    pub created_at: String,
    pub schema_version: String,
    pub rule_count: usize,
}

/// Filesystem store for rule profiles
pub struct RuleProfileStore {
    base_dir: PathBuf,
}

impl RuleProfileStore {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Persist a profile and return the stored payload.
    ///
    /// # Errors
    ///
    /// Returns an internal error on filesystem failures.
    pub fn save(
        &self,
        workspace_id: &str,
        rule_profile: &RuleProfile,
        name: Option<&str>,
    ) -> Result<StoredRuleProfile> {
        let workspace_dir = self.base_dir.join(workspace_id);
        create_dir(&workspace_dir)?;

        let profile_id = new_item_id("rp");
        let stored = StoredRuleProfile {
            profile_id: profile_id.clone(),
            workspace_id: workspace_id.to_string(),
            name: name.unwrap_or(&profile_id).to_string(),
            created_at: now_iso(),
            schema_version: rule_profile.schema_version.clone(),
            rule_count: rule_profile.rules.len(),
            rule_profile: rule_profile.clone(),
        };

        write_json(&workspace_dir.join(format!("{profile_id}.json")), &stored)?;
        Ok(stored)
    }

    /// Load one profile.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the profile does not exist.
    pub fn get(&self, workspace_id: &str, profile_id: &str) -> Result<StoredRuleProfile> {
        read_json(
            &self.base_dir.join(workspace_id).join(format!("{profile_id}.json")),
            &format!("rule profile not found: workspace={workspace_id}, profile_id={profile_id}"),
        )
    }

    /// Listing rows, newest first.
    #[must_use]
    pub fn list(&self, workspace_id: &str) -> Vec<RuleProfileSummary> {
        let mut rows: Vec<RuleProfileSummary> =
            read_workspace_items::<StoredRuleProfile>(&self.base_dir.join(workspace_id))
                .into_iter()
                .map(|stored| RuleProfileSummary {
                    profile_id: stored.profile_id,
                    workspace_id: stored.workspace_id,
                    name: stored.name,
                    created_at: stored.created_at,
                    schema_version: stored.schema_version,
                    rule_count: stored.rule_count,
                })
                .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }
}

/// Artifact lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Draft,
    Approved,
}

/// A persisted ontology/SHACL candidate pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticArtifact {
    pub artifact_id: String,
    pub workspace_id: String,
    pub name: String,
    pub created_at: String,
    pub status: ArtifactStatus,
    pub source_summary: Value,
    pub ontology_candidate: OntologyCandidate,
    pub shacl_candidate: ShaclCandidate,
    pub approved_by: Option<String>,
    pub approval_note: Option<String>,
    pub approved_at: Option<String>,
}

/// Filesystem store for semantic artifacts
pub struct SemanticArtifactStore {
    base_dir: PathBuf,
}

impl SemanticArtifactStore {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Persist a draft artifact.
    ///
    /// # Errors
    ///
    /// Returns an internal error on filesystem failures.
    pub fn save(
        &self,
        workspace_id: &str,
        ontology_candidate: OntologyCandidate,
        shacl_candidate: ShaclCandidate,
        name: Option<&str>,
        source_summary: Value,
    ) -> Result<SemanticArtifact> {
        let workspace_dir = self.base_dir.join(workspace_id);
        create_dir(&workspace_dir)?;

        let artifact_id = new_item_id("sa");
        let artifact = SemanticArtifact {
            artifact_id: artifact_id.clone(),
            workspace_id: workspace_id.to_string(),
            name: name.unwrap_or(&artifact_id).to_string(),
            created_at: now_iso(),
            status: ArtifactStatus::Draft,
            source_summary,
            ontology_candidate,
            shacl_candidate,
            approved_by: None,
            approval_note: None,
            approved_at: None,
        };

        write_json(&workspace_dir.join(format!("{artifact_id}.json")), &artifact)?;
        Ok(artifact)
    }

    /// Load one artifact.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the artifact does not exist.
    pub fn get(&self, workspace_id: &str, artifact_id: &str) -> Result<SemanticArtifact> {
        read_json(
            &self.base_dir.join(workspace_id).join(format!("{artifact_id}.json")),
            &format!(
                "semantic artifact not found: workspace={workspace_id}, artifact_id={artifact_id}"
            ),
        )
    }

    /// Artifacts for a workspace, newest first, optionally filtered by status.
    #[must_use]
    pub fn list(&self, workspace_id: &str, status: Option<ArtifactStatus>) -> Vec<SemanticArtifact> {
        let mut rows: Vec<SemanticArtifact> =
            read_workspace_items(&self.base_dir.join(workspace_id))
                .into_iter()
                .filter(|artifact: &SemanticArtifact| {
                    status.map_or(true, |wanted| artifact.status == wanted)
                })
                .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    /// Approve a draft artifact.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the artifact does not exist.
    pub fn approve(
        &self,
        workspace_id: &str,
        artifact_id: &str,
        approved_by: &str,
        approval_note: Option<&str>,
    ) -> Result<SemanticArtifact> {
        let mut artifact = self.get(workspace_id, artifact_id)?;
        artifact.status = ArtifactStatus::Approved;
        artifact.approved_by = Some(approved_by.to_string());
        artifact.approval_note = approval_note.map(ToString::to_string);
        artifact.approved_at = Some(now_iso());

        write_json(
            &self
                .base_dir
                .join(workspace_id)
                .join(format!("{artifact_id}.json")),
            &artifact,
        )?;
        Ok(artifact)
    }
}

fn new_item_id(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{timestamp}_{}", &suffix[..8])
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|err| Error::internal(format!("failed to create {}: {err}", path.display())))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let encoded = serde_json::to_string_pretty(value)?;
    std::fs::write(path, encoded)
        .map_err(|err| Error::internal(format!("failed to write {}: {err}", path.display())))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, missing_message: &str) -> Result<T> {
    if !path.exists() {
        return Err(Error::validation(missing_message.to_string()));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|err| Error::internal(format!("failed to read {}: {err}", path.display())))?;
    Ok(serde_json::from_str(&raw)?)
}

fn read_workspace_items<T: for<'de> Deserialize<'de>>(workspace_dir: &Path) -> Vec<T> {
    let Ok(entries) = std::fs::read_dir(workspace_dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .filter_map(|entry| std::fs::read_to_string(entry.path()).ok())
        .filter_map(|raw| serde_json::from_str(&raw).ok())
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Rule, RuleKind};
    use serde_json::json;

    fn profile() -> RuleProfile {
        RuleProfile::new(vec![
            Rule::new("Company", "name", RuleKind::Required).with_param("minCount", json!(1))
        ])
    }

    #[test]
    fn test_rule_profile_save_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleProfileStore::new(dir.path());

        let stored = store.save("wsdemo", &profile(), Some("baseline")).unwrap();
        assert!(stored.profile_id.starts_with("rp_"));
        assert_eq!(stored.rule_count, 1);
        assert_eq!(stored.schema_version, "rules.v1");

        let loaded = store.get("wsdemo", &stored.profile_id).unwrap();
        assert_eq!(loaded.name, "baseline");
        assert_eq!(loaded.rule_profile.rules.len(), 1);
    }

    #[test]
    fn test_rule_profile_missing_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleProfileStore::new(dir.path());
        let err = store.get("wsdemo", "rp_missing").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_rule_profile_listing_isolated_per_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleProfileStore::new(dir.path());
        store.save("wsalpha", &profile(), None).unwrap();
        store.save("wsalpha", &profile(), None).unwrap();
        store.save("wsbeta", &profile(), None).unwrap();

        assert_eq!(store.list("wsalpha").len(), 2);
        assert_eq!(store.list("wsbeta").len(), 1);
        assert!(store.list("wsempty").is_empty());
    }

    #[test]
    fn test_artifact_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = SemanticArtifactStore::new(dir.path());

        let saved = store
            .save(
                "wsdemo",
                OntologyCandidate::default(),
                ShaclCandidate::default(),
                None,
                json!({"records": 2}),
            )
            .unwrap();
        assert_eq!(saved.status, ArtifactStatus::Draft);
        assert!(saved.artifact_id.starts_with("sa_"));

        let approved = store
            .approve("wsdemo", &saved.artifact_id, "reviewer", Some("looks right"))
            .unwrap();
        assert_eq!(approved.status, ArtifactStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("reviewer"));
        assert!(approved.approved_at.is_some());

        let drafts = store.list("wsdemo", Some(ArtifactStatus::Draft));
        assert!(drafts.is_empty());
        let approved_rows = store.list("wsdemo", Some(ArtifactStatus::Approved));
        assert_eq!(approved_rows.len(), 1);
    }

    #[test]
    fn test_artifact_missing_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SemanticArtifactStore::new(dir.path());
        assert!(store.approve("wsdemo", "sa_missing", "x", None).is_err());
    }
}
