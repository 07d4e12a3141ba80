//! Retention registry for published workspaces and the publish manifest.
//!
//! The registry is a static table of [`RetentionRule`]s, one per artifact the
//! published workspaces may keep. Each rule names the working artifact it
//! matches (with a `{date}` placeholder for dated names), the workspace role it
//! applies to, and the canonical name it is published under (with a
//! `{suffix}` placeholder for the variant suffix). Anything no rule matches is
//! deleted.
//!
//! # Examples
//!
//! ```
//! use pluto_core::manifest::{WorkspaceRole, find_rule};
//!
//! let rule = find_rule("MapPLUTO_09_30_2019_Shoreline_Clipped", "09_30_2019", WorkspaceRole::ShorelineClip)
//!     .expect("clipped parcels are retained");
//! assert_eq!(rule.published_name("_Corrected"), "MapPLUTO_Corrected");
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::store::ObjectKind;
use crate::types::{NOT_MAPPED_LOTS, NOT_MAPPED_LOTS_UNCLIPPED, UNMAPPABLES};

/// Which published workspace a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    /// Copy of the water-included workspace
    WaterArea,
    /// Copy of the shoreline-clipped workspace
    ShorelineClip,
}

impl WorkspaceRole {
    /// Returns the string representation of this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceRole::WaterArea => "water area",
            WorkspaceRole::ShorelineClip => "shoreline clip",
        }
    }
}

/// What happens to a matched artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Kept under its current name
    Retain,
    /// Kept under its canonical published name
    Rename,
    /// Removed from the published workspace
    Delete,
}

impl Disposition {
    /// Returns the string representation of this disposition.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Retain => "Retained",
            Disposition::Rename => "Renamed",
            Disposition::Delete => "Deleted",
        }
    }
}

/// One entry of the retention registry.
#[derive(Debug, Clone, Copy)]
pub struct RetentionRule {
    /// Working artifact name; `{date}` stands for the run date
    pub pattern: &'static str,
    /// Published name; `{suffix}` stands for the variant suffix
    pub published: &'static str,
    /// Table or feature class
    pub kind: ObjectKind,
    /// Workspace the rule applies to
    pub role: WorkspaceRole,
}

impl RetentionRule {
    /// Creates a retention rule.
    #[must_use]
    pub const fn new(
        pattern: &'static str,
        published: &'static str,
        kind: ObjectKind,
        role: WorkspaceRole,
    ) -> Self {
        Self {
            pattern,
            published,
            kind,
            role,
        }
    }

    /// Returns `true` if `name` is this rule's artifact for the run `date`.
    ///
    /// Names compare case-insensitively, like workspace object names.
    #[must_use]
    pub fn matches(&self, name: &str, date: &str) -> bool {
        self.pattern.replace("{date}", date).eq_ignore_ascii_case(name)
    }

    /// Canonical name for the variant `suffix`.
    #[must_use]
    pub fn published_name(&self, suffix: &str) -> String {
        self.published.replace("{suffix}", suffix)
    }
}

/// Returns the complete retention registry.
#[must_use]
pub fn get_rules() -> Vec<RetentionRule> {
    use ObjectKind::{FeatureClass, Table};
    use WorkspaceRole::{ShorelineClip, WaterArea};

    vec![
        RetentionRule::new(
            "MapPLUTO_{date}_Shoreline_Clipped",
            "MapPLUTO{suffix}",
            FeatureClass,
            ShorelineClip,
        ),
        RetentionRule::new(
            "MapPLUTO_{date}_Water_Included",
            "MapPLUTO_UNCLIPPED{suffix}",
            FeatureClass,
            WaterArea,
        ),
        RetentionRule::new(UNMAPPABLES, NOT_MAPPED_LOTS, Table, ShorelineClip),
        RetentionRule::new(UNMAPPABLES, NOT_MAPPED_LOTS_UNCLIPPED, Table, WaterArea),
        // Already canonical names survive a forced republish untouched.
        RetentionRule::new("MapPLUTO{suffix}", "MapPLUTO{suffix}", FeatureClass, ShorelineClip),
        RetentionRule::new(
            "MapPLUTO_UNCLIPPED{suffix}",
            "MapPLUTO_UNCLIPPED{suffix}",
            FeatureClass,
            WaterArea,
        ),
        RetentionRule::new(NOT_MAPPED_LOTS, NOT_MAPPED_LOTS, Table, ShorelineClip),
        RetentionRule::new(
            NOT_MAPPED_LOTS_UNCLIPPED,
            NOT_MAPPED_LOTS_UNCLIPPED,
            Table,
            WaterArea,
        ),
    ]
}

/// Find the rule that retains `name` in a workspace of the given role.
///
/// Canonical-name patterns are matched with the `{suffix}` placeholder
/// expanded for both variants.
#[must_use]
pub fn find_rule(name: &str, date: &str, role: WorkspaceRole) -> Option<RetentionRule> {
    get_rules().into_iter().filter(|r| r.role == role).find(|rule| {
        if rule.pattern.contains("{suffix}") {
            ["", "_Corrected"].iter().any(|suffix| {
                rule.pattern
                    .replace("{suffix}", suffix)
                    .eq_ignore_ascii_case(name)
            })
        } else {
            rule.matches(name, date)
        }
    })
}

/// Names of every artifact a published workspace may hold after curation.
#[must_use]
pub fn published_names(suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = get_rules().iter().map(|r| r.published_name(suffix)).collect();
    names.sort();
    names.dedup();
    names
}

/// One curated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Name in the working workspace
    pub name: String,
    /// Table or feature class
    pub kind: String,
    /// What the curator did
    pub disposition: Disposition,
    /// Published name, for retained and renamed artifacts
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published_name: Option<String>,
}

/// Curation record of one published workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceManifest {
    /// Role of the workspace
    pub role: WorkspaceRole,
    /// Published workspace path
    pub path: PathBuf,
    /// Curated artifacts in listing order
    pub artifacts: Vec<ArtifactEntry>,
}

impl WorkspaceManifest {
    /// Artifacts with the given disposition.
    #[must_use]
    pub fn with_disposition(&self, disposition: Disposition) -> Vec<&ArtifactEntry> {
        self.artifacts
            .iter()
            .filter(|a| a.disposition == disposition)
            .collect()
    }
}

/// Record of a publish run, written next to the published workspaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishManifest {
    /// Release version
    pub release: String,
    /// Variant label (`Original` / `Corrected`)
    pub variant: String,
    /// Run date, `MM_DD_YYYY`
    pub date: String,
    /// One entry per published workspace
    pub workspaces: Vec<WorkspaceManifest>,
}
