//! Typed view over the deep audit report carried by a completed frame.
//!
//! The stream consumer treats the terminal payload as opaque. These types are
//! for callers that want to read it; unknown fields are ignored and most
//! fields are optional because older services omit them.

use serde::Deserialize as _;

/// Score with its scale.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scoring {
    pub score: f64,
    pub out_of: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub area: String,
    pub action: String,
    pub impact: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuditLog {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKey {
    Perf,
    Seo,
    Security,
}

/// One audit section (performance, SEO or security).
///
/// `details` differs per audit key and is kept as raw JSON.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Audit {
    pub key: AuditKey,
    pub name: String,
    pub status: AuditStatus,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub logs: Vec<AuditLog>,
}

impl Audit {
    /// Score reported in `details.score`, if any.
    pub fn score(&self) -> Option<f64> {
        self.details.get("score").and_then(|v| v.as_f64())
    }

    /// Recommendations listed in `details.recommendations`.
    ///
    /// Entries that do not decode are skipped.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.details
            .get("recommendations")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| Recommendation::deserialize(item).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopFinding {
    pub level: LogLevel,
    pub audit_key: String,
    pub audit_name: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Summary {
    pub total_audits: u32,
    pub info_count: u32,
    pub warning_count: u32,
    pub error_count: u32,
    pub overall_score: f64,
    pub scoring: Scoring,
    pub top_findings: Vec<TopFinding>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DeepAnalysisStep {
    pub action: String,
    pub file: String,
    pub code_snippet: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DeepAnalysis {
    #[serde(rename = "_reasoning")]
    pub reasoning: String,
    pub agent_status: String,
    pub summary: String,
    pub steps: Vec<DeepAnalysisStep>,
}

/// Final report of a deep audit run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepAuditReport {
    pub url: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub audits: Vec<Audit>,
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub deep_analysis: Option<DeepAnalysis>,
}

impl DeepAuditReport {
    pub fn audit(&self, key: AuditKey) -> Option<&Audit> {
        self.audits.iter().find(|audit| audit.key == key)
    }

    /// Audits that did not pass, in report order.
    pub fn failing_audits(&self) -> impl Iterator<Item = &Audit> {
        self.audits
            .iter()
            .filter(|audit| audit.status != AuditStatus::Pass)
    }

    /// Wall-clock duration between `startedAt` and `finishedAt`.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let started = chrono::DateTime::parse_from_rfc3339(self.started_at.as_deref()?).ok()?;
        let finished = chrono::DateTime::parse_from_rfc3339(self.finished_at.as_deref()?).ok()?;
        Some(finished.signed_duration_since(started))
    }
}
