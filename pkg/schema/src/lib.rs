use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// The single persisted document: every outlet keyed by its outlet code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoenixDocument {
    #[serde(default)]
    pub outlets: BTreeMap<String, Outlet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Account manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub am: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Server-side stamp refreshed on every outlet-level write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub okr: Option<Okr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_data: Option<PerformanceData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Okr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_results: Vec<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_progress",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<u32>,
    /// Completion counters keyed `kr1`, `kr2`, ... by convention only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub action_plans: BTreeMap<String, ActionPlanProgress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionPlanProgress {
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term1: Option<TermPerformance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term2: Option<TermPerformance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term3: Option<TermPerformance>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TermPerformance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<f64>,
    /// Transaction count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trano: Option<f64>,
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// Fields submitted to an outlet-level write. Absent fields are left alone.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutletPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub am: Option<String>,
    #[serde(default)]
    pub date_added: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub okr: Option<OkrPatch>,
    #[serde(default)]
    pub performance_data: Option<PerformanceData>,
    #[serde(default)]
    pub medals: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkrPatch {
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub key_results: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: Option<u32>,
    #[serde(default)]
    pub action_plans: Option<BTreeMap<String, ActionPlanProgress>>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("value out of range: {0}")]
    InvalidRange(&'static str),
    #[error("invalid outlet code '{0}'")]
    InvalidOutletCode(String),
    #[error("duplicate outlet code '{0}'")]
    DuplicateOutletCode(String),
}

/// Case-insensitive outlet identifier, canonicalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutletCode(String);

impl OutletCode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField("outlet code"));
        }
        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(ValidationError::InvalidOutletCode(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OutletCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn validate_outlet(outlet: &Outlet) -> Result<(), ValidationError> {
    if let Some(okr) = &outlet.okr {
        if okr.progress.is_some_and(|progress| progress > 100) {
            return Err(ValidationError::InvalidRange("okr.progress"));
        }
        for key_result in &okr.key_results {
            if key_result.trim().is_empty() {
                return Err(ValidationError::MissingField("okr.keyResults[]"));
            }
        }
        for plan in okr.action_plans.values() {
            if plan.completed > plan.total {
                return Err(ValidationError::InvalidRange("okr.actionPlans.completed"));
            }
        }
    }
    for medal in &outlet.medals {
        if medal.trim().is_empty() {
            return Err(ValidationError::MissingField("medals[]"));
        }
    }
    Ok(())
}

/// Canonicalises outlet codes, rejects case-insensitive collisions, validates
/// every outlet and re-derives progress. Run on every API write.
pub fn normalize_document(doc: PhoenixDocument) -> Result<PhoenixDocument, ValidationError> {
    let mut outlets = BTreeMap::new();
    for (raw_code, mut outlet) in doc.outlets {
        let code = OutletCode::parse(&raw_code)?;
        validate_outlet(&outlet)?;
        outlet.refresh_progress();
        if outlets.insert(code.0.clone(), outlet).is_some() {
            return Err(ValidationError::DuplicateOutletCode(code.0));
        }
    }
    Ok(PhoenixDocument {
        outlets,
        metadata: doc.metadata,
    })
}

// ---------------------------------------------------------------------------
// Document and outlet behaviour
// ---------------------------------------------------------------------------

impl PhoenixDocument {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.last_updated.as_deref())
    }

    pub fn set_last_updated(&mut self, timestamp: impl Into<String>) {
        self.metadata
            .get_or_insert_with(DocumentMetadata::default)
            .last_updated = Some(timestamp.into());
    }

    pub fn outlet_count(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }

    pub fn outlet(&self, code: &OutletCode) -> Option<&Outlet> {
        self.outlets.get(code.as_str())
    }
}

impl Okr {
    /// Share of completed action-plan items, or the stored progress when no
    /// plan has any items.
    pub fn derived_progress(&self) -> Option<u32> {
        let (completed, total) = self
            .action_plans
            .values()
            .fold((0u64, 0u64), |(completed, total), plan| {
                (completed + u64::from(plan.completed), total + u64::from(plan.total))
            });
        if total == 0 {
            return self.progress;
        }
        let percent = (completed as f64 * 100.0 / total as f64).round();
        Some(percent.clamp(0.0, 100.0) as u32)
    }

    fn apply_patch(&mut self, patch: OkrPatch) {
        if let Some(objective) = patch.objective {
            self.objective = Some(objective);
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(key_results) = patch.key_results {
            self.key_results = key_results;
        }
        if let Some(progress) = patch.progress {
            self.progress = Some(progress);
        }
        if let Some(action_plans) = patch.action_plans {
            self.action_plans = action_plans;
        }
    }
}

impl PerformanceData {
    fn merge(&mut self, incoming: PerformanceData) {
        if incoming.term1.is_some() {
            self.term1 = incoming.term1;
        }
        if incoming.term2.is_some() {
            self.term2 = incoming.term2;
        }
        if incoming.term3.is_some() {
            self.term3 = incoming.term3;
        }
    }
}

impl Outlet {
    pub fn refresh_progress(&mut self) {
        if let Some(okr) = self.okr.as_mut() {
            okr.progress = okr.derived_progress();
        }
    }

    /// Merges `patch` over this outlet. `dateAdded` survives once set and
    /// `lastModified` is always refreshed to `now`.
    pub fn apply_patch(&mut self, patch: OutletPatch, now: &str) {
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(am) = patch.am {
            self.am = Some(am);
        }
        if self.date_added.is_none() {
            self.date_added = Some(patch.date_added.unwrap_or_else(|| now.to_string()));
        }
        if let Some(last_updated) = patch.last_updated {
            self.last_updated = Some(last_updated);
        }
        if let Some(okr_patch) = patch.okr {
            self.okr
                .get_or_insert_with(Okr::default)
                .apply_patch(okr_patch);
        }
        if let Some(performance) = patch.performance_data {
            self.performance_data
                .get_or_insert_with(PerformanceData::default)
                .merge(performance);
        }
        if let Some(medals) = patch.medals {
            self.medals = medals;
        }
        self.last_modified = Some(now.to_string());
        self.refresh_progress();
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`; lexical order is
/// chronological.
pub fn now_iso8601() -> String {
    format_iso8601(Utc::now())
}

pub fn iso8601_from_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(format_iso8601)
        .unwrap_or_else(|| format_iso8601(DateTime::<Utc>::default()))
}

/// Inverse of [`iso8601_from_millis`]; `None` for anything that is not RFC 3339.
pub fn millis_from_iso8601(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.timestamp_millis())
}

pub fn unix_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn format_iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<f64>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
        return Err(serde::de::Error::custom(format!(
            "progress must be between 0 and 100, got {raw}"
        )));
    }
    Ok(Some(raw.round() as u32))
}

/// Builds an outlet with a name and an OKR objective; everything else empty.
#[cfg(any(test, feature = "test-support"))]
pub fn outlet_builder(name: &str, objective: &str, key_results: &[&str]) -> Outlet {
    Outlet {
        name: Some(name.to_string()),
        okr: Some(Okr {
            objective: Some(objective.to_string()),
            key_results: key_results.iter().map(|kr| kr.to_string()).collect(),
            progress: Some(0),
            ..Okr::default()
        }),
        ..Outlet::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(completed: u32, total: u32) -> ActionPlanProgress {
        ActionPlanProgress { completed, total }
    }

    #[test]
    fn outlet_code_is_trimmed_and_upper_cased() {
        let code = OutletCode::parse("  a1-north ").unwrap();
        assert_eq!(code.as_str(), "A1-NORTH");
        assert_eq!(OutletCode::parse("A1-North").unwrap(), code);
    }

    #[test]
    fn outlet_code_rejects_empty_and_path_characters() {
        assert_eq!(
            OutletCode::parse("   "),
            Err(ValidationError::MissingField("outlet code"))
        );
        assert_eq!(
            OutletCode::parse("a/b"),
            Err(ValidationError::InvalidOutletCode("a/b".to_string()))
        );
    }

    #[test]
    fn document_deserializes_camel_case_payload() {
        let body = r#"{
            "outlets": {
                "A1": {
                    "name": "Store A",
                    "am": "Rina",
                    "dateAdded": "2024-01-01",
                    "okr": {
                        "objective": "Grow",
                        "keyResults": ["k1", "k2"],
                        "progress": 0,
                        "actionPlans": {"kr1": {"completed": 1, "total": 4}}
                    },
                    "performanceData": {"term1": {"revenue": 1500.5, "trano": 120}},
                    "medals": ["gold"]
                }
            },
            "metadata": {"lastUpdated": "2024-03-01T10:00:00.000Z"}
        }"#;
        let doc: PhoenixDocument = serde_json::from_str(body).unwrap();
        let outlet = &doc.outlets["A1"];
        assert_eq!(outlet.am.as_deref(), Some("Rina"));
        assert_eq!(outlet.date_added.as_deref(), Some("2024-01-01"));
        let okr = outlet.okr.as_ref().unwrap();
        assert_eq!(okr.key_results, vec!["k1", "k2"]);
        assert_eq!(okr.action_plans["kr1"], plan(1, 4));
        let term1 = outlet
            .performance_data
            .as_ref()
            .and_then(|data| data.term1.as_ref())
            .unwrap();
        assert_eq!(term1.trano, Some(120.0));
        assert_eq!(doc.last_updated(), Some("2024-03-01T10:00:00.000Z"));
    }

    #[test]
    fn empty_document_serializes_to_bare_outlets_map() {
        let json = serde_json::to_string(&PhoenixDocument::empty()).unwrap();
        assert_eq!(json, r#"{"outlets":{}}"#);
    }

    #[test]
    fn fractional_progress_is_rounded_and_out_of_range_rejected() {
        let okr: Okr = serde_json::from_str(r#"{"progress": 42.6}"#).unwrap();
        assert_eq!(okr.progress, Some(43));
        assert!(serde_json::from_str::<Okr>(r#"{"progress": 140}"#).is_err());
        assert!(serde_json::from_str::<Okr>(r#"{"progress": -1}"#).is_err());
    }

    #[test]
    fn derived_progress_uses_action_plans_when_present() {
        let mut okr = Okr {
            progress: Some(90),
            ..Okr::default()
        };
        assert_eq!(okr.derived_progress(), Some(90));

        okr.action_plans.insert("kr1".into(), plan(1, 4));
        okr.action_plans.insert("kr2".into(), plan(2, 4));
        assert_eq!(okr.derived_progress(), Some(38));

        okr.action_plans.insert("kr3".into(), plan(0, 0));
        assert_eq!(okr.derived_progress(), Some(38));
    }

    #[test]
    fn validate_outlet_rejects_overcounted_action_plan() {
        let mut outlet = outlet_builder("Store A", "Grow", &["k1"]);
        outlet
            .okr
            .as_mut()
            .unwrap()
            .action_plans
            .insert("kr1".into(), plan(5, 3));
        assert_eq!(
            validate_outlet(&outlet),
            Err(ValidationError::InvalidRange("okr.actionPlans.completed"))
        );
    }

    #[test]
    fn validate_outlet_rejects_blank_key_result() {
        let outlet = outlet_builder("Store A", "Grow", &["k1", "  "]);
        assert_eq!(
            validate_outlet(&outlet),
            Err(ValidationError::MissingField("okr.keyResults[]"))
        );
    }

    #[test]
    fn normalize_document_canonicalises_codes() {
        let mut doc = PhoenixDocument::empty();
        doc.outlets
            .insert(" b2 ".into(), outlet_builder("Store B", "Hold", &[]));
        let doc = normalize_document(doc).unwrap();
        assert!(doc.outlets.contains_key("B2"));
        assert_eq!(doc.outlet_count(), 1);
    }

    #[test]
    fn normalize_document_rejects_case_insensitive_duplicates() {
        let mut doc = PhoenixDocument::empty();
        doc.outlets
            .insert("a1".into(), outlet_builder("Lower", "Grow", &[]));
        doc.outlets
            .insert("A1".into(), outlet_builder("Upper", "Grow", &[]));
        assert_eq!(
            normalize_document(doc),
            Err(ValidationError::DuplicateOutletCode("A1".to_string()))
        );
    }

    #[test]
    fn normalize_document_derives_progress() {
        let mut outlet = outlet_builder("Store A", "Grow", &["k1"]);
        outlet
            .okr
            .as_mut()
            .unwrap()
            .action_plans
            .insert("kr1".into(), plan(3, 4));
        let mut doc = PhoenixDocument::empty();
        doc.outlets.insert("A1".into(), outlet);
        let doc = normalize_document(doc).unwrap();
        assert_eq!(doc.outlets["A1"].okr.as_ref().unwrap().progress, Some(75));
    }

    #[test]
    fn apply_patch_is_shallow_and_keeps_date_added() {
        let mut outlet = Outlet {
            date_added: Some("2024-01-01".into()),
            name: Some("A".into()),
            ..Outlet::default()
        };
        let patch = OutletPatch {
            name: Some("B".into()),
            date_added: Some("2030-01-01".into()),
            ..OutletPatch::default()
        };
        outlet.apply_patch(patch, "2024-06-01T00:00:00.000Z");

        assert_eq!(outlet.date_added.as_deref(), Some("2024-01-01"));
        assert_eq!(outlet.name.as_deref(), Some("B"));
        assert_eq!(
            outlet.last_modified.as_deref(),
            Some("2024-06-01T00:00:00.000Z")
        );
    }

    #[test]
    fn apply_patch_on_new_outlet_sets_date_added() {
        let mut outlet = Outlet::default();
        outlet.apply_patch(OutletPatch::default(), "2024-06-01T00:00:00.000Z");
        assert_eq!(
            outlet.date_added.as_deref(),
            Some("2024-06-01T00:00:00.000Z")
        );
    }

    #[test]
    fn apply_patch_merges_okr_fields() {
        let mut outlet = outlet_builder("Store A", "Grow", &["k1"]);
        let patch: OutletPatch = serde_json::from_str(r#"{"okr":{"progress":50}}"#).unwrap();
        outlet.apply_patch(patch, "2024-06-01T00:00:00.000Z");

        let okr = outlet.okr.unwrap();
        assert_eq!(okr.objective.as_deref(), Some("Grow"));
        assert_eq!(okr.key_results, vec!["k1"]);
        assert_eq!(okr.progress, Some(50));
    }

    #[test]
    fn apply_patch_merges_performance_terms() {
        let mut outlet = Outlet {
            performance_data: Some(PerformanceData {
                term1: Some(TermPerformance {
                    revenue: Some(10.0),
                    trano: Some(2.0),
                }),
                ..PerformanceData::default()
            }),
            ..Outlet::default()
        };
        let patch: OutletPatch =
            serde_json::from_str(r#"{"performanceData":{"term2":{"revenue":20}}}"#).unwrap();
        outlet.apply_patch(patch, "2024-06-01T00:00:00.000Z");

        let data = outlet.performance_data.unwrap();
        assert_eq!(data.term1.unwrap().revenue, Some(10.0));
        assert_eq!(data.term2.unwrap().revenue, Some(20.0));
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let earlier = iso8601_from_millis(1_700_000_000_000);
        let later = iso8601_from_millis(1_700_000_000_001);
        assert_eq!(earlier, "2023-11-14T22:13:20.000Z");
        assert!(earlier < later);
        assert!(now_iso8601().ends_with('Z'));
    }

    #[test]
    fn millis_parse_back_from_stamps() {
        assert_eq!(
            millis_from_iso8601("2023-11-14T22:13:20.000Z"),
            Some(1_700_000_000_000)
        );
        assert_eq!(millis_from_iso8601("yesterday"), None);
    }
}
