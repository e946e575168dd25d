//! Incident model and the structured results specialists hand to each other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of an incident, carried on the wire as its numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IncidentState {
    New,
    InProgress,
    Pending,
    Resolved,
    /// A code this system does not act on, kept verbatim
    Other(String),
}

impl IncidentState {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => IncidentState::New,
            "2" => IncidentState::InProgress,
            "4" => IncidentState::Pending,
            "6" => IncidentState::Resolved,
            other => IncidentState::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            IncidentState::New => "1",
            IncidentState::InProgress => "2",
            IncidentState::Pending => "4",
            IncidentState::Resolved => "6",
            IncidentState::Other(code) => code,
        }
    }

    /// New and In Progress incidents are eligible for orchestration.
    pub fn is_open(&self) -> bool {
        matches!(self, IncidentState::New | IncidentState::InProgress)
    }
}

impl From<String> for IncidentState {
    fn from(code: String) -> Self {
        IncidentState::from_code(&code)
    }
}

impl From<IncidentState> for String {
    fn from(state: IncidentState) -> Self {
        state.code().to_string()
    }
}

impl fmt::Display for IncidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentState::New => write!(f, "New"),
            IncidentState::InProgress => write!(f, "In Progress"),
            IncidentState::Pending => write!(f, "Pending"),
            IncidentState::Resolved => write!(f, "Resolved"),
            IncidentState::Other(code) => write!(f, "state {code}"),
        }
    }
}

/// An incident record as sourced from the incident store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub sys_id: String,

    /// Human-facing number, e.g. "INC0010001"
    pub number: String,

    pub short_description: String,

    pub description: String,

    pub state: IncidentState,

    #[serde(default)]
    pub assignment_group: String,

    #[serde(default)]
    pub assigned_to: String,

    #[serde(default)]
    pub caller: String,

    /// Display value of the reported configuration item (`cmdb_ci`)
    #[serde(default)]
    pub reported_ci: String,

    /// Custom fields such as the priority correlation code
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,

    #[serde(default)]
    pub work_notes: Vec<String>,

    #[serde(default)]
    pub close_notes: String,
}

impl Incident {
    pub fn new(
        sys_id: impl Into<String>,
        number: impl Into<String>,
        short_description: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            sys_id: sys_id.into(),
            number: number.into(),
            short_description: short_description.into(),
            description: description.into(),
            state: IncidentState::New,
            assignment_group: String::new(),
            assigned_to: String::new(),
            caller: String::new(),
            reported_ci: String::new(),
            custom_fields: BTreeMap::new(),
            work_notes: Vec::new(),
            close_notes: String::new(),
        }
    }

    pub fn with_reported_ci(mut self, ci: impl Into<String>) -> Self {
        self.reported_ci = ci.into();
        self
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.assignment_group = group.into();
        self
    }

    pub fn custom_field(&self, name: &str) -> Option<&str> {
        self.custom_fields.get(name).map(String::as_str)
    }

    pub fn has_reported_ci(&self) -> bool {
        !self.reported_ci.trim().is_empty()
    }

    /// Render the incident as the task text handed to a decision unit.
    pub fn render(&self) -> String {
        format!(
            "Incident Number: {}\nSys ID: {}\nShort Description: {}\nDescription: {}\nCaller: {}\n\
             Reported CI: {}\nCurrent State: {}\nAssignment Group: {}",
            self.number,
            self.sys_id,
            self.short_description,
            self.description,
            or_not_set(&self.caller),
            or_not_set(&self.reported_ci),
            self.state,
            or_not_set(&self.assignment_group),
        )
    }
}

fn or_not_set(value: &str) -> &str {
    if value.trim().is_empty() { "(not set)" } else { value }
}

/// A typed delta the incident store applies in one write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<IncidentState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_note: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_code: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, String>,
}

impl IncidentUpdate {
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            work_note: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: IncidentState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = Some(assignee.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == IncidentUpdate::default()
    }

    /// Apply this delta to an in-memory copy of the incident.
    pub fn apply_to(&self, incident: &mut Incident) {
        if let Some(state) = &self.state {
            incident.state = state.clone();
        }
        if let Some(assignee) = &self.assigned_to {
            incident.assigned_to = assignee.clone();
        }
        if let Some(note) = &self.work_note {
            incident.work_notes.push(note.clone());
        }
        if let Some(close_notes) = &self.close_notes {
            incident.close_notes = close_notes.clone();
        }
        for (name, value) in &self.custom_fields {
            incident.custom_fields.insert(name.clone(), value.clone());
        }
    }
}

/// Triage's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageAction {
    #[serde(alias = "assigned")]
    Assign,
    Pending,
}

impl fmt::Display for TriageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriageAction::Assign => write!(f, "assign"),
            TriageAction::Pending => write!(f, "pending"),
        }
    }
}

/// Placeholder recorded when a pending decision names no field.
pub const UNSPECIFIED_MISSING_FIELD: &str = "details not specified";

/// Triage output.
///
/// Always satisfies `action == Pending` exactly when `missing_fields` is
/// non-empty. Construction and deserialization both go through
/// [`LLMAssessment::new`], which normalizes inconsistent input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAssessment")]
pub struct LLMAssessment {
    action: TriageAction,
    order_id: Option<String>,
    order_value: Option<f64>,
    has_frustration: bool,
    missing_fields: Vec<String>,
    reasoning: String,
}

#[derive(Deserialize)]
struct RawAssessment {
    action: Option<TriageAction>,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    order_value: Option<f64>,
    #[serde(default)]
    has_frustration: Option<bool>,
    #[serde(default)]
    missing_fields: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

/// Accepts `7500`, `"7500"` or `"$7,500.00"`. Anything else is `None`.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
            cleaned.parse().ok()
        }
        _ => None,
    })
}

/// Placeholder values decision units use for "no order found".
fn is_order_sentinel(id: &str) -> bool {
    ["not found", "null", "none", "n/a"]
        .iter()
        .any(|s| id.eq_ignore_ascii_case(s))
}

impl From<RawAssessment> for LLMAssessment {
    fn from(raw: RawAssessment) -> Self {
        let action = raw.action.unwrap_or(if raw.missing_fields.is_empty() {
            TriageAction::Assign
        } else {
            TriageAction::Pending
        });
        LLMAssessment::new(action, raw.missing_fields)
            .with_order(raw.order_id, raw.order_value)
            .with_frustration(raw.has_frustration.unwrap_or(false))
            .with_reasoning(raw.reasoning)
    }
}

impl LLMAssessment {
    /// Build an assessment, reconciling `action` with `missing_fields`.
    ///
    /// A non-empty missing list always means pending. A pending action with
    /// no named field records [`UNSPECIFIED_MISSING_FIELD`].
    pub fn new(action: TriageAction, missing_fields: Vec<String>) -> Self {
        let mut missing: Vec<String> = Vec::new();
        for field in missing_fields {
            let field = field.trim().to_string();
            if !field.is_empty() && !missing.contains(&field) {
                missing.push(field);
            }
        }
        let action = if missing.is_empty() { action } else { TriageAction::Pending };
        if action == TriageAction::Pending && missing.is_empty() {
            missing.push(UNSPECIFIED_MISSING_FIELD.to_string());
        }
        Self {
            action,
            order_id: None,
            order_value: None,
            has_frustration: false,
            missing_fields: missing,
            reasoning: String::new(),
        }
    }

    pub fn assign() -> Self {
        Self::new(TriageAction::Assign, Vec::new())
    }

    pub fn pending(missing_fields: Vec<String>) -> Self {
        Self::new(TriageAction::Pending, missing_fields)
    }

    pub fn with_order(mut self, order_id: Option<String>, order_value: Option<f64>) -> Self {
        self.order_id = order_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && !is_order_sentinel(id));
        self.order_value = order_value.filter(|v| v.is_finite());
        self
    }

    pub fn with_frustration(mut self, has_frustration: bool) -> Self {
        self.has_frustration = has_frustration;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn action(&self) -> TriageAction {
        self.action
    }

    pub fn is_pending(&self) -> bool {
        self.action == TriageAction::Pending
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn order_value(&self) -> Option<f64> {
        self.order_value
    }

    pub fn has_frustration(&self) -> bool {
        self.has_frustration
    }

    pub fn missing_fields(&self) -> &[String] {
        &self.missing_fields
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }
}

/// Outcome of one order-cancellation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub message: String,
}

impl CancelResult {
    pub fn succeeded(order_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            message: message.into(),
        }
    }

    pub fn failed(order_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_round_trip_through_display() {
        assert_eq!(IncidentState::from_code("4"), IncidentState::Pending);
        assert_eq!(IncidentState::Resolved.code(), "6");
        assert_eq!(IncidentState::from_code("7"), IncidentState::Other("7".into()));
        assert_eq!(IncidentState::InProgress.to_string(), "In Progress");
        assert!(IncidentState::New.is_open());
        assert!(!IncidentState::Pending.is_open());
    }

    #[test]
    fn state_serializes_as_code() {
        let json = serde_json::to_string(&IncidentState::Pending).unwrap();
        assert_eq!(json, "\"4\"");
        let state: IncidentState = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(state, IncidentState::InProgress);
    }

    #[test]
    fn assessment_missing_fields_force_pending() {
        let a = LLMAssessment::new(TriageAction::Assign, vec!["reported_ci".into()]);
        assert!(a.is_pending());
        assert_eq!(a.missing_fields(), ["reported_ci".to_string()]);
    }

    #[test]
    fn assessment_pending_without_fields_gets_placeholder() {
        let a = LLMAssessment::pending(vec!["   ".into()]);
        assert!(a.is_pending());
        assert_eq!(a.missing_fields(), [UNSPECIFIED_MISSING_FIELD.to_string()]);
    }

    #[test]
    fn assessment_assign_has_no_missing_fields() {
        let a = LLMAssessment::assign();
        assert_eq!(a.action(), TriageAction::Assign);
        assert!(a.missing_fields().is_empty());
    }

    #[test]
    fn assessment_dedups_missing_fields() {
        let a = LLMAssessment::pending(vec!["order_id".into(), "order_id ".into(), "caller".into()]);
        assert_eq!(a.missing_fields().len(), 2);
    }

    #[test]
    fn assessment_deserialization_normalizes() {
        let a: LLMAssessment = serde_json::from_value(serde_json::json!({
            "action": "assign",
            "missing_fields": ["reported_ci"],
            "order_value": 7000.0,
            "has_frustration": true
        }))
        .unwrap();
        assert!(a.is_pending());
        assert_eq!(a.order_value(), Some(7000.0));
        assert!(a.has_frustration());

        let b: LLMAssessment = serde_json::from_value(serde_json::json!({
            "order_id": "  ",
            "reasoning": "complete"
        }))
        .unwrap();
        assert_eq!(b.action(), TriageAction::Assign);
        assert_eq!(b.order_id(), None);
    }

    #[test]
    fn update_applies_to_incident() {
        let mut incident = Incident::new("abc", "INC0010001", "Order stuck", "Cancel ORD-1");
        let update = IncidentUpdate::note("checked")
            .with_state(IncidentState::Pending)
            .with_field("u_problem_correlation_code", "CAT A");
        assert!(!update.is_empty());
        update.apply_to(&mut incident);
        assert_eq!(incident.state, IncidentState::Pending);
        assert_eq!(incident.work_notes, vec!["checked".to_string()]);
        assert_eq!(incident.custom_field("u_problem_correlation_code"), Some("CAT A"));
    }

    #[test]
    fn render_marks_blank_fields() {
        let incident = Incident::new("abc", "INC0010001", "Order stuck", "Cancel ORD-1");
        let text = incident.render();
        assert!(text.contains("INC0010001"));
        assert!(text.contains("Reported CI: (not set)"));
        assert!(text.contains("Current State: New"));
    }

    #[test]
    fn cancel_result_constructors() {
        let ok = CancelResult::succeeded("ORD-1", "cancelled");
        assert!(ok.success);
        let failed = CancelResult::failed(None, "no order id");
        assert!(!failed.success);
        assert!(failed.order_id.is_none());
    }

    #[test]
    fn assessment_tolerates_loose_amounts_and_sentinels() {
        let a: LLMAssessment = serde_json::from_value(serde_json::json!({
            "action": "assigned",
            "order_id": "NOT FOUND",
            "order_value": "$7,500.00",
            "has_frustration": true
        }))
        .unwrap();
        assert_eq!(a.action(), TriageAction::Assign);
        assert_eq!(a.order_id(), None);
        assert_eq!(a.order_value(), Some(7500.0));

        let b: LLMAssessment = serde_json::from_value(serde_json::json!({
            "action": "assign",
            "order_value": "unknown"
        }))
        .unwrap();
        assert_eq!(b.order_value(), None);
    }
}
