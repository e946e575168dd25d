//! ServiceNow Table API client.
//!
//! Basic auth, JSON in and out. Reads ask for display values, so reference
//! fields may come back as `{display_value, value, link}` objects; those are
//! flattened before the record becomes an [`Incident`].

use async_trait::async_trait;
use incident_config::ServiceNowConfig;
use incident_core::error::{Error, StoreError};
use incident_core::incident::{Incident, IncidentState, IncidentUpdate};
use incident_core::store::IncidentStore;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

const INCIDENT_TABLE: &str = "/api/now/table/incident";
const POLL_LIMIT: &str = "50";

const BASE_FIELDS: &[&str] = &[
    "sys_id",
    "number",
    "short_description",
    "description",
    "state",
    "caller_id",
    "assigned_to",
    "assignment_group",
    "cmdb_ci",
    "work_notes",
    "close_notes",
];

pub struct ServiceNowClient {
    base_url: String,
    user: String,
    password: String,
    pcc_field: String,
    client: reqwest::Client,
}

impl ServiceNowClient {
    pub fn from_config(config: &ServiceNowConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config {
                message: format!("ServiceNow HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: config.base_url(),
            user: config.user.clone(),
            password: config.password.clone().unwrap_or_default(),
            pcc_field: config.pcc_field.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn fields(&self) -> String {
        let mut fields: Vec<&str> = BASE_FIELDS.to_vec();
        fields.push(&self.pcc_field);
        fields.join(",")
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, StoreError> {
        let response = request
            .basic_auth(&self.user, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(StoreError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status_code: status.as_u16(),
                message: body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| StoreError::InvalidPayload(e.to_string()))
    }

    /// Flatten a Table API record into an [`Incident`].
    fn to_incident(&self, record: &Value) -> Incident {
        let work_notes = field_value(record, "work_notes");
        let mut incident = Incident::new(
            field_value(record, "sys_id"),
            field_value(record, "number"),
            field_value(record, "short_description"),
            field_value(record, "description"),
        );
        incident.state = IncidentState::from_code(&field_raw_value(record, "state"));
        incident.caller = field_value(record, "caller_id");
        incident.assigned_to = field_value(record, "assigned_to");
        incident.assignment_group = field_value(record, "assignment_group");
        incident.reported_ci = field_value(record, "cmdb_ci");
        incident.close_notes = field_value(record, "close_notes");
        if !work_notes.trim().is_empty() {
            incident.work_notes.push(work_notes);
        }
        let pcc = field_value(record, &self.pcc_field);
        if !pcc.is_empty() {
            incident.custom_fields.insert(self.pcc_field.clone(), pcc);
        }
        incident
    }
}

/// Read a field that may be a plain string or a display-value object.
fn field_value(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(obj)) => obj
            .get("display_value")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| obj.get("value").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Like [`field_value`] but prefers the stored value (state codes).
fn field_raw_value(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::Object(obj)) => obj
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| field_value(record, key)),
        _ => {
            let display = field_value(record, key);
            state_code_for_label(&display)
                .map(str::to_string)
                .unwrap_or(display)
        }
    }
}

/// Display-value reads return state labels rather than codes.
fn state_code_for_label(label: &str) -> Option<&'static str> {
    match label {
        "New" => Some("1"),
        "In Progress" => Some("2"),
        "Pending" | "On Hold" => Some("4"),
        "Resolved" => Some("6"),
        _ => None,
    }
}

/// Build the PATCH body for an update.
fn update_payload(update: &IncidentUpdate) -> Value {
    let mut body = Map::new();
    if let Some(state) = &update.state {
        body.insert("state".into(), Value::String(state.code().to_string()));
    }
    if let Some(assignee) = &update.assigned_to {
        body.insert("assigned_to".into(), Value::String(assignee.clone()));
    }
    if let Some(note) = &update.work_note {
        body.insert("work_notes".into(), Value::String(note.clone()));
    }
    if let Some(notes) = &update.close_notes {
        body.insert("close_notes".into(), Value::String(notes.clone()));
    }
    if let Some(code) = &update.close_code {
        body.insert("close_code".into(), Value::String(code.clone()));
    }
    for (name, value) in &update.custom_fields {
        body.insert(name.clone(), Value::String(value.clone()));
    }
    Value::Object(body)
}

#[async_trait]
impl IncidentStore for ServiceNowClient {
    fn name(&self) -> &str {
        "servicenow"
    }

    async fn list_new(&self, group: &str) -> Result<Vec<Incident>, StoreError> {
        let query = format!("assignment_group.name={group}^stateIN1,2^assigned_to=NULL");
        let fields = self.fields();
        let request = self.client.get(self.url(INCIDENT_TABLE)).query(&[
            ("sysparm_query", query.as_str()),
            ("sysparm_fields", fields.as_str()),
            ("sysparm_limit", POLL_LIMIT),
            ("sysparm_display_value", "true"),
        ]);
        let body = self.send(request).await?;
        let records = body
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::InvalidPayload("missing 'result' array".into()))?;

        info!(count = records.len(), group, "Polled ServiceNow for open incidents");
        Ok(records.iter().map(|r| self.to_incident(r)).collect())
    }

    async fn get(&self, sys_id: &str) -> Result<Option<Incident>, StoreError> {
        let fields = self.fields();
        let request = self
            .client
            .get(self.url(&format!("{INCIDENT_TABLE}/{sys_id}")))
            .query(&[
                ("sysparm_fields", fields.as_str()),
                ("sysparm_display_value", "true"),
            ]);
        match self.send(request).await {
            Ok(body) => {
                let record = body
                    .get("result")
                    .ok_or_else(|| StoreError::InvalidPayload("missing 'result'".into()))?;
                Ok(Some(self.to_incident(record)))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, sys_id: &str, update: IncidentUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        let payload = update_payload(&update);
        let request = self
            .client
            .patch(self.url(&format!("{INCIDENT_TABLE}/{sys_id}")))
            .json(&payload);
        self.send(request).await.map_err(|e| match e {
            StoreError::NotFound(_) => StoreError::NotFound(sys_id.to_string()),
            other => other,
        })?;
        debug!(sys_id, fields = ?payload.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()), "Updated incident");
        Ok(())
    }
}
