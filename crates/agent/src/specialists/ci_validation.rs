//! CI validation: warn when the reported configuration item is empty.

use incident_core::error::Error;
use incident_core::incident::Incident;
use incident_core::tool::ToolRegistry;
use incident_tools::{AddWorkNoteTool, names};
use serde::{Deserialize, Serialize};

use super::{SpecialistEnv, SpecialistKind};
use crate::loop_runner::AgentRun;

pub const MISSING_CI_NOTE: &str = "[Orchestrator] Warning: The 'Reported CI' (cmdb_ci) field is empty. \
Please identify and populate the correct Configuration Item before closing.";

pub const INSTRUCTIONS: &str = "\
You are the CI Validation Agent.

Check the incident's Reported CI field.
- If it is set, call no tool and reply {\"ci_valid\": true, \"ci_value\": \"<value>\"}.
- If it is empty, call add_work_note with exactly this note:
  [Orchestrator] Warning: The 'Reported CI' (cmdb_ci) field is empty. Please identify and populate the correct Configuration Item before closing.
  Then reply {\"ci_valid\": false, \"note_added\": true}.

Reply with only the JSON object.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiValidation {
    pub ci_valid: bool,
    pub reported_ci: Option<String>,
    pub note_added: bool,
}

pub fn task(incident: &Incident) -> String {
    let ci = if incident.has_reported_ci() {
        incident.reported_ci.trim()
    } else {
        "(empty)"
    };
    format!(
        "Validate the Reported CI of incident {}.\nReported CI: {ci}",
        incident.number
    )
}

/// Run CI validation. Validity is read from the record; the unit only
/// decides how to word its answer.
pub async fn run(env: &SpecialistEnv, incident: &Incident) -> Result<(AgentRun, CiValidation), Error> {
    let kind = SpecialistKind::CiValidation;
    let registry = ToolRegistry::new().with(Box::new(AddWorkNoteTool::new(env.tools.clone())))?;

    let (mut run, registry) = env.execute(kind, INSTRUCTIONS, registry, &task(incident)).await?;

    let ci_valid = incident.has_reported_ci();
    if !ci_valid && !run.succeeded(names::ADD_WORK_NOTE) {
        env.reconcile(
            &registry,
            &mut run,
            names::ADD_WORK_NOTE,
            serde_json::json!({ "note": MISSING_CI_NOTE }),
        )
        .await;
    }

    let result = CiValidation {
        ci_valid,
        reported_ci: ci_valid.then(|| incident.reported_ci.trim().to_string()),
        note_added: !ci_valid && run.succeeded(names::ADD_WORK_NOTE),
    };
    env.complete(kind, &mut run, &result);
    Ok((run, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specialists::testing;
    use crate::test_helpers::{ScriptedProvider, make_text_response, make_tool_call, make_tool_call_response};
    use incident_clients::{InMemoryIncidentStore, StubOrderApi};

    fn incident_without_ci() -> Incident {
        let mut incident = testing::incident();
        incident.reported_ci = String::new();
        incident
    }

    #[tokio::test]
    async fn present_ci_is_valid_without_notes() {
        let store = InMemoryIncidentStore::with_incidents(vec![testing::incident()]);
        let provider = ScriptedProvider::new().script(
            &testing::model(SpecialistKind::CiValidation),
            vec![make_text_response(r#"{"ci_valid": true, "ci_value": "Order Service"}"#)],
        );
        let env = testing::env(&provider, &store, &StubOrderApi::succeeding());

        let (run, result) = run(&env, &testing::incident()).await.unwrap();

        assert!(result.ci_valid);
        assert_eq!(result.reported_ci.as_deref(), Some("Order Service"));
        assert!(!result.note_added);
        assert_eq!(run.call_count(), 0);
        assert!(store.updates().await.is_empty());
    }

    #[tokio::test]
    async fn empty_ci_gets_the_warning_note() {
        let store = InMemoryIncidentStore::with_incidents(vec![incident_without_ci()]);
        let note = serde_json::json!({ "note": MISSING_CI_NOTE }).to_string();
        let provider = ScriptedProvider::new().script(
            &testing::model(SpecialistKind::CiValidation),
            vec![
                make_tool_call_response(vec![make_tool_call("c1", "add_work_note", &note)]),
                make_text_response(r#"{"ci_valid": false, "note_added": true}"#),
            ],
        );
        let env = testing::env(&provider, &store, &StubOrderApi::succeeding());

        let (run, result) = run(&env, &incident_without_ci()).await.unwrap();

        assert!(!result.ci_valid);
        assert!(result.note_added);
        assert!(run.reconciled.is_empty());
        let stored = store.snapshot("sys-1").await.unwrap();
        assert_eq!(stored.work_notes, vec![MISSING_CI_NOTE.to_string()]);
    }

    #[tokio::test]
    async fn missing_note_is_added_after_the_loop() {
        let store = InMemoryIncidentStore::with_incidents(vec![incident_without_ci()]);
        let provider = ScriptedProvider::new().script(
            &testing::model(SpecialistKind::CiValidation),
            vec![make_text_response(r#"{"ci_valid": false}"#)],
        );
        let env = testing::env(&provider, &store, &StubOrderApi::succeeding());

        let (run, result) = run(&env, &incident_without_ci()).await.unwrap();

        assert!(result.note_added);
        assert_eq!(run.reconciled.len(), 1);
    }
}
