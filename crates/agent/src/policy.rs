//! Business rules of the dispatch engine, kept as named constants.

use incident_core::incident::LLMAssessment;

use crate::specialists::SpecialistKind;

/// Decision-unit turns a single loop may take.
pub const MAX_ITERATIONS: u32 = 20;

/// Order value (exclusive) above which a frustrated caller is escalated.
pub const DEFAULT_ESCALATION_THRESHOLD: f64 = 5000.0;

/// Correlation code written on escalation.
pub const CATEGORY_A: &str = "CAT A";

/// A pending triage decision ends the run after Triage.
pub const PENDING_STOPS_PIPELINE: bool = true;

/// A missing configuration item never halts the run.
pub const CI_VALIDATION_BLOCKS_PIPELINE: bool = false;

/// The mandated order of specialists.
pub const PIPELINE: [SpecialistKind; 5] = [
    SpecialistKind::Triage,
    SpecialistKind::CiValidation,
    SpecialistKind::Priority,
    SpecialistKind::OrderCancellation,
    SpecialistKind::Resolution,
];

/// Escalate only when the order value is known and strictly above the
/// threshold and the caller is frustrated. Missing data means "not met".
pub fn escalation_criteria_met(assessment: Option<&LLMAssessment>, threshold: f64) -> bool {
    let Some(assessment) = assessment else {
        return false;
    };
    let over_threshold = matches!(assessment.order_value(), Some(value) if value > threshold);
    over_threshold && assessment.has_frustration()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(value: Option<f64>, frustrated: bool) -> LLMAssessment {
        LLMAssessment::assign()
            .with_order(Some("ORD-1".into()), value)
            .with_frustration(frustrated)
    }

    #[test]
    fn escalates_only_when_both_conditions_hold() {
        let t = DEFAULT_ESCALATION_THRESHOLD;
        assert!(escalation_criteria_met(Some(&assessment(Some(7000.0), true)), t));
        assert!(!escalation_criteria_met(Some(&assessment(Some(7000.0), false)), t));
        assert!(!escalation_criteria_met(Some(&assessment(Some(4000.0), true)), t));
    }

    #[test]
    fn threshold_is_exclusive() {
        assert!(!escalation_criteria_met(
            Some(&assessment(Some(5000.0), true)),
            DEFAULT_ESCALATION_THRESHOLD
        ));
        assert!(escalation_criteria_met(
            Some(&assessment(Some(5000.01), true)),
            DEFAULT_ESCALATION_THRESHOLD
        ));
    }

    #[test]
    fn missing_data_is_not_met() {
        assert!(!escalation_criteria_met(Some(&assessment(None, true)), 0.0));
        assert!(!escalation_criteria_met(None, 0.0));
    }

    #[test]
    fn pipeline_starts_with_triage_and_ends_with_resolution() {
        assert_eq!(PIPELINE[0], SpecialistKind::Triage);
        assert_eq!(PIPELINE[4], SpecialistKind::Resolution);
    }
}
