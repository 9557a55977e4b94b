//! Task Phase Machine (§4.I), ported directly from
//! `calm/orchestration/phases.py`'s transition tables: a pure function over
//! a task's `task_type` and current `phase`. `DONE` (or its bug equivalent)
//! has no successors; no other transitions exist.

use crate::error::Error;

const FEATURE_PHASES: &[&str] = &[
    "SPEC",
    "DESIGN",
    "IMPLEMENT",
    "CODE_REVIEW",
    "TEST",
    "INTEGRATE",
    "VERIFY",
    "DONE",
];

const BUG_PHASES: &[&str] = &[
    "REPORTED",
    "INVESTIGATED",
    "FIXED",
    "REVIEWED",
    "TESTED",
    "MERGED",
    "DONE",
];

fn phases_for(task_type: &str) -> Result<&'static [&'static str], Error> {
    match task_type {
        "feature" => Ok(FEATURE_PHASES),
        "bug" => Ok(BUG_PHASES),
        other => Err(Error::Validation(format!(
            "invalid task_type '{other}': must be one of [feature, bug]"
        ))),
    }
}

/// The phase a newly created task of this type starts in.
pub fn initial_phase(task_type: &str) -> Result<&'static str, Error> {
    Ok(phases_for(task_type)?[0])
}

/// All phases for this task type, in pipeline order.
pub fn get_phases(task_type: &str) -> Result<&'static [&'static str], Error> {
    phases_for(task_type)
}

/// The single forward phase reachable from `phase`, or none if `phase` is
/// terminal (`DONE`) or unrecognized.
pub fn next_phases(task_type: &str, phase: &str) -> Result<Vec<&'static str>, Error> {
    let phases = phases_for(task_type)?;
    match phases.iter().position(|p| *p == phase) {
        Some(idx) if idx + 1 < phases.len() => Ok(vec![phases[idx + 1]]),
        _ => Ok(Vec::new()),
    }
}

pub fn is_valid_transition(task_type: &str, from: &str, to: &str) -> Result<bool, Error> {
    Ok(next_phases(task_type, from)?.contains(&to))
}

/// `"{from}->{to}"`, used for error messages and gate-requirement lookups.
pub fn transition_name(from: &str, to: &str) -> String {
    format!("{from}->{to}")
}

pub fn parse_transition(name: &str) -> Option<(&str, &str)> {
    name.split_once("->")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_phase_for_feature_is_spec() {
        assert_eq!(initial_phase("feature").unwrap(), "SPEC");
    }

    #[test]
    fn initial_phase_for_bug_is_reported() {
        assert_eq!(initial_phase("bug").unwrap(), "REPORTED");
    }

    #[test]
    fn feature_phase_chain_is_exactly_the_spec_order() {
        assert_eq!(
            get_phases("feature").unwrap(),
            &["SPEC", "DESIGN", "IMPLEMENT", "CODE_REVIEW", "TEST", "INTEGRATE", "VERIFY", "DONE"]
        );
    }

    #[test]
    fn done_has_no_successors() {
        assert!(next_phases("feature", "DONE").unwrap().is_empty());
        assert!(next_phases("bug", "DONE").unwrap().is_empty());
    }

    #[test]
    fn only_the_forward_edge_is_a_valid_transition() {
        assert!(is_valid_transition("feature", "SPEC", "DESIGN").unwrap());
        assert!(!is_valid_transition("feature", "SPEC", "IMPLEMENT").unwrap());
        assert!(!is_valid_transition("feature", "DESIGN", "SPEC").unwrap());
    }

    #[test]
    fn unknown_task_type_is_a_validation_error() {
        let err = initial_phase("epic").unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
