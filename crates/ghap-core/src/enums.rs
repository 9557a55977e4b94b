//! Closed enums shared by validation and by the dispatcher's advertised tool
//! schemas.
//!
//! The recurring bug in the source this substrate is modeled on was
//! advertise-vs-validate drift: the JSON schema shown to callers listed one
//! set of enum values while the validator checked another. Every closed set
//! below is defined exactly once as a `&'static [&'static str]`; both the
//! schema builders in `dispatch` and the `validate_*` functions here read the
//! same slice, and `tests::schema_and_validator_enums_never_diverge` pins
//! that equality down as a property.

use serde_json::{json, Value as Json};

use crate::error::Error;

pub const DOMAINS: &[&str] = &[
    "debugging",
    "refactoring",
    "feature",
    "testing",
    "configuration",
    "documentation",
    "performance",
    "security",
    "integration",
];

pub const STRATEGIES: &[&str] = &[
    "systematic-elimination",
    "trial-and-error",
    "research-first",
    "divide-and-conquer",
    "root-cause-analysis",
    "copy-from-similar",
    "check-assumptions",
    "read-the-error",
    "ask-user",
];

pub const ROOT_CAUSE_CATEGORIES: &[&str] = &[
    "wrong-assumption",
    "missing-knowledge",
    "oversight",
    "environment-issue",
    "misleading-symptom",
    "incomplete-fix",
    "wrong-scope",
    "test-isolation",
    "timing-issue",
];

pub const AXES: &[&str] = &["full", "strategy", "surprise", "root_cause"];

pub const OUTCOME_STATUSES: &[&str] = &["confirmed", "falsified", "abandoned"];

pub const CONFIDENCE_TIERS: &[&str] = &["gold", "silver", "bronze", "abandoned"];

pub const TASK_TYPES: &[&str] = &["feature", "bug"];

pub const REVIEW_TYPES: &[&str] = &["spec", "proposal", "code", "bugfix"];

pub const REVIEW_RESULTS: &[&str] = &["approved", "changes_requested"];

/// `memory.category` is documented as "free text within a closed set"; this
/// is the set the core ships. Unlike the other enums this one is not wired
/// into a hard validation error in the original, but exposing it centrally
/// still avoids the same advertise-vs-validate drift for callers that do
/// want to constrain it.
pub const MEMORY_CATEGORIES: &[&str] = &["fact", "preference", "error", "decision", "pattern"];

/// The collection name each axis maps to, per `AXIS_COLLECTIONS` in the
/// Python original. Stored once so every caller that needs a collection
/// name for an axis goes through the same map.
pub fn axis_collection_name(axis: &str) -> Option<&'static str> {
    match axis {
        "full" => Some("ghap_full"),
        "strategy" => Some("ghap_strategy"),
        "surprise" => Some("ghap_surprise"),
        "root_cause" => Some("ghap_root_cause"),
        _ => None,
    }
}

fn validate(field: &str, value: &str, allowed: &[&str]) -> Result<(), Error> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid {field} '{value}': must be one of [{}]",
            allowed.join(", ")
        )))
    }
}

pub fn validate_domain(value: &str) -> Result<(), Error> {
    validate("domain", value, DOMAINS)
}

pub fn validate_strategy(value: &str) -> Result<(), Error> {
    validate("strategy", value, STRATEGIES)
}

pub fn validate_root_cause_category(value: &str) -> Result<(), Error> {
    validate("root_cause.category", value, ROOT_CAUSE_CATEGORIES)
}

pub fn validate_axis(value: &str) -> Result<(), Error> {
    validate("axis", value, AXES)
}

pub fn validate_outcome_status(value: &str) -> Result<(), Error> {
    validate("outcome_status", value, OUTCOME_STATUSES)
}

pub fn validate_confidence_tier(value: &str) -> Result<(), Error> {
    validate("confidence_tier", value, CONFIDENCE_TIERS)
}

pub fn validate_task_type(value: &str) -> Result<(), Error> {
    validate("task_type", value, TASK_TYPES)
}

pub fn validate_review_type(value: &str) -> Result<(), Error> {
    validate("review_type", value, REVIEW_TYPES)
}

pub fn validate_review_result(value: &str) -> Result<(), Error> {
    validate("review_result", value, REVIEW_RESULTS)
}

/// JSON-schema property definitions for the closed enums above, so the
/// dispatcher's advertised tool schemas and the `validate_*` functions read
/// the same constant instead of carrying two hand-copied lists.
pub fn domain_schema() -> Json {
    json!({ "type": "string", "description": "Task domain", "enum": DOMAINS })
}

pub fn strategy_schema() -> Json {
    json!({ "type": "string", "description": "Problem-solving strategy", "enum": STRATEGIES })
}

pub fn axis_schema() -> Json {
    json!({ "type": "string", "description": "Clustering axis", "enum": AXES, "default": "full" })
}

pub fn outcome_status_schema() -> Json {
    json!({ "type": "string", "description": "Resolution status", "enum": OUTCOME_STATUSES })
}

pub fn confidence_tier_schema() -> Json {
    json!({ "type": "string", "description": "Confidence tier", "enum": CONFIDENCE_TIERS })
}

pub fn root_cause_category_schema() -> Json {
    json!({ "type": "string", "description": "Root cause category", "enum": ROOT_CAUSE_CATEGORIES })
}

pub fn task_type_schema() -> Json {
    json!({ "type": "string", "description": "Task type", "enum": TASK_TYPES })
}

pub fn review_type_schema() -> Json {
    json!({ "type": "string", "description": "Review type", "enum": REVIEW_TYPES })
}

pub fn review_result_schema() -> Json {
    json!({ "type": "string", "description": "Review result", "enum": REVIEW_RESULTS })
}

/// Fixed weight applied to a confidence tier when computing cluster
/// centroids (§3). `0.5` is used both for `unknown`/absent tiers and,
/// coincidentally, is the `bronze` weight.
pub fn tier_weight(tier: Option<&str>) -> f32 {
    match tier {
        Some("gold") => 1.0,
        Some("silver") => 0.8,
        Some("bronze") => 0.5,
        Some("abandoned") => 0.2,
        _ => 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_domain_accepts_every_listed_value() {
        for d in DOMAINS {
            assert!(validate_domain(d).is_ok());
        }
    }

    #[test]
    fn validate_domain_rejects_unknown_value_and_lists_all_valid_values() {
        let err = validate_domain("bogus").unwrap_err();
        let msg = err.to_string();
        assert_eq!(err.kind(), "validation_error");
        for d in DOMAINS {
            assert!(msg.contains(d), "message missing {d}: {msg}");
        }
    }

    #[test]
    fn tier_weights_match_spec_table() {
        assert_eq!(tier_weight(Some("gold")), 1.0);
        assert_eq!(tier_weight(Some("silver")), 0.8);
        assert_eq!(tier_weight(Some("bronze")), 0.5);
        assert_eq!(tier_weight(Some("abandoned")), 0.2);
        assert_eq!(tier_weight(None), 0.5);
        assert_eq!(tier_weight(Some("unknown-tier")), 0.5);
    }

    #[test]
    fn axis_collection_names_use_ghap_prefix() {
        assert_eq!(axis_collection_name("full"), Some("ghap_full"));
        assert_eq!(axis_collection_name("strategy"), Some("ghap_strategy"));
        assert_eq!(axis_collection_name("surprise"), Some("ghap_surprise"));
        assert_eq!(axis_collection_name("root_cause"), Some("ghap_root_cause"));
        assert_eq!(axis_collection_name("bogus"), None);
    }

    /// Every closed enum that the dispatcher advertises to callers through
    /// [`crate::dispatch::tool_schemas`] must list exactly the values
    /// [`validate_*`](self) accepts — neither a schema value the validator
    /// rejects, nor a validator-accepted value the schema never shows.
    #[test]
    fn schema_and_validator_enums_never_diverge() {
        let schemas = crate::dispatch::tool_schemas();

        let cases: &[(&[&str], &Json, fn(&str) -> Result<(), Error>)] = &[
            (DOMAINS, &schemas["start_ghap"]["properties"]["domain"]["enum"], validate_domain),
            (STRATEGIES, &schemas["start_ghap"]["properties"]["strategy"]["enum"], validate_strategy),
            (
                OUTCOME_STATUSES,
                &schemas["resolve_ghap"]["properties"]["status"]["enum"],
                validate_outcome_status,
            ),
            (
                CONFIDENCE_TIERS,
                &schemas["resolve_ghap"]["properties"]["confidence_tier"]["enum"],
                validate_confidence_tier,
            ),
            (
                ROOT_CAUSE_CATEGORIES,
                &schemas["resolve_ghap"]["properties"]["root_cause"]["properties"]["category"]["enum"],
                validate_root_cause_category,
            ),
            (AXES, &schemas["cluster_axis"]["properties"]["axis"]["enum"], validate_axis),
            (TASK_TYPES, &schemas["create_task"]["properties"]["task_type"]["enum"], validate_task_type),
            (
                REVIEW_TYPES,
                &schemas["record_review"]["properties"]["review_type"]["enum"],
                validate_review_type,
            ),
            (
                REVIEW_RESULTS,
                &schemas["record_review"]["properties"]["result"]["enum"],
                validate_review_result,
            ),
        ];

        for (constant, advertised, validate) in cases {
            let advertised: Vec<&str> = advertised.as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
            assert_eq!(&advertised, constant, "schema/constant drift for {constant:?}");
            for value in *constant {
                assert!(validate(value).is_ok(), "validator rejects schema-advertised value {value}");
            }
            assert!(validate("not-a-real-enum-value").is_err());
        }
    }
}
