//! Filename Parser
//!
//! Holdings files are named `<free text> <free text> <token>_<suffix>`, e.g.
//! `Holdings_2023-11-29 0209 12345_SEVNET.h`. The identity token is the part
//! of the third space-separated field before its first underscore.

use serde_json::Value;
use tracing::{info, warn};

use super::payload::{AcceptedPayload, ArrivalPayload, ParseOutcome, PayloadStatus, RejectedPayload};
use super::run::{PipelineRun, RunStores};
use crate::audit::REASON_IDENTITY_NOT_POPULATED;
use crate::error::{PipelineError, Result};

/// Extract the identity token, or `None` when it is not populated
pub fn extract_identity_token(file_name: &str) -> Option<&str> {
    let third = file_name.split(' ').nth(2)?;
    let token = third.split('_').next()?;
    (!token.is_empty()).then_some(token)
}

/// Move a PENDING run to ACCEPTED or REJECTED
pub fn classify(run: &mut PipelineRun) -> Result<()> {
    match extract_identity_token(run.file_name()) {
        Some(token) => {
            let token = token.to_string();
            info!("Identity token '{}' extracted", token);
            run.accept(token)
        },
        None => {
            warn!("Identity reference not populated");
            run.reject(REASON_IDENTITY_NOT_POPULATED)
        },
    }
}

/// Classify an arrival document
///
/// Never fails: a document that cannot be read as an arrival payload is
/// rejected with the same shape as an unpopulated identity token, using
/// whatever fields it does carry.
pub fn parse_payload(document: &Value, stores: &RunStores) -> ParseOutcome {
    match serde_json::from_value::<ArrivalPayload>(document.clone())
        .map_err(PipelineError::from)
        .and_then(|payload| payload.into_run(stores))
    {
        Ok(mut run) => match classify(&mut run) {
            Ok(()) => outcome_for(&run).unwrap_or_else(|| malformed(document, stores)),
            Err(e) => {
                warn!("Failed to classify '{}': {}", run.file_name(), e);
                malformed(document, stores)
            },
        },
        Err(e) => {
            warn!("Malformed arrival payload: {}", e);
            malformed(document, stores)
        },
    }
}

fn outcome_for(run: &PipelineRun) -> Option<ParseOutcome> {
    if run.identity_token().is_some() {
        AcceptedPayload::from_run(run).ok().map(ParseOutcome::Accepted)
    } else {
        RejectedPayload::from_run(run).ok().map(ParseOutcome::Rejected)
    }
}

fn malformed(document: &Value, stores: &RunStores) -> ParseOutcome {
    let details = document.pointer("/filedetails/0");
    let field = |name: &str| {
        details
            .and_then(|d| d.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let name = field("name");
    let key = field("key").or_else(|| name.clone()).unwrap_or_default();
    let bucket = field("bucket").unwrap_or_default();
    let id = field("id").or_else(|| {
        document
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let top = |name: &str| document.get(name).and_then(Value::as_str).map(str::to_string);

    ParseOutcome::Rejected(RejectedPayload {
        status: PayloadStatus::Failure,
        bucket: field("error_bucket").unwrap_or_else(|| stores.error_bucket.clone()),
        copy_source: format!("{}/{}", bucket, key),
        target_key: key,
        id,
        file: name,
        reason: Some(REASON_IDENTITY_NOT_POPULATED.to_string()),
        log_group: top("log_group"),
        log_stream: top("log_stream"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::run::RunStatus;
    use proptest::prelude::*;
    use serde_json::json;

    fn stores() -> RunStores {
        RunStores {
            user_bucket: "user".into(),
            archive_bucket: "zips".into(),
            error_bucket: "errors".into(),
        }
    }

    fn arrival(name: &str) -> Value {
        json!({
            "id": "req-1",
            "filedetails": [{
                "id": "req-1",
                "name": name,
                "bucket": "staging",
                "error_bucket": "errors",
                "key": format!("sftp/{}", name)
            }]
        })
    }

    #[test]
    fn test_scenario_a_token_extracted() {
        assert_eq!(
            extract_identity_token("Holdings_2023-11-29 0209 12345_SEVNET.h"),
            Some("12345")
        );
    }

    #[test]
    fn test_scenario_b_empty_token() {
        assert_eq!(extract_identity_token("Holdings_2023-11-29 0209 _SEVNET.h"), None);
    }

    #[test]
    fn test_too_few_fields() {
        assert_eq!(extract_identity_token("Holdings_2023-11-29"), None);
        assert_eq!(extract_identity_token("a b"), None);
        assert_eq!(extract_identity_token(""), None);
    }

    #[test]
    fn test_token_without_underscore_is_whole_field() {
        assert_eq!(extract_identity_token("a b 999"), Some("999"));
        assert_eq!(extract_identity_token("a b 1_2_3 trailing"), Some("1"));
    }

    #[test]
    fn test_double_space_yields_empty_field() {
        // "a  b" splits into ["a", "", "b"]
        assert_eq!(extract_identity_token("a  b_c"), Some("b"));
        assert_eq!(extract_identity_token("a   _c"), None);
    }

    #[test]
    fn test_classify_sets_status() {
        let payload: ArrivalPayload = serde_json::from_value(arrival("a b 7_x.h")).unwrap();
        let mut run = payload.into_run(&stores()).unwrap();

        classify(&mut run).unwrap();
        assert_eq!(run.status(), RunStatus::Accepted);
        assert_eq!(run.identity_token(), Some("7"));
    }

    #[test]
    fn test_payload_accepted() {
        match parse_payload(&arrival("Holdings_2023-11-29 0209 12345_SEVNET.h"), &stores()) {
            ParseOutcome::Accepted(payload) => {
                assert_eq!(payload.status, PayloadStatus::Success);
                assert_eq!(payload.bucket, "staging");
                assert_eq!(payload.agency_code, "12345");
                assert_eq!(payload.id, "req-1");
                assert_eq!(payload.key.as_deref(), Some("sftp/Holdings_2023-11-29 0209 12345_SEVNET.h"));
            },
            other => panic!("expected accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_rejected() {
        let name = "Holdings_2023-11-29 0209 _SEVNET.h";
        match parse_payload(&arrival(name), &stores()) {
            ParseOutcome::Rejected(payload) => {
                assert_eq!(payload.bucket, "errors");
                assert_eq!(payload.copy_source, format!("staging/sftp/{}", name));
                assert_eq!(payload.target_key, format!("sftp/{}", name));
                assert_eq!(payload.file.as_deref(), Some(name));
            },
            other => panic!("expected rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_without_top_level_id_is_accepted() {
        let document = json!({
            "filedetails": [{
                "bucket": "staging",
                "name": "Holdings_2023-11-29 0209 12345_SEVNET.h",
                "error_bucket": "errors",
                "id": "req-1"
            }]
        });
        match parse_payload(&document, &stores()) {
            ParseOutcome::Accepted(payload) => {
                assert_eq!(payload.id, "req-1");
                assert_eq!(payload.agency_code, "12345");
                assert_eq!(payload.file, "Holdings_2023-11-29 0209 12345_SEVNET.h");
                assert_eq!(payload.key, None);
            },
            other => panic!("expected accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_is_rejected_not_an_error() {
        let missing_fields = json!({"id": "req-3", "filedetails": [{"name": "a b c_d", "bucket": "staging"}]});
        match parse_payload(&missing_fields, &stores()) {
            ParseOutcome::Rejected(payload) => {
                assert_eq!(payload.bucket, "errors");
                assert_eq!(payload.copy_source, "staging/a b c_d");
                assert_eq!(payload.id.as_deref(), Some("req-3"));
            },
            other => panic!("expected rejected, got {:?}", other),
        }

        let empty = json!({});
        assert_eq!(parse_payload(&empty, &stores()).status(), PayloadStatus::Failure);
        assert_eq!(parse_payload(&json!({"filedetails": []}), &stores()).status(), PayloadStatus::Failure);
    }

    proptest! {
        #[test]
        fn prop_well_formed_names_are_accepted(
            a in "[A-Za-z0-9_-]{1,12}",
            b in "[A-Za-z0-9-]{1,8}",
            token in "[A-Za-z0-9]{1,10}",
            suffix in "[A-Za-z0-9._]{0,10}",
        ) {
            let name = format!("{} {} {}_{}", a, b, token, suffix);
            prop_assert_eq!(extract_identity_token(&name), Some(token.as_str()));
        }

        #[test]
        fn prop_fewer_than_three_fields_rejected(a in "[^ ]{0,20}", b in "[^ ]{0,20}") {
            prop_assert_eq!(extract_identity_token(&a), None);
            let two = format!("{} {}", a, b);
            prop_assert_eq!(extract_identity_token(&two), None);
        }

        #[test]
        fn prop_empty_leading_token_rejected(
            a in "[^ ]{0,12}",
            b in "[^ ]{0,12}",
            rest in "[^ ]{0,12}",
        ) {
            let name = format!("{} {} _{}", a, b, rest);
            prop_assert_eq!(extract_identity_token(&name), None);
        }
    }
}
