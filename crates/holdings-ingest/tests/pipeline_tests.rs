//! End-to-end pipeline tests against the in-memory collaborators
//!
//! Each test stages files through the fetcher (or directly), opens runs from
//! object-created notifications and drives them to completion.

use holdings_common::logging::init_test_logging;
use holdings_ingest::audit::{AuditDestination, MemoryAuditSink, REASON_IDENTITY_NOT_POPULATED};
use holdings_ingest::delivery::MemoryDelivery;
use holdings_ingest::pipeline::archiver::build_archive;
use holdings_ingest::pipeline::fetcher::DEFAULT_STAGING_PREFIX;
use holdings_ingest::pipeline::{
    AcceptedPayload, ArrivalNotifier, FetchConfig, LogContext, ObjectCreatedEvent, ParseOutcome, Pipeline,
    PipelineRun, RemoteFetcher, RunStatus, RunStores,
};
use holdings_ingest::storage::{MemoryStore, ObjectLocation, ObjectStore};
use holdings_ingest::transport::MemoryTransport;
use holdings_ingest::PipelineError;
use std::io::{Cursor, Read};
use std::sync::Arc;

const STAGING: &str = "holdings-staging";
const REMOTE_DIR: &str = "/outbound";

const ACCEPTED_NAME: &str = "Holdings_2023-11-29 0209 12345_SEVNET.h";
const REJECTED_NAME: &str = "Holdings_2023-11-29 0209 _SEVNET.h";

struct Fixture {
    transport: MemoryTransport,
    store: MemoryStore,
    delivery: MemoryDelivery,
    audit: MemoryAuditSink,
}

impl Fixture {
    fn new() -> Self {
        init_test_logging();
        Self {
            transport: MemoryTransport::new(),
            store: MemoryStore::new(),
            delivery: MemoryDelivery::new(),
            audit: MemoryAuditSink::new(),
        }
    }

    fn stores() -> RunStores {
        RunStores {
            user_bucket: "holdings-user".into(),
            archive_bucket: "holdings-zips".into(),
            error_bucket: "holdings-errors".into(),
        }
    }

    fn audit_destination() -> AuditDestination {
        AuditDestination {
            log_group: "cee-audit".into(),
            log_stream: "holdings".into(),
        }
    }

    fn fetcher(&self) -> RemoteFetcher {
        RemoteFetcher::new(
            Arc::new(self.transport.clone()),
            Arc::new(self.store.clone()),
            FetchConfig {
                remote_directory: REMOTE_DIR.into(),
                staging_bucket: STAGING.into(),
                staging_prefix: DEFAULT_STAGING_PREFIX.into(),
                concurrency: 3,
                log_context: Some(LogContext {
                    log_group: "holdings-runs".into(),
                    log_stream: "2023-11-29".into(),
                }),
            },
        )
    }

    fn notifier(&self) -> ArrivalNotifier {
        ArrivalNotifier::new(Arc::new(self.store.clone()), Self::stores(), DEFAULT_STAGING_PREFIX)
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            Arc::new(self.store.clone()),
            Arc::new(self.delivery.clone()),
            Arc::new(self.audit.clone()),
            Self::stores(),
            Self::audit_destination(),
        )
    }

    /// Fetch everything, then open a run for `name`
    async fn fetch_and_notify(&self, name: &str) -> PipelineRun {
        self.fetcher().fetch().await.unwrap();
        self.notifier()
            .notify(&notification(name, "req-42"))
            .await
            .unwrap()
            .run
    }
}

/// S3-style notification; spaces in the key are encoded as '+'
fn notification(name: &str, request_id: &str) -> ObjectCreatedEvent {
    let key = format!("sftp/{}", name).replace(' ', "+");
    serde_json::from_value(serde_json::json!({
        "Records": [{
            "eventTime": "2023-11-29T02:09:13.000Z",
            "responseElements": {"x-amz-request-id": request_id},
            "s3": {"bucket": {"name": STAGING}, "object": {"key": key}}
        }]
    }))
    .unwrap()
}

fn unzip_single(bytes: &[u8]) -> (String, Vec<u8>) {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 1);
    let mut entry = archive.by_index(0).unwrap();
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    (entry.name().to_string(), content)
}

#[tokio::test]
async fn test_scenario_a_accepted_file_is_forwarded() {
    let fx = Fixture::new();
    fx.transport
        .add_file(REMOTE_DIR, ACCEPTED_NAME, "H|12345|ACME|1000\n")
        .await;

    let run = fx.fetch_and_notify(ACCEPTED_NAME).await;
    assert_eq!(run.file_name(), ACCEPTED_NAME);
    assert_eq!(run.correlation_id(), "req-42");

    let run = fx.pipeline().drive(run).await.unwrap();
    assert_eq!(run.status(), RunStatus::Forwarded);
    assert_eq!(run.identity_token(), Some("12345"));

    let manifests = fx.delivery.accepted().await;
    assert_eq!(manifests.len(), 1);
    let wire = serde_json::to_value(&manifests[0]).unwrap();
    assert_eq!(
        wire,
        serde_json::json!({
            "id": "req-42",
            "body": {
                "externalHoldingsId": "12345",
                "type": "Holdings",
                "files": [{"path": format!("s3://holdings-zips/{}.zip", ACCEPTED_NAME)}]
            }
        })
    );

    let mirrored = ObjectLocation::new("holdings-user", format!("sftp/{}", ACCEPTED_NAME));
    assert!(fx.store.exists(&mirrored).await.unwrap());
    assert!(fx.audit.events().await.is_empty());
}

#[tokio::test]
async fn test_scenario_b_rejected_file_is_reported() {
    let fx = Fixture::new();
    fx.transport.add_file(REMOTE_DIR, REJECTED_NAME, "rows").await;

    let run = fx.fetch_and_notify(REJECTED_NAME).await;
    let run = fx.pipeline().drive(run).await.unwrap();

    assert_eq!(run.status(), RunStatus::Rejected);
    assert_eq!(run.identity_token(), None);

    let error_copy = ObjectLocation::new("holdings-errors", format!("sftp/{}", REJECTED_NAME));
    assert_eq!(fx.store.get(&error_copy).await.unwrap().data, b"rows");
    let staged = ObjectLocation::new(STAGING, format!("sftp/{}", REJECTED_NAME));
    assert!(fx.store.exists(&staged).await.unwrap(), "staged original must stay");

    let events = fx.audit.events().await;
    assert_eq!(events.len(), 1);
    let (destination, event) = &events[0];
    assert_eq!(destination, &Fixture::audit_destination());
    assert!(event.message.starts_with("REPORT|email|Holdings|failure||||"));
    assert!(event.message.contains(REASON_IDENTITY_NOT_POPULATED));
    assert!(event.message.contains(&format!("|{}|req-42|", REJECTED_NAME)));
    assert!(event.message.ends_with("|DEFAULTED"));

    assert!(fx.delivery.accepted().await.is_empty());
    let zips = fx.store.list("holdings-zips", "").await.unwrap();
    assert!(zips.is_empty());
}

#[tokio::test]
async fn test_scenario_c_refused_forward_keeps_archive() {
    let fx = Fixture::new();
    fx.transport.add_file(REMOTE_DIR, ACCEPTED_NAME, "content").await;
    fx.delivery.fail_next("workflow start returned 500").await;

    let run = fx.fetch_and_notify(ACCEPTED_NAME).await;
    let run = fx.pipeline().drive(run).await.unwrap();

    assert_eq!(run.status(), RunStatus::Archived);
    assert!(run.error_note().unwrap().contains("500"));
    assert!(fx.delivery.accepted().await.is_empty());

    let archive = run.archive_location().unwrap();
    let (entry, content) = unzip_single(&fx.store.get(&archive).await.unwrap().data);
    assert_eq!(entry, ACCEPTED_NAME);
    assert_eq!(content, b"content");
}

#[tokio::test]
async fn test_fetch_continues_past_failed_file() {
    let fx = Fixture::new();
    for name in ["a b 1_x.h", "a b 2_x.h", "a b 3_x.h"] {
        fx.transport.add_file(REMOTE_DIR, name, name).await;
    }
    fx.transport.fail_reads_of("/outbound/a b 2_x.h").await;

    let report = fx.fetcher().fetch().await.unwrap();

    assert_eq!(report.listed, 3);
    assert_eq!(report.staged, vec!["sftp/a b 1_x.h", "sftp/a b 3_x.h"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "a b 2_x.h");
    assert!(matches!(
        fx.store
            .get(&ObjectLocation::new(STAGING, "sftp/a b 2_x.h"))
            .await
            .unwrap_err(),
        PipelineError::Storage(_)
    ));
}

#[tokio::test]
async fn test_staged_bytes_reach_the_archive_unchanged() {
    let fx = Fixture::new();
    let content: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    fx.transport
        .add_file(REMOTE_DIR, ACCEPTED_NAME, content.clone())
        .await;

    let run = fx.fetch_and_notify(ACCEPTED_NAME).await;
    let staged = fx.store.get(&run.source()).await.unwrap();
    assert_eq!(staged.data, content);

    let run = fx.pipeline().drive(run).await.unwrap();
    let archive = fx.store.get(&run.archive_location().unwrap()).await.unwrap();
    let (_, unpacked) = unzip_single(&archive.data);
    assert_eq!(unpacked, content);
}

#[tokio::test]
async fn test_archiving_twice_is_byte_identical() {
    let fx = Fixture::new();
    fx.transport.add_file(REMOTE_DIR, ACCEPTED_NAME, "same input").await;
    let run = fx.fetch_and_notify(ACCEPTED_NAME).await;
    let pipeline = fx.pipeline();

    let accepted = pipeline.classify(run).await.unwrap();
    let first = pipeline.archive(accepted.clone()).await.unwrap();
    let first_bytes = fx.store.get(&first.archive_location().unwrap()).await.unwrap().data;

    let second = pipeline.archive(accepted).await.unwrap();
    let second_bytes = fx.store.get(&second.archive_location().unwrap()).await.unwrap().data;

    assert_eq!(first.archive_key(), second.archive_key());
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first_bytes, build_archive(ACCEPTED_NAME, b"same input").unwrap());
    assert_eq!(fx.store.list("holdings-zips", "").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_arrival_payload_is_rejected() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline();

    let outcome = pipeline.parse_payload(&serde_json::json!({"id": "req-9", "filedetails": []}));
    let payload = match outcome {
        ParseOutcome::Rejected(payload) => payload,
        other => panic!("expected rejection, got {:?}", other),
    };
    assert_eq!(payload.bucket, "holdings-errors");

    // The rejection handler cannot locate anything to copy
    let err = pipeline.reject_payload(payload).await.unwrap_err();
    assert!(matches!(err, PipelineError::MalformedPayload(_)));
}

#[tokio::test]
async fn test_payload_stages_chain_like_the_driver() {
    let fx = Fixture::new();
    fx.transport.add_file(REMOTE_DIR, REJECTED_NAME, "rows").await;
    fx.fetcher().fetch().await.unwrap();

    let arrival = fx
        .notifier()
        .notify(&notification(REJECTED_NAME, "req-77"))
        .await
        .unwrap();
    let document = serde_json::to_value(&arrival.payload).unwrap();
    assert_eq!(document["log_group"], "holdings-runs");

    let pipeline = fx.pipeline();
    let rejected = match pipeline.parse_payload(&document) {
        ParseOutcome::Rejected(payload) => payload,
        other => panic!("expected rejection, got {:?}", other),
    };
    assert_eq!(rejected.copy_source, format!("{}/sftp/{}", STAGING, REJECTED_NAME));

    let run = pipeline.reject_payload(rejected).await.unwrap();
    assert_eq!(run.correlation_id(), "req-77");
    assert_eq!(run.log_context().unwrap().log_stream, "2023-11-29");
    assert_eq!(fx.audit.messages().await.len(), 1);
}

#[tokio::test]
async fn test_failed_archive_hands_back_printable_run() {
    let fx = Fixture::new();
    fx.transport.add_file(REMOTE_DIR, ACCEPTED_NAME, "rows").await;
    fx.fetcher().fetch().await.unwrap();
    fx.store
        .deny_writes_to(ObjectLocation::new("holdings-zips", format!("{}.zip", ACCEPTED_NAME)))
        .await;

    let payload: AcceptedPayload = serde_json::from_value(serde_json::json!({
        "status": "success",
        "bucket": STAGING,
        "file": ACCEPTED_NAME,
        "key": format!("sftp/{}", ACCEPTED_NAME),
        "id": "req-13",
        "agency_code": "12345"
    }))
    .unwrap();

    let pipeline = fx.pipeline();
    let run = payload.into_run(pipeline.stores()).unwrap();
    let err = pipeline.archive(run).await.unwrap_err();

    let printed = serde_json::to_value(&*err.run).unwrap();
    assert_eq!(printed["status"], "FAILED");
    assert_eq!(printed["correlationId"], "req-13");
    assert!(printed["errorNote"].as_str().unwrap().starts_with("Storage error"));
    assert!(fx.delivery.accepted().await.is_empty());
}
