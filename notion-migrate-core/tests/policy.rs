use notion_migrate_core::error::{MigrateError, ParseError, RemoteError};
use notion_migrate_core::policy::{CallSite, Disposition, FailurePolicy};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn status(status: u16) -> RemoteError {
    RemoteError::Status {
        status,
        code: "code".into(),
        message: "message".into(),
    }
}

#[test]
fn only_unapplied_failures_are_retryable() {
    assert!(status(429).is_retryable());
    assert!(status(409).is_retryable());
    assert!(!status(500).is_retryable(), "the write may have happened");
    assert!(!status(503).is_retryable());
    assert!(!status(400).is_retryable());
    assert!(!status(404).is_retryable());
    assert!(!RemoteError::BatchTooLarge {
        size: 101,
        limit: 100
    }
    .is_retryable());
    assert!(!RemoteError::Decode("bad json".into()).is_retryable());
}

async fn timed_out_request() -> RemoteError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let err = http
        .post(format!("{}/v1/pages", server.uri()))
        .send()
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    RemoteError::Transport(err)
}

#[tokio::test]
async fn a_creation_that_timed_out_is_not_repeated() {
    let policy = FailurePolicy::default();
    let calls = AtomicU32::new(0);
    let error = Mutex::new(Some(timed_out_request().await));

    let result: Result<String, MigrateError> = policy
        .retry(CallSite::new("create_empty_document", "parent"), || {
            calls.fetch_add(1, Ordering::SeqCst);
            let err = error.lock().unwrap().take();
            async move { Err(err.unwrap_or_else(|| status(500))) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        result,
        Err(MigrateError::RemoteWrite {
            source: RemoteError::Transport(_),
            ..
        })
    ));
}

#[tokio::test]
async fn refused_connections_are_retryable() {
    let err = reqwest::Client::new()
        .get("http://127.0.0.1:9/")
        .send()
        .await
        .unwrap_err();

    assert!(RemoteError::Transport(err).is_retryable());
}

#[test]
fn each_error_class_has_a_disposition() {
    let policy = FailurePolicy::default();
    let transform = MigrateError::Transform {
        path: PathBuf::from("a.md"),
        source: ParseError("x".into()),
    };
    let remote = MigrateError::RemoteWrite {
        operation: "append_blocks",
        destination_id: "d".into(),
        source: status(400),
    };
    assert_eq!(policy.disposition(&transform), Disposition::Recover);
    assert_eq!(policy.disposition(&remote), Disposition::Skip);
    assert_eq!(
        policy.disposition(&MigrateError::Config("no root".into())),
        Disposition::Halt
    );
}

#[test]
fn backoff_doubles_up_to_the_cap() {
    let policy = FailurePolicy {
        max_attempts: 10,
        base_delay_ms: 500,
        max_delay_ms: 3_000,
    };
    assert_eq!(policy.delay_for(1), Duration::from_millis(500));
    assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
    assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
    assert_eq!(policy.delay_for(4), Duration::from_millis(3_000));
    assert_eq!(policy.delay_for(60), Duration::from_millis(3_000));
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_max_attempts() {
    let policy = FailurePolicy::default();
    let calls = AtomicU32::new(0);

    let result: Result<(), MigrateError> = policy
        .retry(CallSite::new("append_blocks", "doc"), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status(429)) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match result {
        Err(MigrateError::RemoteWrite {
            operation,
            destination_id,
            ..
        }) => {
            assert_eq!(operation, "append_blocks");
            assert_eq!(destination_id, "doc");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let policy = FailurePolicy::default();
    let calls = AtomicU32::new(0);

    let skipped: Option<()> = policy
        .or_skip(CallSite::new("create_empty_document", "parent"), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status(400)) }
        })
        .await;

    assert!(skipped.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn successes_pass_through() {
    let value = FailurePolicy::no_retry()
        .or_skip(CallSite::new("create_folder_document", "p"), || async {
            Ok::<_, RemoteError>(42)
        })
        .await;
    assert_eq!(value, Some(42));
}
