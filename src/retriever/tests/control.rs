use super::*;
use std::time::Duration;
use tokio_stream::StreamExt;

fn slow_config() -> crate::config::Config {
    let mut config = test_config();
    config.retrieval.page_delay = Duration::from_millis(100);
    config
}

#[tokio::test]
async fn second_start_is_rejected_while_a_run_is_active() {
    let (retriever, _source) = create_test_retriever_with(slow_config(), ScriptedSource::paged(150, 15));

    let session = retriever.probe(&test_credentials(), "12345").await.unwrap();
    let first = retriever.start(&session, RetrievalRange::ALL).await.unwrap();
    assert!(retriever.is_running().await);
    assert_eq!(retriever.status().await, RunStatus::Running);

    let err = retriever
        .start(&session, RetrievalRange::ALL)
        .await
        .unwrap_err();
    match err {
        Error::AlreadyRunning { run } => assert_eq!(run, first.id().get()),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }

    assert!(retriever.stop().await);
    let report = first.join().await.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(!retriever.is_running().await);
    assert_eq!(retriever.status().await, RunStatus::Cancelled);
}

#[tokio::test]
async fn stop_without_active_run_returns_false() {
    let (retriever, _source) = create_test_retriever(ScriptedSource::paged(10, 15));
    assert!(!retriever.stop().await);
    assert!(!retriever.is_running().await);
    assert_eq!(retriever.status().await, RunStatus::Idle);
}

#[tokio::test]
async fn new_run_can_start_as_soon_as_finished_arrives() {
    let (retriever, source) = create_test_retriever(ScriptedSource::paged(20, 15));
    let mut events = retriever.subscribe();

    let session = retriever.probe(&test_credentials(), "12345").await.unwrap();
    let first = retriever.start(&session, RetrievalRange::ALL).await.unwrap();
    wait_for_event(&mut events, |event| matches!(event, Event::Finished { .. })).await;

    let second = retriever.start(&session, RetrievalRange::ALL).await.unwrap();
    assert_ne!(first.id(), second.id());

    let first = first.join().await.unwrap();
    let second = second.join().await.unwrap();
    assert_eq!(first.rows, second.rows);
    assert_eq!(source.pages_after(1), vec![1, 2, 1, 2]);
}

#[tokio::test]
async fn cancel_right_after_start_ends_cancelled() {
    let (retriever, source) = create_test_retriever(ScriptedSource::paged(150, 15));

    let session = retriever.probe(&test_credentials(), "12345").await.unwrap();
    let handle = retriever.start(&session, RetrievalRange::ALL).await.unwrap();
    handle.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.status.is_success());
    assert!(source.pages_after(1).len() <= 10);
    assert_eq!(report.rows.len(), report.pages_fetched.len() * 15);
}

#[tokio::test]
async fn event_stream_yields_run_events() {
    let (retriever, _source) = create_test_retriever(ScriptedSource::paged(16, 15));
    let mut stream = retriever.event_stream();

    let session = retriever.probe(&test_credentials(), "12345").await.unwrap();
    let handle = retriever.start(&session, RetrievalRange::ALL).await.unwrap();
    handle.join().await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_secs(1), stream.next()).await {
        let event = item.unwrap();
        let done = matches!(event, Event::Finished { .. });
        kinds.push(serde_json::to_value(&event).unwrap()["type"].as_str().unwrap().to_string());
        if done {
            break;
        }
    }

    assert_eq!(
        kinds,
        vec![
            "probed",
            "run_started",
            "progress",
            "rows",
            "progress",
            "rows",
            "finished"
        ]
    );
}

#[tokio::test]
async fn run_ids_increase() {
    let (retriever, _source) = create_test_retriever(ScriptedSource::paged(5, 15));
    let session = retriever.probe(&test_credentials(), "12345").await.unwrap();

    let first = retriever.start(&session, RetrievalRange::ALL).await.unwrap();
    let first_id = first.id();
    first.join().await.unwrap();
    let second = retriever.start(&session, RetrievalRange::ALL).await.unwrap();

    assert!(second.id() > first_id);
    second.join().await.unwrap();
}

#[tokio::test]
async fn crashed_run_task_releases_the_slot_and_reports_failure() {
    let (retriever, _source) = create_test_retriever(ScriptedSource::paged(60, 15).panicking_at(2));
    let mut events = retriever.subscribe();

    let session = retriever.probe(&test_credentials(), "12345").await.unwrap();
    let handle = retriever.start(&session, RetrievalRange::ALL).await.unwrap();
    let run = handle.id();

    let finished = wait_for_event(&mut events, |event| matches!(event, Event::Finished { .. })).await;
    match finished {
        Event::Finished {
            run: finished_run,
            status,
            success,
            failed_page,
            ..
        } => {
            assert_eq!(finished_run, run);
            assert_eq!(status, RunStatus::Failed);
            assert!(!success);
            assert_eq!(failed_page, None);
        }
        other => panic!("expected Finished, got {other:?}"),
    }

    let report = handle.join().await.unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.message.contains("aborted"));
    assert!(!retriever.is_running().await);
    assert_eq!(retriever.status().await, RunStatus::Failed);

    let next = retriever.start(&session, RetrievalRange::new(1, 1)).await.unwrap();
    let report = next.join().await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.rows.len(), 15);
}
