use callboard_core::call_log::{CallLogDraft, CallStatus};
use std::sync::Arc;

use callboard_core::store::{CallLogStore, SqliteCallLogStore};
use callboard_core::Result;
use chrono::{TimeZone, Utc};

fn draft(to: &str, status: CallStatus, duration: u64) -> CallLogDraft {
    CallLogDraft {
        to_number: to.to_string(),
        from_number: "+1777".to_string(),
        started_at: None,
        ended_at: None,
        duration_seconds: duration,
        status,
    }
}

#[tokio::test]
async fn insert_returns_fully_formed_record() -> Result<()> {
    let store = SqliteCallLogStore::open_in_memory()?;
    let started = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let record = store
        .insert(&CallLogDraft {
            started_at: Some(started),
            ended_at: Some(started + chrono::Duration::seconds(42)),
            ..draft("+1555", CallStatus::Completed, 42)
        })
        .await?;

    assert_eq!(record.to_number, "+1555");
    assert_eq!(record.from_number, "+1777");
    assert_eq!(record.duration_seconds, 42);
    assert_eq!(record.status, CallStatus::Completed);
    assert!(!record.hidden);
    assert_eq!(record.notes, "");
    assert_eq!(record.started_at, Some(started));

    let fetched = store.get(record.id).await?.expect("record should exist");
    assert_eq!(fetched, record);
    Ok(())
}

#[tokio::test]
async fn ids_are_monotonic_and_never_reused() -> Result<()> {
    let store = SqliteCallLogStore::open_in_memory()?;
    let first = store.insert(&draft("+1", CallStatus::Completed, 0)).await?;
    let second = store.insert(&draft("+2", CallStatus::Completed, 0)).await?;
    assert!(second.id > first.id);

    assert!(store.delete(second.id).await?);
    let third = store.insert(&draft("+3", CallStatus::Completed, 0)).await?;
    assert!(third.id > second.id);
    Ok(())
}

#[tokio::test]
async fn list_orders_newest_first_and_filters_hidden() -> Result<()> {
    let store = SqliteCallLogStore::open_in_memory()?;
    let a = store.insert(&draft("+1", CallStatus::Completed, 1)).await?;
    let b = store.insert(&draft("+2", CallStatus::Canceled, 2)).await?;

    let hidden = store.hide(a.id).await?.expect("hide should match");
    assert!(hidden.hidden);

    let visible = store.list(false).await?;
    assert_eq!(visible.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id]);

    let all = store.list(true).await?;
    assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id, a.id]);
    Ok(())
}

#[tokio::test]
async fn unmatched_ids_report_absence() -> Result<()> {
    let store = SqliteCallLogStore::open_in_memory()?;
    assert!(store.hide(404).await?.is_none());
    assert!(store.set_notes(404, "x").await?.is_none());
    assert!(!store.delete(404).await?);
    assert!(store.get(404).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn notes_replace_previous_value() -> Result<()> {
    let store = SqliteCallLogStore::open_in_memory()?;
    let record = store.insert(&draft("+1", CallStatus::Error, 0)).await?;
    store.set_notes(record.id, "first").await?;
    let updated = store
        .set_notes(record.id, "call back Monday")
        .await?
        .unwrap();
    assert_eq!(updated.notes, "call back Monday");
    assert_eq!(updated.status, CallStatus::Error);
    Ok(())
}

#[tokio::test]
async fn recent_orders_by_start_time() -> Result<()> {
    let store = SqliteCallLogStore::open_in_memory()?;
    let at = |h| Some(Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap());
    for (to, hour) in [("+1", 9), ("+2", 15), ("+3", 11), ("+4", 8)] {
        store
            .insert(&CallLogDraft {
                started_at: at(hour),
                ..draft(to, CallStatus::Completed, 0)
            })
            .await?;
    }
    store.insert(&draft("+5", CallStatus::Completed, 0)).await?;

    let recent = store.recent(3).await?;
    let numbers: Vec<&str> = recent.iter().map(|r| r.to_number.as_str()).collect();
    assert_eq!(numbers, vec!["+2", "+3", "+1"]);
    Ok(())
}

#[tokio::test]
async fn file_store_persists_across_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("db/callboard.db");

    let id = {
        let store = SqliteCallLogStore::open(&path)?;
        store.insert(&draft("+1555", CallStatus::Completed, 7)).await?.id
    };

    let reopened = SqliteCallLogStore::open(&path)?;
    let record = reopened.get(id).await?.expect("record should persist");
    assert_eq!(record.duration_seconds, 7);
    assert_eq!(reopened.path(), Some(path.as_path()));
    Ok(())
}

#[tokio::test]
async fn health_check_reads_database_clock() -> Result<()> {
    let store = SqliteCallLogStore::open_in_memory()?;
    let now = store.health_check().await?;
    assert!((Utc::now() - now).num_seconds().abs() < 60);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_writes_all_commit() -> Result<()> {
    let store = Arc::new(SqliteCallLogStore::open_in_memory()?);
    let mut handles = Vec::new();
    for i in 0..16u64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .insert(&draft(&format!("+1{i}"), CallStatus::Completed, i))
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.expect("insert task should not panic")?.id);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(store.list(true).await?.len(), 16);
    Ok(())
}
