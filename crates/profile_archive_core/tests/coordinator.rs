mod common;

use std::sync::Arc;

use common::{coordinator, local_store, posts, profile, FakeRemote, RecordingConfirmation};
use profile_archive_core::capacity::CapacityPolicy;
use profile_archive_core::domain::{Origin, ReportClassification, SessionId, Severity};
use profile_archive_core::local_store::SESSIONS_KEY;
use profile_archive_core::{
    BackendState, ConfirmPrompt, CoreError, CrawlOutcome, DegradedReason, LocalSessionStore,
    MemoryKeyValueStore, Metadata, RemoteSessions, SessionCoordinator, SessionDraft,
};
use serde_json::json;
use std::sync::atomic::Ordering;

fn draft(name: &str) -> SessionDraft {
    SessionDraft::new(name, profile(name), posts())
}

fn seed_local(local: &LocalSessionStore, names: &[&str]) {
    for name in names {
        local.save(draft(name).into_session().unwrap()).unwrap();
    }
}

#[tokio::test]
async fn without_a_remote_sessions_round_trip_through_local_storage() {
    let local = local_store();
    let coordinator = coordinator(local.clone(), None);

    let report = coordinator.save(draft("Acme")).await.unwrap();
    assert!(matches!(report.session.id, SessionId::Local(_)));
    assert_eq!(report.session.profile, Some(profile("Acme")));

    let loaded = coordinator.load().await.unwrap();
    assert_eq!(loaded.source, Origin::Local);
    assert_eq!(loaded.sessions.len(), 1);
    assert_eq!(loaded.sessions[0].name, "Acme");
    assert!(loaded.sessions[0].is_decoded());
    assert_eq!(
        coordinator.start().await,
        BackendState::Degraded(DegradedReason::NotConfigured)
    );
}

#[tokio::test]
async fn connectivity_is_reported_once() {
    let coordinator = coordinator(local_store(), None);

    let first = coordinator.load().await.unwrap();
    let second = coordinator.load().await.unwrap();

    assert_eq!(first.notices.len(), 1);
    assert_eq!(first.notices[0].severity, Severity::Info);
    assert!(second.notices.is_empty());
}

#[tokio::test]
async fn connected_saves_go_to_the_remote_only() {
    let local = local_store();
    let remote = FakeRemote::new();
    let coordinator = coordinator(local.clone(), Some(remote.clone()));

    let report = coordinator.save(draft("Acme")).await.unwrap();

    assert!(matches!(report.session.id, SessionId::Remote(_)));
    assert!(report.session.is_decoded());
    assert_eq!(remote.row_count(), 1);
    assert!(local.list().unwrap().sessions.is_empty());

    let loaded = coordinator.load().await.unwrap();
    assert_eq!(loaded.source, Origin::Remote);
    assert_eq!(loaded.sessions.len(), 1);
}

#[tokio::test]
async fn a_failed_remote_save_falls_back_to_local_storage() {
    let local = local_store();
    let remote = FakeRemote::new();
    let coordinator = coordinator(local.clone(), Some(remote.clone()));
    assert_eq!(coordinator.start().await, BackendState::Connected);

    remote.go_offline();
    let report = coordinator.save(draft("Acme")).await.unwrap();

    assert!(matches!(report.session.id, SessionId::Local(_)));
    assert_eq!(report.session.posts, Some(posts()));
    assert!(report.notices.iter().any(|n| n.severity == Severity::Warning));
    assert!(local.find(&report.session.id).unwrap().is_some());
}

#[tokio::test]
async fn a_failed_remote_load_shows_local_sessions() {
    let local = local_store();
    seed_local(&local, &["Old"]);
    let remote = FakeRemote::new();
    let coordinator = coordinator(local, Some(remote.clone()));
    coordinator.start().await;

    remote.go_offline();
    let loaded = coordinator.load().await.unwrap();

    assert_eq!(loaded.source, Origin::Local);
    assert_eq!(loaded.sessions[0].name, "Old");
}

#[tokio::test]
async fn an_unreachable_backend_stays_degraded() {
    let local = local_store();
    let remote = FakeRemote::new();
    remote.go_offline();
    let coordinator = coordinator(local.clone(), Some(remote.clone()));

    assert_eq!(
        coordinator.start().await,
        BackendState::Degraded(DegradedReason::Unreachable)
    );

    remote.offline.store(false, Ordering::SeqCst);
    let report = coordinator.save(draft("Acme")).await.unwrap();
    assert!(matches!(report.session.id, SessionId::Local(_)));
    assert_eq!(remote.row_count(), 0);
}

#[tokio::test]
async fn a_missing_schema_is_a_distinct_degraded_state() {
    let remote = FakeRemote::new();
    remote.schema_missing.store(true, Ordering::SeqCst);
    let coordinator = coordinator(local_store(), Some(remote));

    assert_eq!(
        coordinator.start().await,
        BackendState::Degraded(DegradedReason::SchemaMissing)
    );
}

#[tokio::test]
async fn an_empty_remote_with_local_sessions_suggests_migration() {
    let local = local_store();
    seed_local(&local, &["A", "B"]);
    let coordinator = coordinator(local, Some(FakeRemote::new()));

    let loaded = coordinator.load().await.unwrap();

    assert_eq!(loaded.source, Origin::Remote);
    assert!(loaded.sessions.is_empty());
    assert!(loaded.migration_suggested);
}

#[tokio::test]
async fn migration_counts_failures_and_keeps_local_originals() {
    let local = local_store();
    seed_local(&local, &["A", "B", "C"]);
    let remote = FakeRemote::new();
    remote.fail_insert_every.store(3, Ordering::SeqCst);
    let coordinator = coordinator(local.clone(), Some(remote.clone()));

    let summary = coordinator.migrate().await.unwrap();

    assert_eq!(summary.migrated, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.to_string(), "2 migrated, 1 failed");
    assert_eq!(remote.row_count(), 2);
    assert_eq!(local.list().unwrap().sessions.len(), 3);

    let retry = coordinator.migrate().await.unwrap();
    assert_eq!(retry.migrated, 1);
    assert_eq!(retry.skipped, 2);
    assert_eq!(remote.row_count(), 3);
}

#[tokio::test]
async fn migration_needs_a_connected_remote_and_local_sessions() {
    let offline = coordinator(local_store(), None);
    assert!(matches!(
        offline.migrate().await,
        Err(CoreError::MigrationUnavailable(_))
    ));

    let empty = coordinator(local_store(), Some(FakeRemote::new()));
    assert!(matches!(
        empty.migrate().await,
        Err(CoreError::MigrationUnavailable(_))
    ));
}

#[tokio::test]
async fn migrating_a_nearly_full_store_copies_and_keeps_every_session() {
    let local = local_store();
    for i in 0..5 {
        let name = format!("Big{}", i);
        let profile = json!([{ "title": name, "bio": "x".repeat(650_000) }]);
        let draft = SessionDraft::new(name.as_str(), profile, posts());
        local.save(draft.into_session().unwrap()).unwrap();
    }
    let usage = local.usage().unwrap();
    assert_eq!(usage.session_count, 5);
    assert!(local.policy().is_near_quota(usage.used_bytes));

    let remote = FakeRemote::new();
    let confirmation = RecordingConfirmation::new(true);
    let coordinator = SessionCoordinator::new(
        local.clone(),
        Some(RemoteSessions::new(remote.clone())),
        confirmation.clone(),
    );

    let summary = coordinator.offer_migration().await.unwrap().unwrap();

    assert_eq!(
        confirmation.prompts.lock().unwrap().as_slice(),
        &[ConfirmPrompt::MigrateLocalSessions { count: 5 }]
    );
    assert_eq!(summary.to_string(), "5 migrated, 0 failed");
    assert_eq!(remote.row_count(), 5);
    let kept = local.sessions().unwrap().sessions;
    assert_eq!(kept.len(), 5);
    assert!(kept.iter().all(|s| s.remote_copy.is_some()));
}

#[tokio::test]
async fn a_copy_that_cannot_be_recorded_locally_still_counts_as_migrated() {
    let seeded = local_store();
    seed_local(&seeded, &["A", "B"]);
    let raw = serde_json::to_string(&seeded.sessions().unwrap().sessions).unwrap();

    // Room for the collection as it is, not for the remote_copy links.
    let quota = raw.len() + 20;
    let kv = Arc::new(MemoryKeyValueStore::with_quota(quota));
    kv.preload(SESSIONS_KEY, &raw).unwrap();
    let local = LocalSessionStore::new(kv, CapacityPolicy::with_quota(quota));
    let remote = FakeRemote::new();
    let coordinator = coordinator(local.clone(), Some(remote.clone()));

    let summary = coordinator.migrate().await.unwrap();

    assert_eq!(summary.to_string(), "2 migrated, 0 failed");
    assert_eq!(remote.row_count(), 2);
    let kept = local.sessions().unwrap().sessions;
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|s| s.remote_copy.is_none()));
}

#[tokio::test]
async fn declined_migration_offer_does_nothing() {
    let local = local_store();
    seed_local(&local, &["A"]);
    let remote = FakeRemote::new();
    let confirmation = RecordingConfirmation::new(false);
    let coordinator = SessionCoordinator::new(
        local,
        Some(profile_archive_core::RemoteSessions::new(remote.clone())),
        confirmation.clone(),
    );

    assert!(coordinator.offer_migration().await.unwrap().is_none());
    assert_eq!(
        confirmation.prompts.lock().unwrap().as_slice(),
        &[ConfirmPrompt::MigrateLocalSessions { count: 1 }]
    );
    assert_eq!(remote.row_count(), 0);
}

#[tokio::test]
async fn deleting_a_migrated_session_removes_both_copies() {
    let local = local_store();
    seed_local(&local, &["A"]);
    let remote = FakeRemote::new();
    let coordinator = coordinator(local.clone(), Some(remote.clone()));
    coordinator.migrate().await.unwrap();

    let remote_id = coordinator.load().await.unwrap().sessions[0].id.clone();
    local.set_field_override(&remote_id, "name", "Alias").unwrap();

    let report = coordinator.delete(&remote_id).await.unwrap();

    assert!(report.remote_removed);
    assert!(report.local_removed);
    assert_eq!(remote.row_count(), 0);
    assert!(local.list().unwrap().sessions.is_empty());
    assert!(local.field_override(&remote_id, "name").unwrap().is_none());
}

#[tokio::test]
async fn deleting_an_unknown_session_reports_nothing_removed() {
    let coordinator = coordinator(local_store(), Some(FakeRemote::new()));
    let report = coordinator
        .delete(&SessionId::Remote(uuid::Uuid::new_v4()))
        .await
        .unwrap();
    assert!(!report.removed());
}

#[tokio::test]
async fn metadata_updates_are_routed_by_origin() {
    let local = local_store();
    seed_local(&local, &["Local"]);
    let local_id = local.list().unwrap().sessions[0].id.clone();
    let remote = FakeRemote::new();
    let coordinator = coordinator(local.clone(), Some(remote.clone()));
    let remote_id = coordinator.save(draft("Remote")).await.unwrap().session.id;

    let mut patch = Metadata::new();
    patch.insert("tag".to_string(), json!("vip"));
    assert!(coordinator.update_metadata(&local_id, patch.clone()).await.unwrap());
    assert!(coordinator.update_metadata(&remote_id, patch).await.unwrap());

    assert_eq!(local.find(&local_id).unwrap().unwrap().metadata["tag"], "vip");
    assert_eq!(coordinator.open(&remote_id).await.unwrap().metadata["tag"], "vip");
    assert!(!coordinator
        .update_metadata(&SessionId::Local("1".to_string()), Metadata::new())
        .await
        .unwrap());
}

#[tokio::test]
async fn reports_are_stored_under_metadata() {
    let local = local_store();
    let coordinator = coordinator(local.clone(), None);
    let id = coordinator.save(draft("Acme")).await.unwrap().session.id;
    let classification = ReportClassification {
        level: "HIGH".to_string(),
        description: "Elevated activity".to_string(),
        color: "#d9534f".to_string(),
    };

    assert!(coordinator.attach_report(&id, "Summary text", &classification).await.unwrap());

    let session = coordinator.open(&id).await.unwrap();
    assert_eq!(session.metadata["intelligence_report"], "Summary text");
    assert_eq!(session.metadata["threat_classification"]["level"], "HIGH");
}

#[tokio::test]
async fn opening_a_missing_or_corrupt_session_fails() {
    let local = local_store();
    let coordinator = coordinator(local.clone(), None);
    assert!(matches!(
        coordinator.open(&SessionId::Local("42".to_string())).await,
        Err(CoreError::NotFound(_))
    ));

    let mut broken = draft("Broken").into_session().unwrap();
    broken.compressed_profile = "***".to_string();
    broken.profile = None;
    let id = local.save(broken).unwrap().session.id;
    assert!(matches!(coordinator.open(&id).await, Err(CoreError::Corrupted(_))));
}

#[tokio::test]
async fn crawl_failures_surface_as_input_errors() {
    let coordinator = coordinator(local_store(), None);
    let err = coordinator
        .save_crawl("Crawl", CrawlOutcome::TimedOut { attempts: 60 })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Intake(_)));
}

#[tokio::test]
async fn empty_names_are_rejected_before_anything_is_stored() {
    let local = local_store();
    let coordinator = coordinator(local.clone(), None);
    assert!(matches!(
        coordinator.save(draft("  ")).await,
        Err(CoreError::Intake(_))
    ));
    assert!(local.list().unwrap().sessions.is_empty());
}

fn tight_local(quota: usize) -> LocalSessionStore {
    LocalSessionStore::new(
        Arc::new(MemoryKeyValueStore::with_quota(quota)),
        CapacityPolicy::with_quota(quota),
    )
}

fn bulky(name: &str) -> SessionDraft {
    SessionDraft::new(name, json!([{ "title": "x".repeat(2_000) }]), posts())
}

#[tokio::test]
async fn confirmed_clear_makes_room_for_the_next_save() {
    let local = tight_local(5_000);
    let confirmation = RecordingConfirmation::new(true);
    let coordinator = SessionCoordinator::new(local.clone(), None, confirmation.clone());

    coordinator.save(bulky("First")).await.unwrap();
    let report = coordinator.save(bulky("Second")).await.unwrap();

    let prompts = confirmation.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(matches!(prompts[0], ConfirmPrompt::ClearLocalSessions { quota_bytes: 5_000, .. }));
    let remaining = local.list().unwrap().sessions;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, report.session.id);
}

#[tokio::test]
async fn declined_clear_ends_in_storage_full() {
    let local = tight_local(5_000);
    let coordinator =
        SessionCoordinator::new(local.clone(), None, RecordingConfirmation::new(false));

    coordinator.save(bulky("First")).await.unwrap();
    let err = coordinator.save(bulky("Second")).await.unwrap_err();

    assert!(matches!(err, CoreError::StorageFull(_)));
    assert_eq!(local.list().unwrap().sessions[0].name, "First");
}

#[tokio::test]
async fn usage_reflects_stored_sessions() {
    let coordinator = coordinator(local_store(), None);
    coordinator.save(draft("Acme")).await.unwrap();

    let usage = coordinator.usage().unwrap();
    assert_eq!(usage.session_count, 1);
    assert!(usage.used_bytes > 0);
    assert!(usage.percent_used() < 1.0);
}
