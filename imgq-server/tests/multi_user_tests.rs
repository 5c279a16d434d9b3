//! Multi-user mode: admin-managed queues and assignment-keyed annotations

mod helpers;

use helpers::*;
use imgq_common::{AssignmentStatus, Error, Identity, Mode, Role};
use imgq_server::services::{
    Aggregator, AnnotationStore, AssignmentLedger, NextWork, Payload, StatusFilter, Target,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::SqlitePool;

fn assignment_target(assignment_id: &str) -> Target {
    Target::Assignment {
        assignment_id: assignment_id.to_string(),
        image_id: None,
    }
}

async fn next_assignment_id(ledger: &AssignmentLedger, user: &Identity) -> Option<String> {
    let mut rng = StdRng::seed_from_u64(0);
    match ledger.next_work_item(&user.user_id, &mut rng).await.unwrap() {
        NextWork::AllComplete => None,
        NextWork::Item(item) => item.assignment.map(|a| a.id),
    }
}

async fn image_revision(pool: &SqlitePool, image_id: &str) -> i64 {
    sqlx::query_scalar("SELECT annotation_count FROM images WHERE id = ?")
        .bind(image_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_bulk_assign_splits_catalog_disjointly() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 5).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;
    let b = create_user(&pool, "ben", Role::Annotator).await;
    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);

    assert_eq!(ledger.bulk_assign(&a.user_id, 2).await.unwrap(), 2);
    assert_eq!(ledger.bulk_assign(&b.user_id, 10).await.unwrap(), 3);

    let a_images: Vec<String> = ledger
        .list_for_user(&a.user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|x| x.image_id)
        .collect();
    let b_images: Vec<String> = ledger
        .list_for_user(&b.user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|x| x.image_id)
        .collect();

    assert_eq!(a_images, vec!["000000", "000001"]);
    assert_eq!(b_images, vec!["000002", "000003", "000004"]);

    // Nothing left to hand out
    assert_eq!(ledger.bulk_assign(&a.user_id, 3).await.unwrap(), 0);
    assert_eq!(ledger.list_for_user(&a.user_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_bulk_assign_validation() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 2).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;

    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);
    assert!(matches!(
        ledger.bulk_assign("no-such-user", 1).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        ledger.bulk_assign(&a.user_id, -1).await,
        Err(Error::InvalidPayload(_))
    ));
    assert_eq!(ledger.bulk_assign(&a.user_id, 0).await.unwrap(), 0);

    let single = AssignmentLedger::new(pool, Mode::SinglePool);
    assert!(matches!(
        single.bulk_assign(&a.user_id, 1).await,
        Err(Error::InvalidPayload(_))
    ));
}

#[tokio::test]
async fn test_queue_order_and_completion() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 3).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;
    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);
    let store = AnnotationStore::new(pool.clone(), Mode::MultiUser);
    ledger.bulk_assign(&a.user_id, 3).await.unwrap();

    let mut served = Vec::new();
    while let Some(assignment_id) = next_assignment_id(&ledger, &a).await {
        let outcome = store
            .submit(&a, assignment_target(&assignment_id), Payload::Reject)
            .await
            .unwrap();
        served.push(outcome.annotation.image_id);
    }

    assert_eq!(served, vec!["000000", "000001", "000002"]);
    for assignment in ledger.list_for_user(&a.user_id).await.unwrap() {
        assert_eq!(assignment.status, AssignmentStatus::Completed);
        assert!(assignment.completed_at.is_some());
    }
}

#[tokio::test]
async fn test_resubmission_updates_in_place() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 1).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;
    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);
    let store = AnnotationStore::new(pool.clone(), Mode::MultiUser);
    ledger.bulk_assign(&a.user_id, 1).await.unwrap();
    let assignment_id = next_assignment_id(&ledger, &a).await.unwrap();

    let first = store
        .submit(
            &a,
            assignment_target(&assignment_id),
            Payload::approve("q1", "a1").unwrap(),
        )
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.annotation.pass_number, 1);

    let second = store
        .submit(
            &a,
            assignment_target(&assignment_id),
            Payload::approve("q2", "a2").unwrap(),
        )
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.annotation.id, first.annotation.id);
    assert_eq!(second.annotation.pass_number, 1);

    assert_eq!(store.history_for_image("000000").await.unwrap().len(), 1);
    assert_eq!(image_revision(&pool, "000000").await, 1);

    let live = store.live_for_image("000000").await.unwrap().unwrap();
    assert_eq!(live.question.as_deref(), Some("q2"));
    assert_eq!(live.assignment_id.as_deref(), Some(assignment_id.as_str()));
}

#[tokio::test]
async fn test_report_after_approve_preserves_pass_number() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 1).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;
    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);
    let store = AnnotationStore::new(pool.clone(), Mode::MultiUser);
    ledger.bulk_assign(&a.user_id, 1).await.unwrap();
    let assignment_id = next_assignment_id(&ledger, &a).await.unwrap();

    store
        .submit(
            &a,
            assignment_target(&assignment_id),
            Payload::approve("q", "a").unwrap(),
        )
        .await
        .unwrap();
    let reported = store
        .submit(&a, assignment_target(&assignment_id), Payload::Report)
        .await
        .unwrap();

    assert_eq!(reported.annotation.pass_number, 1);
    assert!(reported.annotation.is_reported);
    assert!(reported.annotation.question.is_none());

    let aggregator = Aggregator::new(pool);
    let rejected = aggregator
        .export_filtered(Some(StatusFilter::Rejected), None)
        .await
        .unwrap();
    assert!(rejected.is_empty(), "reported rows are not rejected rows");
    let progress = aggregator.user_progress(&a.user_id).await.unwrap();
    assert_eq!(progress.reported, 1);
    assert_eq!(progress.approved, 0);
}

#[tokio::test]
async fn test_foreign_and_unknown_assignments() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 2).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;
    let b = create_user(&pool, "ben", Role::Annotator).await;
    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);
    let store = AnnotationStore::new(pool.clone(), Mode::MultiUser);
    ledger.bulk_assign(&a.user_id, 1).await.unwrap();
    let assignment_id = next_assignment_id(&ledger, &a).await.unwrap();

    let stolen = store
        .submit(&b, assignment_target(&assignment_id), Payload::Reject)
        .await;
    assert!(matches!(stolen, Err(Error::Forbidden(_))));

    let unknown = store
        .submit(&a, assignment_target("missing"), Payload::Reject)
        .await;
    assert!(matches!(unknown, Err(Error::NotFound(_))));

    let mismatched = store
        .submit(
            &a,
            Target::Assignment {
                assignment_id: assignment_id.clone(),
                image_id: Some("000001".to_string()),
            },
            Payload::Reject,
        )
        .await;
    assert!(matches!(mismatched, Err(Error::InvalidPayload(_))));

    let bare_image = store
        .submit(
            &a,
            Target::Image {
                image_id: "000000".into(),
                expected_revision: None,
            },
            Payload::Reject,
        )
        .await;
    assert!(matches!(bare_image, Err(Error::InvalidPayload(_))));

    // Failed attempts leave no trace
    assert!(store.live_for_image("000000").await.unwrap().is_none());
    assert_eq!(
        ledger.get(&assignment_id).await.unwrap().status,
        AssignmentStatus::Pending
    );
}

#[tokio::test]
async fn test_complete_checks_owner_and_is_idempotent() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 1).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;
    let b = create_user(&pool, "ben", Role::Annotator).await;
    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);
    ledger.bulk_assign(&a.user_id, 1).await.unwrap();
    let assignment_id = next_assignment_id(&ledger, &a).await.unwrap();

    assert!(matches!(
        ledger.complete(&assignment_id, &b.user_id).await,
        Err(Error::Forbidden(_))
    ));
    assert!(matches!(
        ledger.complete("missing", &a.user_id).await,
        Err(Error::NotFound(_))
    ));

    let first = ledger.complete(&assignment_id, &a.user_id).await.unwrap();
    let second = ledger.complete(&assignment_id, &a.user_id).await.unwrap();
    assert_eq!(first.status, AssignmentStatus::Completed);
    assert_eq!(second.status, AssignmentStatus::Completed);
    assert!(second.completed_at >= first.completed_at);

    assert!(next_assignment_id(&ledger, &a).await.is_none());
}

#[tokio::test]
async fn test_user_progress_and_breakdown() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 6).await;
    let _admin = create_user(&pool, "root", Role::Admin).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;
    let b = create_user(&pool, "ben", Role::Annotator).await;
    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);
    let store = AnnotationStore::new(pool.clone(), Mode::MultiUser);

    ledger.bulk_assign(&a.user_id, 3).await.unwrap();
    ledger.bulk_assign(&b.user_id, 3).await.unwrap();

    let approve = || Payload::approve("q", "a").unwrap();
    let a_first = next_assignment_id(&ledger, &a).await.unwrap();
    store.submit(&a, assignment_target(&a_first), approve()).await.unwrap();

    let progress = Aggregator::new(pool.clone()).user_progress(&a.user_id).await.unwrap();
    assert_eq!(progress.assigned, 3);
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.pending, 2);
    assert_eq!(progress.approved, 1);
    assert_eq!(progress.progress_percentage, 33.3);

    for _ in 0..2 {
        let id = next_assignment_id(&ledger, &b).await.unwrap();
        store.submit(&b, assignment_target(&id), approve()).await.unwrap();
    }

    let aggregator = Aggregator::new(pool);
    let breakdown = aggregator.per_user_breakdown().await.unwrap();
    let names: Vec<_> = breakdown.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["anna", "ben"], "admins excluded, creation order kept");
    assert_eq!(breakdown[1].submitted, 2);
    assert_eq!(breakdown[1].pending, 1);

    let board = aggregator.leaderboard().await.unwrap();
    assert_eq!(board[0].username, "ben");
    assert_eq!(board[0].rank, 1);
    assert_eq!(board[1].username, "anna");
    assert_eq!(board[1].rank, 2);

    let global = aggregator.global_progress().await.unwrap();
    assert_eq!(global.approved, 3);
    assert_eq!(global.progress_percentage, 50.0);
}

#[tokio::test]
async fn test_leaderboard_ties_keep_creation_order() {
    let (_dir, pool) = create_test_db().await;
    for name in ["zed", "amy", "kim"] {
        create_user(&pool, name, Role::Annotator).await;
    }

    let board = Aggregator::new(pool).leaderboard().await.unwrap();
    let names: Vec<_> = board.iter().map(|e| e.username.as_str()).collect();
    assert_eq!(names, vec!["zed", "amy", "kim"]);
    let ranks: Vec<_> = board.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_feed_and_export_scoped_to_user() {
    let (_dir, pool) = create_test_db().await;
    seed_images(&pool, 4).await;
    let a = create_user(&pool, "anna", Role::Annotator).await;
    let b = create_user(&pool, "ben", Role::Annotator).await;
    let ledger = AssignmentLedger::new(pool.clone(), Mode::MultiUser);
    let store = AnnotationStore::new(pool.clone(), Mode::MultiUser);
    ledger.bulk_assign(&a.user_id, 2).await.unwrap();
    ledger.bulk_assign(&b.user_id, 2).await.unwrap();

    for user in [&a, &b] {
        let id = next_assignment_id(&ledger, user).await.unwrap();
        store.submit(user, assignment_target(&id), Payload::Reject).await.unwrap();
    }

    let aggregator = Aggregator::new(pool);
    let feed = aggregator.recent_feed(Some(&a.user_id), 50).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].user_id, a.user_id);
    assert_eq!(aggregator.recent_feed(None, 50).await.unwrap().len(), 2);

    let exported = aggregator
        .export_filtered(Some(StatusFilter::Rejected), Some(&b.user_id))
        .await
        .unwrap();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].username, "ben");
    assert!(exported[0].assignment_id.is_some());
}
