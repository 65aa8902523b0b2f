use chrono::Duration;
use exam_core::model::{
    AnswerValue, ContestDefinition, ContestId, ContestParticipation, ContestSubject,
    ExamBlueprint, ExamId, ExamSession, ParticipationStatus, QuestionId, UserId,
};
use exam_core::stats::{HistoryEntry, SubmissionKind};
use exam_core::time::fixed_now;
use storage::repository::{ParticipationRepository, SnapshotStore, SubmissionHistoryRepository};
use storage::sqlite::SqliteRepository;

fn in_progress_session(exam: u64) -> ExamSession {
    let blueprint = ExamBlueprint::new(
        ExamId::new(exam),
        "Math",
        1800,
        (1..=3).map(QuestionId::new).collect(),
    )
    .unwrap();
    let mut session = ExamSession::new(blueprint);
    session.start(fixed_now()).unwrap();
    session
}

#[tokio::test]
async fn sqlite_snapshot_roundtrip_and_clear() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_snapshots?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let mut session = in_progress_session(1);
    session
        .set_answer(QuestionId::new(2), AnswerValue::Text("42".into()), fixed_now())
        .unwrap();
    session.toggle_flag(QuestionId::new(3)).unwrap();
    let snapshot = session.snapshot(fixed_now());

    let exam_id = ExamId::new(1);
    repo.save(exam_id, &snapshot).await.unwrap();
    assert!(repo.has(exam_id).await.unwrap());

    let loaded = repo.load(exam_id).await.unwrap().expect("snapshot");
    assert_eq!(loaded, snapshot);

    repo.clear(exam_id).await.unwrap();
    assert!(!repo.has(exam_id).await.unwrap());
    assert!(repo.load(exam_id).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_corrupt_snapshot_reads_as_absent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_corrupt?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    sqlx::query(
        "INSERT INTO session_snapshots (exam_id, payload, saved_at) VALUES (1, 'not json', ?1)",
    )
    .bind(fixed_now())
    .execute(repo.pool())
    .await
    .unwrap();

    assert!(repo.load(ExamId::new(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_participation_upsert_preserves_progress() {
    let repo =
        SqliteRepository::connect("sqlite:file:memdb_participations?mode=memory&cache=shared")
            .await
            .expect("connect");
    repo.migrate().await.expect("migrate");

    let definition = ContestDefinition::new(
        ContestId::new(5),
        vec![
            ContestSubject {
                exam_id: ExamId::new(1),
                weight: 1.0,
            },
            ContestSubject {
                exam_id: ExamId::new(2),
                weight: 2.0,
            },
        ],
    )
    .unwrap();

    let mut participation =
        ContestParticipation::enroll(&definition, UserId::new(9), fixed_now());
    participation.begin_subject(0).unwrap();
    participation.record_submitted(0, 8.5).unwrap();
    repo.upsert_participation(&participation).await.unwrap();

    let fetched = repo
        .get_participation(ContestId::new(5), UserId::new(9))
        .await
        .unwrap()
        .expect("participation");
    assert_eq!(fetched, participation);
    assert_eq!(fetched.completed_count(), 1);
    assert!((fetched.total_score() - 8.5).abs() < f64::EPSILON);

    // Upsert after invalidation overwrites the stored row.
    participation.invalidate();
    repo.upsert_participation(&participation).await.unwrap();
    let fetched = repo
        .get_participation(ContestId::new(5), UserId::new(9))
        .await
        .unwrap()
        .expect("participation");
    assert_eq!(fetched.status(), ParticipationStatus::Invalidated);

    let listed = repo.list_for_contest(ContestId::new(5)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(
        repo.list_for_contest(ContestId::new(6))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sqlite_history_lists_most_recent_first() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_history?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let user = UserId::new(3);
    for (offset, subject, kind) in [
        (0, "Math", SubmissionKind::Contest),
        (300, "Physics", SubmissionKind::GlobalPractice),
    ] {
        repo.append_submission(
            user,
            &HistoryEntry {
                subject: subject.into(),
                score: 7.5,
                max_score: 10.0,
                duration_minutes: 45,
                kind,
                submitted_at: fixed_now() + Duration::seconds(offset),
            },
        )
        .await
        .unwrap();
    }

    let history = repo.list_submissions(user).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].subject, "Physics");
    assert_eq!(history[0].kind, SubmissionKind::GlobalPractice);
    assert_eq!(history[1].subject, "Math");

    assert!(
        repo.list_submissions(UserId::new(99))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sqlite_simultaneous_submissions_list_the_later_insert_first() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_history_ties?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let user = UserId::new(4);
    for subject in ["Math", "Physics", "Chemistry"] {
        repo.append_submission(
            user,
            &HistoryEntry {
                subject: subject.into(),
                score: 7.0,
                max_score: 10.0,
                duration_minutes: 30,
                kind: SubmissionKind::GlobalPractice,
                submitted_at: fixed_now(),
            },
        )
        .await
        .unwrap();
    }

    let history = repo.list_submissions(user).await.unwrap();
    let subjects: Vec<&str> = history.iter().map(|e| e.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Chemistry", "Physics", "Math"]);
}
