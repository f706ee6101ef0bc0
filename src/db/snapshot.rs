use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ClassroomRecord, NewClassroomRecord};

const RECORD_COLUMNS: &str = "id, teacher_user_id, classroom_id, classroom_name, assignment_id, \
    assignment_title, assignment_url, deadline, student_login, student_display_login, \
    student_repo_url, submitted, passed, grade, commit_count, raw_json, fetched_at";

/// Replaces every snapshot row owned by `teacher_id` with `records`.
///
/// Delete and inserts share one transaction. A record that cannot be serialized
/// or written is logged and skipped; the rest of the batch still lands.
/// Returns the number of rows written.
pub async fn replace_snapshot(
    db: &SqlitePool,
    teacher_id: &str,
    records: &[NewClassroomRecord],
    fetched_at: NaiveDateTime,
) -> Result<usize, sqlx::Error> {
    let mut tx = db.begin().await?;

    let removed = sqlx::query("DELETE FROM classroom_assignment_records WHERE teacher_user_id = ?")
        .bind(teacher_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let mut written = 0;
    for record in records {
        let raw_json = match serde_json::to_string(&record.raw) {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    "Skipping snapshot record {:?}/{:?}: payload not serializable: {}",
                    record.assignment_id, record.student_login, e
                );
                continue;
            }
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO classroom_assignment_records
                (id, teacher_user_id, classroom_id, classroom_name, assignment_id,
                assignment_title, assignment_url, deadline, student_login,
                student_display_login, student_repo_url, submitted, passed, grade,
                commit_count, raw_json, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(teacher_id)
        .bind(&record.classroom_id)
        .bind(&record.classroom_name)
        .bind(&record.assignment_id)
        .bind(&record.assignment_title)
        .bind(&record.assignment_url)
        .bind(record.deadline)
        .bind(&record.student_login)
        .bind(&record.student_display_login)
        .bind(&record.student_repo_url)
        .bind(record.submitted)
        .bind(record.passed)
        .bind(&record.grade)
        .bind(record.commit_count)
        .bind(raw_json)
        .bind(fetched_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => written += 1,
            Err(e) => warn!(
                "Skipping snapshot record {:?}/{:?}: {}",
                record.assignment_id, record.student_login, e
            ),
        }
    }

    tx.commit().await?;
    debug!(
        "Snapshot for teacher {} replaced: removed {}, wrote {}",
        teacher_id, removed, written
    );
    Ok(written)
}

pub async fn fetch_snapshot(
    db: &SqlitePool,
    teacher_id: &str,
) -> Result<Vec<ClassroomRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM classroom_assignment_records \
         WHERE teacher_user_id = ? \
         ORDER BY classroom_name, assignment_title, student_display_login"
    );
    sqlx::query_as::<_, ClassroomRecord>(&sql)
        .bind(teacher_id)
        .fetch_all(db)
        .await
}

/// Teacher whose latest snapshot mentions the remote assignment, if any.
pub async fn find_snapshot_teacher(
    db: &SqlitePool,
    classroom_assignment_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT teacher_user_id FROM classroom_assignment_records \
         WHERE assignment_id = ? ORDER BY fetched_at DESC LIMIT 1",
    )
    .bind(classroom_assignment_id)
    .fetch_optional(db)
    .await
}
