use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::classroom::{Acceptance, AssignmentDescriptor, Classroom, ClassroomClient, first_present};
use crate::db::snapshot;
use crate::error::AppError;
use crate::models::{NewClassroomRecord, User};
use crate::services::reconciler::{self, ReconcileOutcome};

/// Pulls every classroom a teacher can see and reconciles it into local state.
pub struct SyncService {
    db: SqlitePool,
    classroom: Arc<dyn ClassroomClient>,
}

#[derive(Debug, Default, Serialize)]
pub struct SyncStats {
    pub classrooms: usize,
    pub assignments_created: usize,
    pub assignments_updated: usize,
    pub submissions_created: usize,
    pub submissions_updated: usize,
    pub unmatched: usize,
    /// Rows written to the snapshot, when the pass replaced it.
    pub snapshot_rows: Option<usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub stats: SyncStats,
    pub records: Vec<NewClassroomRecord>,
    /// One line per remote call that failed; the pass continued without it.
    pub warnings: Vec<String>,
}

impl SyncService {
    pub fn new(db: SqlitePool, classroom: Arc<dyn ClassroomClient>) -> Self {
        Self { db, classroom }
    }

    /// Runs a full pass for `teacher`.
    ///
    /// Remote failures become warnings. The snapshot is only replaced when
    /// `replace_snapshot` is set and the classroom listing itself succeeded.
    pub async fn sync_teacher(
        &self,
        teacher: &User,
        replace_snapshot: bool,
        now: NaiveDateTime,
    ) -> Result<SyncReport, AppError> {
        let Some(token) = teacher.token() else {
            return Err(AppError::BadRequest(
                "Register a GitHub token with /register_token first".to_string(),
            ));
        };

        info!("Starting classroom sync for {}", teacher.display_name());
        let mut report = SyncReport::default();

        let classrooms = match self.classroom.list_classrooms(token).await {
            Ok(classrooms) => classrooms,
            Err(e) => {
                warn!("Listing classrooms failed for {}: {}", teacher.id, e);
                report.warnings.push(format!("Could not list classrooms: {}", e));
                return Ok(report);
            }
        };
        report.stats.classrooms = classrooms.len();

        for classroom in &classrooms {
            self.sync_classroom(teacher, token, classroom, now, &mut report)
                .await?;
        }

        if replace_snapshot {
            let written =
                snapshot::replace_snapshot(&self.db, &teacher.id, &report.records, now).await?;
            report.stats.snapshot_rows = Some(written);
        }

        info!("Classroom sync completed: {:?}", report.stats);
        Ok(report)
    }

    async fn sync_classroom(
        &self,
        teacher: &User,
        token: &str,
        classroom: &Classroom,
        now: NaiveDateTime,
        report: &mut SyncReport,
    ) -> Result<(), AppError> {
        let Some(classroom_id) = first_present([classroom.id.as_deref()]) else {
            report
                .warnings
                .push("Skipped a classroom without an id".to_string());
            return Ok(());
        };
        let classroom_name = first_present([classroom.name.as_deref()]).unwrap_or(classroom_id);

        let assignments = match self.classroom.list_assignments(token, classroom_id).await {
            Ok(assignments) => assignments,
            Err(e) => {
                warn!("Listing assignments of {} failed: {}", classroom_name, e);
                report
                    .warnings
                    .push(format!("{}: could not list assignments: {}", classroom_name, e));
                return Ok(());
            }
        };

        for descriptor in &assignments {
            let acceptances = match descriptor.external_id() {
                Some(assignment_id) => {
                    match self.classroom.list_acceptances(token, assignment_id).await {
                        Ok(acceptances) => acceptances,
                        Err(e) => {
                            let title = descriptor.title().unwrap_or(assignment_id);
                            warn!("Listing acceptances of {} failed: {}", title, e);
                            report.warnings.push(format!(
                                "{} / {}: could not list accepted students: {}",
                                classroom_name, title, e
                            ));
                            Vec::new()
                        }
                    }
                }
                None => Vec::new(),
            };

            let outcome = match reconciler::reconcile(
                &self.db,
                teacher,
                Some(classroom_id),
                Some(classroom_name),
                descriptor,
                &acceptances,
                now,
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Reconciling {:?} failed: {}", descriptor.title(), e);
                    report.warnings.push(format!(
                        "{} / {}: not saved: {}",
                        classroom_name,
                        descriptor.title().unwrap_or("untitled"),
                        e
                    ));
                    continue;
                }
            };

            add_stats(&mut report.stats, &outcome);
            report.records.extend(flatten(
                classroom_id,
                classroom_name,
                descriptor,
                &acceptances,
                &outcome,
            ));
        }
        Ok(())
    }
}

fn add_stats(stats: &mut SyncStats, outcome: &ReconcileOutcome) {
    stats.assignments_created += usize::from(outcome.assignment_created);
    stats.assignments_updated += usize::from(outcome.assignment_updated);
    stats.submissions_created += outcome.submissions_created;
    stats.submissions_updated += outcome.submissions_updated;
    stats.unmatched += outcome.unmatched;
}

/// One snapshot record per acceptance; an assignment nobody accepted yet still gets one row.
fn flatten(
    classroom_id: &str,
    classroom_name: &str,
    descriptor: &AssignmentDescriptor,
    acceptances: &[Acceptance],
    outcome: &ReconcileOutcome,
) -> Vec<NewClassroomRecord> {
    let base = NewClassroomRecord {
        classroom_id: Some(classroom_id.to_string()),
        classroom_name: Some(classroom_name.to_string()),
        assignment_id: descriptor.external_id().map(str::to_string),
        assignment_title: Some(outcome.assignment.name.clone()),
        assignment_url: outcome.assignment.repo_url.clone(),
        deadline: outcome.assignment.deadline,
        ..Default::default()
    };

    if acceptances.is_empty() {
        return vec![NewClassroomRecord {
            raw: serde_json::json!({}),
            ..base
        }];
    }

    acceptances
        .iter()
        .zip(&outcome.identities)
        .map(|(acceptance, identity)| NewClassroomRecord {
            student_login: first_present([Some(identity.canonical_login.as_str())])
                .map(str::to_string),
            student_display_login: Some(identity.display_login.clone()),
            student_repo_url: first_present([Some(identity.repository_url.as_str())])
                .map(str::to_string),
            submitted: acceptance.submitted,
            passed: acceptance.passing,
            grade: acceptance.grade.clone(),
            commit_count: acceptance.commit_count,
            raw: acceptance.raw.clone(),
            ..base.clone()
        })
        .collect()
}
