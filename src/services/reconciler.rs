//! Merges remote classroom state into the local assignment and submission tables.
//!
//! Every write is an upsert that only moves a field to a present, different
//! value, so a repeated pass over unchanged input writes nothing.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::classroom::{Acceptance, AssignmentDescriptor, CommitInfo, first_present};
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Assignment, NewAssignment, Submission, User};
use crate::services::identity::{ResolvedIdentity, resolve_identity, slugify};

const UNTITLED: &str = "Untitled assignment";

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub assignment: Assignment,
    pub assignment_created: bool,
    pub assignment_updated: bool,
    pub submissions_created: usize,
    pub submissions_updated: usize,
    /// Acceptances whose login matched no registered user.
    pub unmatched: usize,
    /// Resolved identity per acceptance, in input order.
    pub identities: Vec<ResolvedIdentity>,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        self.assignment_created
            || self.assignment_updated
            || self.submissions_created > 0
            || self.submissions_updated > 0
    }
}

/// Assignment fields as read from a remote descriptor.
struct IncomingAssignment {
    name: String,
    description: Option<String>,
    repo_name: String,
    repo_url: Option<String>,
    deadline: Option<NaiveDateTime>,
}

impl IncomingAssignment {
    fn from_descriptor(descriptor: &AssignmentDescriptor) -> Self {
        let name = match descriptor.title() {
            Some(title) => title.to_string(),
            None => descriptor
                .external_id()
                .map(|id| format!("Assignment {}", id))
                .unwrap_or_else(|| UNTITLED.to_string()),
        };
        let starter = descriptor.starter_code_repository.as_ref();

        let repo_name = first_present([
            descriptor.slug.as_deref(),
            starter.and_then(|r| r.full_name.as_deref()),
        ])
        .map(str::to_string)
        .unwrap_or_else(|| slugify(descriptor.title.as_deref().unwrap_or(&name)));
        let repo_name = if repo_name.is_empty() { name.clone() } else { repo_name };

        let repo_url = first_present([
            starter.and_then(|r| r.html_url.as_deref()),
            descriptor.invite_link.as_deref(),
        ])
        .map(str::to_string);

        Self {
            name,
            description: first_present([descriptor.description.as_deref()]).map(str::to_string),
            repo_name,
            repo_url,
            deadline: descriptor.deadline(),
        }
    }
}

/// Moves `stored` to `incoming` when it is present and different.
fn refresh<T: PartialEq>(stored: &mut T, incoming: Option<T>) -> bool {
    match incoming {
        Some(value) if *stored != value => {
            *stored = value;
            true
        }
        _ => false,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Upserts one remote assignment and links its acceptances to registered users.
///
/// Runs in a single transaction that is committed only when something changed.
pub async fn reconcile(
    db: &SqlitePool,
    teacher: &User,
    classroom_id: Option<&str>,
    classroom_name: Option<&str>,
    descriptor: &AssignmentDescriptor,
    acceptances: &[Acceptance],
    now: NaiveDateTime,
) -> Result<ReconcileOutcome, AppError> {
    let incoming = IncomingAssignment::from_descriptor(descriptor);
    let mut tx = db.begin().await?;

    let (assignment, assignment_created, assignment_updated) =
        upsert_assignment(&mut tx, teacher, classroom_id, descriptor, incoming, now).await?;

    let mut outcome = ReconcileOutcome {
        assignment,
        assignment_created,
        assignment_updated,
        submissions_created: 0,
        submissions_updated: 0,
        unmatched: 0,
        identities: Vec::with_capacity(acceptances.len()),
    };

    for acceptance in acceptances {
        let identity = resolve_identity(descriptor, acceptance);
        if identity.canonical_login.is_empty() {
            outcome.identities.push(identity);
            continue;
        }

        let Some(student) =
            repository::find_user_by_github_login(&mut *tx, &identity.canonical_login).await?
        else {
            debug!(
                "No registered user for login {} on {}",
                identity.canonical_login, outcome.assignment.name
            );
            outcome.unmatched += 1;
            outcome.identities.push(identity);
            continue;
        };

        match upsert_submission(&mut tx, &outcome.assignment, &student, acceptance, &identity, now)
            .await?
        {
            SubmissionChange::Created => outcome.submissions_created += 1,
            SubmissionChange::Updated => outcome.submissions_updated += 1,
            SubmissionChange::Unchanged => {}
        }
        outcome.identities.push(identity);
    }

    if outcome.changed() {
        tx.commit().await?;
        info!(
            "Reconciled {} ({}): created={} updated={} submissions +{} ~{} unmatched={}",
            outcome.assignment.name,
            classroom_name.unwrap_or("no classroom"),
            outcome.assignment_created,
            outcome.assignment_updated,
            outcome.submissions_created,
            outcome.submissions_updated,
            outcome.unmatched
        );
    } else {
        tx.rollback().await?;
        debug!("{} already up to date", outcome.assignment.name);
    }

    Ok(outcome)
}

async fn upsert_assignment(
    tx: &mut Transaction<'_, Sqlite>,
    teacher: &User,
    classroom_id: Option<&str>,
    descriptor: &AssignmentDescriptor,
    incoming: IncomingAssignment,
    now: NaiveDateTime,
) -> Result<(Assignment, bool, bool), AppError> {
    let external_id = descriptor.external_id();
    let existing = match external_id {
        Some(ext) => repository::find_assignment_by_external_id(&mut **tx, &teacher.id, ext).await?,
        None => {
            repository::find_assignment_by_classroom_and_name(
                &mut **tx,
                &teacher.id,
                classroom_id,
                &incoming.name,
            )
            .await?
        }
    };

    let Some(mut assignment) = existing else {
        let created = repository::insert_assignment(
            &mut **tx,
            &NewAssignment {
                user_id: teacher.id.clone(),
                name: incoming.name,
                description: incoming.description,
                repo_name: incoming.repo_name,
                repo_url: incoming.repo_url,
                deadline: incoming.deadline,
                classroom_id: classroom_id.map(str::to_string),
                classroom_assignment_id: external_id.map(str::to_string),
            },
            now,
        )
        .await?;
        return Ok((created, true, false));
    };

    let mut changed = false;
    changed |= refresh(&mut assignment.name, non_empty(&incoming.name));
    changed |= refresh(&mut assignment.description, incoming.description.map(Some));
    changed |= refresh(&mut assignment.repo_name, non_empty(&incoming.repo_name));
    changed |= refresh(&mut assignment.repo_url, incoming.repo_url.map(Some));
    changed |= refresh(&mut assignment.deadline, incoming.deadline.map(Some));
    changed |= refresh(
        &mut assignment.classroom_id,
        classroom_id.and_then(non_empty).map(Some),
    );

    if changed {
        assignment.updated_at = now;
        repository::update_assignment(&mut **tx, &assignment).await?;
    }
    Ok((assignment, false, changed))
}

enum SubmissionChange {
    Created,
    Updated,
    Unchanged,
}

async fn upsert_submission(
    tx: &mut Transaction<'_, Sqlite>,
    assignment: &Assignment,
    student: &User,
    acceptance: &Acceptance,
    identity: &ResolvedIdentity,
    now: NaiveDateTime,
) -> Result<SubmissionChange, AppError> {
    let repo_url = non_empty(&identity.repository_url);
    let remote_submitted_at = acceptance.submitted_at();

    let existing = repository::find_submission(&mut **tx, &assignment.id, &student.id).await?;
    let Some(mut submission) = existing else {
        let is_submitted = acceptance.submitted.unwrap_or(false);
        let submitted_at = remote_submitted_at.or(is_submitted.then_some(now));
        repository::insert_submission(
            &mut **tx,
            &Submission {
                id: Uuid::new_v4().to_string(),
                assignment_id: assignment.id.clone(),
                user_id: student.id.clone(),
                repo_url,
                last_commit_sha: None,
                last_commit_date: None,
                is_submitted,
                submitted_at,
                created_at: now,
                updated_at: now,
            },
        )
        .await?;
        return Ok(SubmissionChange::Created);
    };

    let was_submitted = submission.is_submitted;
    let mut changed = false;
    changed |= refresh(&mut submission.repo_url, repo_url.map(Some));
    changed |= refresh(&mut submission.is_submitted, acceptance.submitted);
    changed |= refresh(&mut submission.submitted_at, remote_submitted_at.map(Some));
    if !was_submitted && submission.is_submitted && submission.submitted_at.is_none() {
        submission.submitted_at = Some(now);
        changed = true;
    }

    if !changed {
        return Ok(SubmissionChange::Unchanged);
    }
    submission.updated_at = now;
    repository::update_submission(&mut **tx, &submission).await?;
    Ok(SubmissionChange::Updated)
}

/// One of a student's own repositories, with its newest commit when known.
#[derive(Debug, Clone)]
pub struct StudentRepository {
    pub full_name: String,
    pub html_url: Option<String>,
    pub latest_commit: Option<CommitInfo>,
}

impl StudentRepository {
    pub fn url(&self) -> String {
        self.html_url
            .as_deref()
            .and_then(non_empty)
            .unwrap_or_else(|| format!("https://github.com/{}", self.full_name))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkOutcome {
    pub created: usize,
    pub updated: usize,
}

fn last_segment(name: &str) -> &str {
    name.trim().trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Assignment whose repository name prefixes `{repo_name}-` the repository; longest prefix wins.
pub fn match_assignment<'a>(
    repo_full_name: &str,
    assignments: &'a [Assignment],
) -> Option<&'a Assignment> {
    let repo = last_segment(repo_full_name).to_lowercase();
    assignments
        .iter()
        .filter_map(|assignment| {
            let key = last_segment(&assignment.repo_name).to_lowercase();
            let matches = !key.is_empty()
                && repo.len() > key.len() + 1
                && repo.starts_with(&key)
                && repo[key.len()..].starts_with('-');
            matches.then_some((key.len(), assignment))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, assignment)| assignment)
}

/// Links a student's own repositories to the assignments they were created from.
///
/// Assignments owned by the student are ignored. The first repository seen for
/// an assignment wins within one call.
pub async fn link_student_repositories(
    db: &SqlitePool,
    student: &User,
    repositories: &[StudentRepository],
    now: NaiveDateTime,
) -> Result<LinkOutcome, AppError> {
    let mut tx = db.begin().await?;
    let assignments: Vec<Assignment> = repository::fetch_all_assignments(&mut *tx)
        .await?
        .into_iter()
        .filter(|a| a.user_id != student.id)
        .collect();

    let mut outcome = LinkOutcome::default();
    let mut seen = HashSet::new();

    for repo in repositories {
        let Some(assignment) = match_assignment(&repo.full_name, &assignments) else {
            continue;
        };
        if !seen.insert(assignment.id.clone()) {
            continue;
        }

        let repo_url = repo.url();
        let commit_sha = repo
            .latest_commit
            .as_ref()
            .and_then(|c| non_empty(&c.sha));
        let commit_date = repo.latest_commit.as_ref().and_then(|c| c.date);

        match repository::find_submission(&mut *tx, &assignment.id, &student.id).await? {
            None => {
                repository::insert_submission(
                    &mut *tx,
                    &Submission {
                        id: Uuid::new_v4().to_string(),
                        assignment_id: assignment.id.clone(),
                        user_id: student.id.clone(),
                        repo_url: Some(repo_url),
                        last_commit_sha: commit_sha,
                        last_commit_date: commit_date,
                        is_submitted: false,
                        submitted_at: None,
                        created_at: now,
                        updated_at: now,
                    },
                )
                .await?;
                outcome.created += 1;
            }
            Some(mut submission) => {
                let mut changed = false;
                changed |= refresh(&mut submission.repo_url, Some(Some(repo_url)));
                changed |= refresh(&mut submission.last_commit_sha, commit_sha.map(Some));
                changed |= refresh(&mut submission.last_commit_date, commit_date.map(Some));
                if changed {
                    submission.updated_at = now;
                    repository::update_submission(&mut *tx, &submission).await?;
                    outcome.updated += 1;
                }
            }
        }
    }

    if outcome.created + outcome.updated > 0 {
        tx.commit().await?;
        info!(
            "Linked repositories for {}: created={} updated={}",
            student.display_name(),
            outcome.created,
            outcome.updated
        );
    } else {
        tx.rollback().await?;
    }
    Ok(outcome)
}
