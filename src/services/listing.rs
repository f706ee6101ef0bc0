use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::classroom::ClassroomClient;
use crate::db::{repository, snapshot};
use crate::error::AppError;
use crate::models::{Assignment, User};
use crate::services::reconciler::{self, StudentRepository};
use crate::services::sync_service::SyncService;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    External(String),
    Internal(String),
    Name(String),
}

impl DedupKey {
    pub fn for_assignment(assignment: &Assignment) -> Self {
        if let Some(ext) = assignment
            .classroom_assignment_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            return DedupKey::External(ext.to_string());
        }
        if !assignment.id.is_empty() {
            return DedupKey::Internal(assignment.id.clone());
        }
        DedupKey::Name(assignment.name.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EntryStatus {
    Past,
    Active { days: i64, hours: i64 },
    Unknown,
}

impl EntryStatus {
    /// Status of `deadline` as seen at `now`.
    pub fn at(deadline: Option<NaiveDateTime>, now: NaiveDateTime) -> Self {
        match deadline {
            None => EntryStatus::Unknown,
            Some(deadline) if deadline <= now => EntryStatus::Past,
            Some(deadline) => {
                let remaining = (deadline - now).num_seconds();
                EntryStatus::Active {
                    days: remaining / 86_400,
                    hours: (remaining % 86_400) / 3_600,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingEntry {
    pub assignment: Assignment,
    pub status: EntryStatus,
    /// Display name of the teacher running the assignment, when it is not the requester.
    pub teacher: Option<String>,
    pub repository: String,
    pub submitted: Option<bool>,
    pub owned: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct Listing {
    pub entries: Vec<ListingEntry>,
    pub warnings: Vec<String>,
}

pub struct ListingService {
    db: SqlitePool,
    classroom: Arc<dyn ClassroomClient>,
}

impl ListingService {
    pub fn new(db: SqlitePool, classroom: Arc<dyn ClassroomClient>) -> Self {
        Self { db, classroom }
    }

    /// Refreshes remote state for `user` when possible, then lists what is stored.
    pub async fn build_listing(&self, user: &User, now: NaiveDateTime) -> Result<Listing, AppError> {
        let mut listing = Listing::default();

        if user.token().is_some() {
            let refreshed = if user.is_teacher() {
                self.refresh_teacher(user, now).await
            } else {
                self.refresh_student(user, now).await
            };
            match refreshed {
                Ok(warnings) => listing.warnings.extend(warnings),
                Err(e) => {
                    warn!("Refreshing assignments for {} failed: {}", user.id, e);
                    listing.warnings.push(format!("Could not refresh from GitHub: {}", e));
                }
            }
        }

        let mut candidates = repository::fetch_owned_assignments(&self.db, &user.id).await?;
        let owned_count = candidates.len();
        candidates.extend(repository::fetch_linked_assignments(&self.db, &user.id).await?);

        let submissions: HashMap<String, _> = repository::fetch_user_submissions(&self.db, &user.id)
            .await?
            .into_iter()
            .map(|s| (s.assignment_id.clone(), s))
            .collect();

        let mut seen = HashSet::new();
        let mut teachers = TeacherNames::default();
        for (index, assignment) in candidates.into_iter().enumerate() {
            if !seen.insert(DedupKey::for_assignment(&assignment)) {
                continue;
            }
            let submission = submissions.get(&assignment.id);
            let repository = submission
                .and_then(|s| s.repo_url.as_deref())
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| assignment.repository_label())
                .to_string();
            let teacher = self.attribute_teacher(&assignment, user, &mut teachers).await?;

            listing.entries.push(ListingEntry {
                status: EntryStatus::at(assignment.deadline, now),
                teacher,
                repository,
                submitted: submission.map(|s| s.is_submitted),
                owned: index < owned_count,
                assignment,
            });
        }

        sort_entries(&mut listing.entries);
        Ok(listing)
    }

    async fn refresh_teacher(&self, user: &User, now: NaiveDateTime) -> Result<Vec<String>, AppError> {
        let report = SyncService::new(self.db.clone(), self.classroom.clone())
            .sync_teacher(user, false, now)
            .await?;
        Ok(report.warnings)
    }

    async fn refresh_student(&self, user: &User, now: NaiveDateTime) -> Result<Vec<String>, AppError> {
        let Some(token) = user.token() else {
            return Ok(Vec::new());
        };
        let mut warnings = Vec::new();

        let repos = match self.classroom.list_user_repositories(token).await {
            Ok(repos) => repos,
            Err(e) => {
                warnings.push(format!("Could not list your repositories: {}", e));
                return Ok(warnings);
            }
        };

        let assignments: Vec<Assignment> = repository::fetch_all_assignments(&self.db)
            .await?
            .into_iter()
            .filter(|a| a.user_id != user.id)
            .collect();

        let mut matched = Vec::new();
        for repo in repos {
            let Some(full_name) = repo.full_name.as_deref().filter(|s| !s.trim().is_empty()) else {
                continue;
            };
            if reconciler::match_assignment(full_name, &assignments).is_none() {
                continue;
            }
            let latest_commit = match self.classroom.latest_commit(Some(token), full_name).await {
                Ok(commit) => commit,
                Err(e) => {
                    warnings.push(format!("{}: could not read latest commit: {}", full_name, e));
                    None
                }
            };
            matched.push(StudentRepository {
                full_name: full_name.to_string(),
                html_url: repo.html_url.clone(),
                latest_commit,
            });
        }

        reconciler::link_student_repositories(&self.db, user, &matched, now).await?;
        Ok(warnings)
    }

    async fn attribute_teacher(
        &self,
        assignment: &Assignment,
        requester: &User,
        names: &mut TeacherNames,
    ) -> Result<Option<String>, AppError> {
        if let Some(ext) = assignment.classroom_assignment_id.as_deref() {
            let other_owner = repository::fetch_assignments_by_external_id(&self.db, ext)
                .await?
                .into_iter()
                .map(|a| a.user_id)
                .find(|owner| *owner != requester.id);
            if let Some(owner) = other_owner {
                return names.lookup(&self.db, &owner).await;
            }
            if let Some(teacher_id) = snapshot::find_snapshot_teacher(&self.db, ext).await? {
                if teacher_id != requester.id {
                    return names.lookup(&self.db, &teacher_id).await;
                }
            }
        }
        if assignment.user_id != requester.id {
            return names.lookup(&self.db, &assignment.user_id).await;
        }
        Ok(None)
    }
}

/// Per-listing cache of user id to display name.
#[derive(Default)]
struct TeacherNames(HashMap<String, Option<String>>);

impl TeacherNames {
    async fn lookup(&mut self, db: &SqlitePool, user_id: &str) -> Result<Option<String>, AppError> {
        if let Some(name) = self.0.get(user_id) {
            return Ok(name.clone());
        }
        let name = repository::find_user_by_id(db, user_id)
            .await?
            .map(|u| u.display_name());
        self.0.insert(user_id.to_string(), name.clone());
        Ok(name)
    }
}

/// Deadline ascending with undated entries last, then name.
pub fn sort_entries(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| {
        let a_deadline = a.assignment.deadline.unwrap_or(NaiveDateTime::MAX);
        let b_deadline = b.assignment.deadline.unwrap_or(NaiveDateTime::MAX);
        a_deadline
            .cmp(&b_deadline)
            .then_with(|| a.assignment.name.cmp(&b.assignment.name))
    });
}
