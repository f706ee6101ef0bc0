use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::classroom::{ClassroomError, parse_repo_reference};
use crate::datetime::parse_datetime;
use crate::db::{repository, snapshot};
use crate::error::AppError;
use crate::models::{ChatIdentity, ClassroomRecord, NewAssignment, NotifySettings, Role, User};
use crate::services::export;
use crate::services::listing::{EntryStatus, Listing, ListingService};
use crate::services::notifier::format_remaining;
use crate::services::sync_service::{SyncReport, SyncService};
use crate::state::AppState;

use super::{Command, NotifyArgs};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

const HELP: &str = "📖 Available commands:

/start - register with the bot
/help - show this message
/register_token <token> - save your GitHub token
/set_github <username> - set your GitHub username
/role <student|teacher> [password] - switch role
/assignments - list your assignments
/track <owner/repo> - follow CI for a repository
/untrack <owner/repo> - stop following a repository
/ci_status - latest CI run of tracked repositories
/submissions - show recorded submissions
/notify <hours> [seconds] - reminder window and repeat period
/notify reset - go back to the defaults

Teacher commands:
/add_assignment \"<name>\" <owner/repo> <deadline>
/delete_assignment <name>
/add_note \"<name>\" <text>
/delete_note <name>
/classroom - sync and show GitHub Classroom
/export - classroom data as a spreadsheet bundle
/export_users - registered users as CSV
/notify_defaults <hours> <seconds> - global reminder defaults";

#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    /// Chat-facing rendering of a failed command.
    pub fn from_error(err: &AppError) -> Self {
        match err {
            AppError::BadRequest(msg) => Reply::text(format!("❌ {}", msg)),
            AppError::Forbidden(msg) => Reply::text(format!("🚫 {}", msg)),
            AppError::NotFound(msg) => Reply::text(format!("❓ {}", msg)),
            AppError::Conflict(msg) => Reply::text(format!("⚠️ {}", msg)),
            AppError::Remote(e) => Reply::text(format!("⚠️ GitHub request failed: {}", e)),
            other => {
                error!("command failed: {}", other);
                Reply::text("⚠️ Something went wrong, please try again later.")
            }
        }
    }
}

pub struct CommandHandler {
    state: AppState,
}

impl CommandHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Runs one chat message for `identity`. Failures come back as reply text.
    pub async fn handle(&self, identity: &ChatIdentity, text: &str) -> Reply {
        match self.dispatch(identity, text, Utc::now().naive_utc()).await {
            Ok(reply) => reply,
            Err(e) => Reply::from_error(&e),
        }
    }

    pub async fn dispatch(
        &self,
        identity: &ChatIdentity,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<Reply, AppError> {
        let user = repository::upsert_chat_user(&self.state.db, identity).await?;
        let command = Command::parse(text)?;
        if command.requires_teacher() && !user.is_teacher() {
            return Err(AppError::Forbidden(
                "This command is for teachers. Use /role teacher <password> first.".to_string(),
            ));
        }
        info!("chat {} -> {}", user.chat_id, command_name(&command));

        match command {
            Command::Start => Ok(self.start(&user)),
            Command::Help => Ok(Reply::text(HELP)),
            Command::Unknown(name) => Ok(Reply::text(format!("❓ Unknown command {}\n\n{}", name, HELP))),
            Command::RegisterToken(token) => self.register_token(&user, &token).await,
            Command::SetGithub(login) => self.set_github(&user, &login).await,
            Command::Role { role, password } => self.set_role(&user, role, password.as_deref()).await,
            Command::Assignments => self.assignments(&user, now).await,
            Command::AddAssignment { name, repo, deadline } => {
                self.add_assignment(&user, &name, &repo, &deadline, now).await
            }
            Command::DeleteAssignment(name) => self.delete_assignment(&user, &name).await,
            Command::AddNote { name, text } => self.set_note(&user, &name, Some(&text)).await,
            Command::DeleteNote(name) => self.set_note(&user, &name, None).await,
            Command::Track(repo) => self.track(&user, &repo).await,
            Command::Untrack(repo) => self.untrack(&user, &repo).await,
            Command::CiStatus => self.ci_status(&user).await,
            Command::Classroom => self.classroom(&user, now).await,
            Command::Export => self.export(&user, now).await,
            Command::ExportUsers => self.export_users(now).await,
            Command::Submissions => self.submissions(&user).await,
            Command::Notify(args) => self.notify(&user, args).await,
            Command::NotifyDefaults { hours, seconds } => self.notify_defaults(hours, seconds).await,
        }
    }

    fn start(&self, user: &User) -> Reply {
        Reply::text(format!(
            "👋 Welcome, {}!\n\nYou are registered as a {}. \
             Use /register_token to connect GitHub, or /help to see every command.",
            user.display_name(),
            user.role.as_str()
        ))
    }

    async fn register_token(&self, user: &User, token: &str) -> Result<Reply, AppError> {
        let login = match self.state.classroom.current_login(token).await {
            Ok(login) => login,
            Err(ClassroomError::Unauthorized) => {
                return Err(AppError::BadRequest(
                    "GitHub rejected that token. Check it and try again.".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        repository::set_github_credentials(&self.state.db, &user.id, token, &login).await?;
        Ok(Reply::text(format!("✅ Token saved. GitHub account: {}", login)))
    }

    async fn set_github(&self, user: &User, login: &str) -> Result<Reply, AppError> {
        let valid = !login.is_empty()
            && login.len() <= 39
            && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(AppError::BadRequest(format!("{:?} is not a GitHub username", login)));
        }
        repository::set_github_username(&self.state.db, &user.id, login).await?;
        Ok(Reply::text(format!("✅ GitHub username set to {}", login)))
    }

    async fn set_role(
        &self,
        user: &User,
        role: Role,
        password: Option<&str>,
    ) -> Result<Reply, AppError> {
        if role == Role::Teacher && password != Some(&*self.state.teacher_password) {
            return Err(AppError::Forbidden("Wrong teacher password.".to_string()));
        }
        repository::set_role(&self.state.db, &user.id, role).await?;
        Ok(Reply::text(format!("✅ Role set to {}", role.as_str())))
    }

    async fn assignments(&self, user: &User, now: NaiveDateTime) -> Result<Reply, AppError> {
        let listing = ListingService::new(self.state.db.clone(), self.state.classroom.clone())
            .build_listing(user, now)
            .await?;
        Ok(Reply::text(render_listing(&listing)))
    }

    async fn add_assignment(
        &self,
        user: &User,
        name: &str,
        repo: &str,
        deadline: &str,
        now: NaiveDateTime,
    ) -> Result<Reply, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Assignment name cannot be empty".to_string()));
        }
        let Some(deadline) = parse_datetime(deadline) else {
            return Err(AppError::BadRequest(format!(
                "Could not understand the deadline {:?}. Try 2025-11-11 22:33 UTC",
                deadline
            )));
        };
        let full_name = parse_repo_reference(repo)
            .map_err(|_| AppError::BadRequest(format!("{:?} is not an owner/repo reference", repo)))?;

        let mut repo_url = format!("https://github.com/{}", full_name);
        let mut notice = String::new();
        if let Some(token) = user.token() {
            match self.state.classroom.repository_info(Some(token), &full_name).await {
                Ok(info) => {
                    if let Some(url) = info.html_url.filter(|u| !u.trim().is_empty()) {
                        repo_url = url;
                    }
                }
                Err(ClassroomError::NotFound(_)) => {
                    return Err(AppError::BadRequest(format!(
                        "Repository {} was not found on GitHub",
                        full_name
                    )));
                }
                Err(e) => notice = format!("\n⚠️ Could not verify the repository: {}", e),
            }
        }

        if repository::find_assignment_by_classroom_and_name(&self.state.db, &user.id, None, name)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!("You already have an assignment named {}", name)));
        }

        let assignment = repository::insert_assignment(
            &self.state.db,
            &NewAssignment {
                user_id: user.id.clone(),
                name: name.to_string(),
                description: None,
                repo_name: full_name,
                repo_url: Some(repo_url),
                deadline: Some(deadline),
                classroom_id: None,
                classroom_assignment_id: None,
            },
            now,
        )
        .await?;

        Ok(Reply::text(format!(
            "✅ Assignment added\n\n📚 {}\n📅 {} UTC\n🔗 {}{}",
            assignment.name,
            deadline.format(DATE_FORMAT),
            assignment.repository_label(),
            notice
        )))
    }

    async fn delete_assignment(&self, user: &User, name: &str) -> Result<Reply, AppError> {
        let assignment = repository::find_owned_assignment_by_name(&self.state.db, &user.id, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No assignment matching {:?}", name)))?;
        repository::delete_assignment(&self.state.db, &assignment.id).await?;
        Ok(Reply::text(format!("🗑 Deleted {}", assignment.name)))
    }

    async fn set_note(&self, user: &User, name: &str, note: Option<&str>) -> Result<Reply, AppError> {
        let assignment = repository::find_owned_assignment_by_name(&self.state.db, &user.id, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No assignment matching {:?}", name)))?;
        repository::set_assignment_note(&self.state.db, &assignment.id, note).await?;
        Ok(Reply::text(match note {
            Some(_) => format!("📝 Note saved for {}", assignment.name),
            None => format!("🗑 Note removed from {}", assignment.name),
        }))
    }

    async fn track(&self, user: &User, repo: &str) -> Result<Reply, AppError> {
        let full_name = parse_repo_reference(repo)
            .map_err(|_| AppError::BadRequest(format!("{:?} is not an owner/repo reference", repo)))?;
        let url = format!("https://github.com/{}", full_name);
        let added =
            repository::add_tracked_repository(&self.state.db, &user.id, &full_name, Some(&url))
                .await?;
        Ok(Reply::text(if added {
            format!("👀 Tracking {}", full_name)
        } else {
            format!("Already tracking {}", full_name)
        }))
    }

    async fn untrack(&self, user: &User, repo: &str) -> Result<Reply, AppError> {
        let full_name = parse_repo_reference(repo)
            .map_err(|_| AppError::BadRequest(format!("{:?} is not an owner/repo reference", repo)))?;
        if repository::remove_tracked_repository(&self.state.db, &user.id, &full_name).await? {
            Ok(Reply::text(format!("✅ Stopped tracking {}", full_name)))
        } else {
            Err(AppError::NotFound(format!("{} is not tracked", full_name)))
        }
    }

    async fn ci_status(&self, user: &User) -> Result<Reply, AppError> {
        let tracked = repository::fetch_tracked_repositories(&self.state.db, &user.id).await?;
        if tracked.is_empty() {
            return Ok(Reply::text(
                "📭 No tracked repositories. Use /track <owner/repo> to add one.",
            ));
        }

        let mut text = String::from("🔧 CI status:\n");
        for repo in &tracked {
            let line = match self
                .state
                .classroom
                .latest_workflow_run(user.token(), &repo.repo_full_name)
                .await
            {
                Ok(Some(run)) => {
                    let outcome = run.conclusion.as_deref().or(run.status.as_deref()).unwrap_or("unknown");
                    format!(
                        "{} {}: {} ({})",
                        ci_icon(&outcome.to_lowercase()),
                        repo.repo_full_name,
                        run.name.as_deref().unwrap_or("workflow"),
                        outcome
                    )
                }
                Ok(None) => format!("⚪ {}: no workflow runs", repo.repo_full_name),
                Err(e) => format!("⚠️ {}: {}", repo.repo_full_name, e),
            };
            let _ = write!(text, "\n{}", line);
        }
        Ok(Reply::text(text))
    }

    async fn classroom(&self, user: &User, now: NaiveDateTime) -> Result<Reply, AppError> {
        let report = SyncService::new(self.state.db.clone(), self.state.classroom.clone())
            .sync_teacher(user, true, now)
            .await?;
        let records = snapshot::fetch_snapshot(&self.state.db, &user.id).await?;
        Ok(Reply::text(render_overview(&records, &report)))
    }

    async fn export(&self, user: &User, now: NaiveDateTime) -> Result<Reply, AppError> {
        let records = snapshot::fetch_snapshot(&self.state.db, &user.id).await?;
        if records.is_empty() {
            return Ok(Reply::text(
                "📭 No classroom data to export. Run /classroom first.",
            ));
        }
        let bytes = export::classroom_workbook(&records)?;
        Ok(Reply {
            text: format!("📊 Classroom export ({} rows)", records.len()),
            attachment: Some(Attachment {
                file_name: format!("classroom_export_{}.zip", now.format("%Y%m%d_%H%M%S")),
                bytes,
            }),
        })
    }

    async fn export_users(&self, now: NaiveDateTime) -> Result<Reply, AppError> {
        let users = repository::fetch_users(&self.state.db).await?;
        if users.is_empty() {
            return Ok(Reply::text("📭 No registered users."));
        }
        let bytes = export::user_roster(&users)?;
        Ok(Reply {
            text: format!("👥 {} registered users", users.len()),
            attachment: Some(Attachment {
                file_name: format!("users_{}.csv", now.format("%Y%m%d_%H%M%S")),
                bytes,
            }),
        })
    }

    async fn submissions(&self, user: &User) -> Result<Reply, AppError> {
        let rows = if user.is_teacher() {
            repository::fetch_submission_rows_for_owner(&self.state.db, &user.id).await?
        } else {
            repository::fetch_submission_rows_for_student(&self.state.db, &user.id).await?
        };
        if rows.is_empty() {
            return Ok(Reply::text("📭 No submissions recorded yet."));
        }

        let mut text = format!("📦 Submissions ({}):\n", rows.len());
        for row in &rows {
            let _ = write!(
                text,
                "\n{} {} | {}",
                if row.is_submitted { "✅" } else { "⏳" },
                row.assignment_name,
                row.student_login
                    .clone()
                    .unwrap_or_else(|| format!("chat {}", row.student_chat_id))
            );
            if let Some(url) = &row.repo_url {
                let _ = write!(text, "\n   🔗 {}", url);
            }
            if let Some(sha) = &row.last_commit_sha {
                let short: String = sha.chars().take(7).collect();
                let _ = write!(text, "\n   🔨 {}", short);
                if let Some(date) = row.last_commit_date {
                    let _ = write!(text, " at {} UTC", date.format(DATE_FORMAT));
                }
            }
            if let Some(at) = row.submitted_at {
                let _ = write!(text, "\n   📬 submitted {} UTC", at.format(DATE_FORMAT));
            }
        }
        Ok(Reply::text(text))
    }

    async fn notify(&self, user: &User, args: NotifyArgs) -> Result<Reply, AppError> {
        let (threshold, period) = match args {
            NotifyArgs::Show => (user.notify_threshold_hours, user.notify_period_seconds),
            NotifyArgs::Reset => (None, None),
            NotifyArgs::Set { hours, seconds } => {
                (Some(hours), seconds.or(user.notify_period_seconds))
            }
        };
        if !matches!(args, NotifyArgs::Show) {
            repository::set_notify_overrides(&self.state.db, &user.id, threshold, period).await?;
        }

        let defaults = NotifySettings::from(
            &repository::get_or_create_settings(&self.state.db, self.state.notify_defaults).await?,
        );
        let source = |value: Option<i64>| if value.is_some() { "your setting" } else { "default" };
        Ok(Reply::text(format!(
            "🔔 Reminders start {}h before a deadline ({}) and repeat every {}s ({}).",
            threshold.unwrap_or(defaults.threshold_hours),
            source(threshold),
            period.unwrap_or(defaults.period_seconds),
            source(period)
        )))
    }

    async fn notify_defaults(&self, hours: i64, seconds: i64) -> Result<Reply, AppError> {
        let settings = repository::update_settings(
            &self.state.db,
            NotifySettings {
                threshold_hours: hours,
                period_seconds: seconds,
            },
        )
        .await?;
        Ok(Reply::text(format!(
            "✅ Defaults updated: {}h window, every {}s.",
            settings.notify_threshold_hours, settings.notify_period_seconds
        )))
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Start => "start",
        Command::Help => "help",
        Command::RegisterToken(_) => "register_token",
        Command::SetGithub(_) => "set_github",
        Command::Role { .. } => "role",
        Command::Assignments => "assignments",
        Command::AddAssignment { .. } => "add_assignment",
        Command::DeleteAssignment(_) => "delete_assignment",
        Command::AddNote { .. } => "add_note",
        Command::DeleteNote(_) => "delete_note",
        Command::Track(_) => "track",
        Command::Untrack(_) => "untrack",
        Command::CiStatus => "ci_status",
        Command::Classroom => "classroom",
        Command::Export => "export",
        Command::ExportUsers => "export_users",
        Command::Submissions => "submissions",
        Command::Notify(_) => "notify",
        Command::NotifyDefaults { .. } => "notify_defaults",
        Command::Unknown(_) => "unknown",
    }
}

fn ci_icon(outcome: &str) -> &'static str {
    match outcome {
        "success" => "✅",
        "failure" | "timed_out" | "startup_failure" => "❌",
        "cancelled" | "skipped" => "⚪",
        "in_progress" | "queued" | "waiting" | "pending" => "🔄",
        _ => "❔",
    }
}

fn push_warnings(text: &mut String, warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    text.push_str("\n\n⚠️ Warnings:");
    for warning in warnings {
        let _ = write!(text, "\n- {}", warning);
    }
}

pub fn render_listing(listing: &Listing) -> String {
    let mut text = if listing.entries.is_empty() {
        String::from("📭 No assignments yet.")
    } else {
        String::from("📚 Your assignments:")
    };

    for (index, entry) in listing.entries.iter().enumerate() {
        let assignment = &entry.assignment;
        let _ = write!(text, "\n\n{}. {}", index + 1, assignment.name);
        let status = match (entry.status, assignment.deadline) {
            (EntryStatus::Active { days, hours }, Some(deadline)) => format!(
                "⏰ {} UTC ({} left)",
                deadline.format(DATE_FORMAT),
                format_remaining(Duration::days(days) + Duration::hours(hours))
            ),
            (EntryStatus::Past, Some(deadline)) => {
                format!("⌛ {} UTC (past due)", deadline.format(DATE_FORMAT))
            }
            _ => "📅 No deadline".to_string(),
        };
        let _ = write!(text, "\n   {}", status);
        if let Some(teacher) = &entry.teacher {
            let _ = write!(text, "\n   👩‍🏫 {}", teacher);
        }
        let _ = write!(text, "\n   🔗 {}", entry.repository);
        if let Some(note) = assignment.note.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = write!(text, "\n   📝 {}", note);
        }
        match entry.submitted {
            Some(true) => text.push_str("\n   ✅ Submitted"),
            Some(false) => text.push_str("\n   ⏳ Not submitted"),
            None => {}
        }
    }

    push_warnings(&mut text, &listing.warnings);
    text
}

pub fn render_overview(records: &[ClassroomRecord], report: &SyncReport) -> String {
    if records.is_empty() {
        let mut text = String::from("📭 No classroom data found.");
        push_warnings(&mut text, &report.warnings);
        return text;
    }

    let mut classrooms: BTreeMap<&str, BTreeMap<&str, (Option<NaiveDateTime>, usize, usize, usize)>> =
        BTreeMap::new();
    for record in records {
        let counts = classrooms
            .entry(record.classroom_name.as_deref().unwrap_or("Classroom"))
            .or_default()
            .entry(record.assignment_title.as_deref().unwrap_or("Untitled"))
            .or_insert((record.deadline, 0, 0, 0));
        if record.student_login.is_some() || record.student_display_login.is_some() {
            counts.1 += 1;
            counts.2 += usize::from(record.submitted == Some(true));
            counts.3 += usize::from(record.passed == Some(true));
        }
    }

    let mut text = String::from("🏫 GitHub Classroom overview");
    for (classroom, assignments) in &classrooms {
        let _ = write!(text, "\n\n📘 {}", classroom);
        for (title, (deadline, accepted, submitted, passed)) in assignments {
            let due = deadline
                .map(|d| format!("{} UTC", d.format(DATE_FORMAT)))
                .unwrap_or_else(|| "no deadline".to_string());
            let _ = write!(
                text,
                "\n  • {} ({})\n    👥 {} accepted, 📬 {} submitted, ✅ {} passing",
                title, due, accepted, submitted, passed
            );
        }
    }

    let stats = &report.stats;
    let _ = write!(
        text,
        "\n\n🔄 Sync: {} new / {} updated assignments, {} new / {} updated submissions, {} unmatched students",
        stats.assignments_created,
        stats.assignments_updated,
        stats.submissions_created,
        stats.submissions_updated,
        stats.unmatched
    );
    push_warnings(&mut text, &report.warnings);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Assignment;
    use crate::services::listing::ListingEntry;

    #[test]
    fn test_empty_listing_says_no_data() {
        let listing = Listing {
            entries: Vec::new(),
            warnings: vec!["Could not list classrooms: rate limited".to_string()],
        };
        let text = render_listing(&listing);
        assert!(text.starts_with("📭 No assignments yet."));
        assert!(text.contains("rate limited"));
    }

    #[test]
    fn test_listing_renders_remaining_time() {
        let at = chrono::NaiveDate::from_ymd_opt(2025, 11, 11)
            .unwrap()
            .and_hms_opt(22, 33, 0)
            .unwrap();
        let entry = ListingEntry {
            assignment: Assignment {
                id: "a".to_string(),
                user_id: "t".to_string(),
                name: "HW1".to_string(),
                description: None,
                repo_name: "org/hw1".to_string(),
                repo_url: None,
                deadline: Some(at),
                classroom_id: None,
                classroom_assignment_id: None,
                note: Some("bring tests".to_string()),
                created_at: at,
                updated_at: at,
            },
            status: EntryStatus::Active { days: 1, hours: 3 },
            teacher: Some("Prof X".to_string()),
            repository: "org/hw1".to_string(),
            submitted: Some(false),
            owned: false,
        };
        let text = render_listing(&Listing {
            entries: vec![entry],
            warnings: Vec::new(),
        });
        assert!(text.contains("1. HW1"));
        assert!(text.contains("2025-11-11 22:33 UTC (1d 3h left)"));
        assert!(text.contains("Prof X"));
        assert!(text.contains("bring tests"));
        assert!(text.contains("Not submitted"));
    }
}
