pub mod handlers;

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;
use crate::models::Role;

pub use handlers::{Attachment, CommandHandler, Reply};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)"|'([^']*)'|(\S+)"#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyArgs {
    Show,
    Set { hours: i64, seconds: Option<i64> },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    RegisterToken(String),
    SetGithub(String),
    Role { role: Role, password: Option<String> },
    Assignments,
    AddAssignment { name: String, repo: String, deadline: String },
    DeleteAssignment(String),
    AddNote { name: String, text: String },
    DeleteNote(String),
    Track(String),
    Untrack(String),
    CiStatus,
    Classroom,
    Export,
    ExportUsers,
    Submissions,
    Notify(NotifyArgs),
    NotifyDefaults { hours: i64, seconds: i64 },
    Unknown(String),
}

/// Splits on whitespace, keeping single- or double-quoted runs together.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

fn usage(text: &str) -> AppError {
    AppError::BadRequest(format!("Usage: {}", text))
}

/// One year, in hours.
pub const MAX_THRESHOLD_HOURS: i64 = 8_760;
/// One year, in seconds.
pub const MAX_PERIOD_SECONDS: i64 = 31_536_000;

fn bounded(raw: &str, what: &str, max: i64) -> Result<i64, AppError> {
    match raw.parse::<i64>() {
        Ok(value) if (1..=max).contains(&value) => Ok(value),
        _ => Err(AppError::BadRequest(format!(
            "{} must be a whole number from 1 to {}, got {:?}",
            what, max, raw
        ))),
    }
}

fn hours(raw: &str) -> Result<i64, AppError> {
    bounded(raw, "hours", MAX_THRESHOLD_HOURS)
}

fn seconds(raw: &str) -> Result<i64, AppError> {
    bounded(raw, "seconds", MAX_PERIOD_SECONDS)
}

impl Command {
    /// Parses one chat message. Input errors carry the usage line for the command.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let mut tokens = tokenize(text.trim()).into_iter();
        let Some(head) = tokens.next() else {
            return Ok(Command::Help);
        };
        // `/cmd@BotName` addresses a specific bot in group chats.
        let name = head
            .split('@')
            .next()
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_lowercase();
        let args: Vec<String> = tokens.collect();
        let rest = || args.join(" ");

        let command = match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "register_token" => match args.as_slice() {
                [token] => Command::RegisterToken(token.clone()),
                _ => return Err(usage("/register_token <github_token>")),
            },
            "set_github" => match args.as_slice() {
                [login] => Command::SetGithub(login.trim_start_matches('@').to_string()),
                _ => return Err(usage("/set_github <github_username>")),
            },
            "role" => {
                let Some(role) = args.first().and_then(|r| Role::parse(r)) else {
                    return Err(usage("/role <student|teacher> [password]"));
                };
                Command::Role {
                    role,
                    password: args.get(1).cloned(),
                }
            }
            "assignments" | "list" => Command::Assignments,
            "add_assignment" => match args.as_slice() {
                [name, repo, deadline @ ..] if !deadline.is_empty() => Command::AddAssignment {
                    name: name.clone(),
                    repo: repo.clone(),
                    deadline: deadline.join(" "),
                },
                _ => {
                    return Err(usage(
                        "/add_assignment \"<name>\" <owner/repo> <deadline, e.g. 2025-11-11 22:33 UTC>",
                    ));
                }
            },
            "delete_assignment" if !args.is_empty() => Command::DeleteAssignment(rest()),
            "delete_assignment" => return Err(usage("/delete_assignment <name>")),
            "add_note" => match args.as_slice() {
                [name, text @ ..] if !text.is_empty() => Command::AddNote {
                    name: name.clone(),
                    text: text.join(" "),
                },
                _ => return Err(usage("/add_note \"<assignment name>\" <text>")),
            },
            "delete_note" if !args.is_empty() => Command::DeleteNote(rest()),
            "delete_note" => return Err(usage("/delete_note <assignment name>")),
            "track" => match args.as_slice() {
                [repo] => Command::Track(repo.clone()),
                _ => return Err(usage("/track <owner/repo>")),
            },
            "untrack" => match args.as_slice() {
                [repo] => Command::Untrack(repo.clone()),
                _ => return Err(usage("/untrack <owner/repo>")),
            },
            "ci_status" | "ci" => Command::CiStatus,
            "classroom" => Command::Classroom,
            "export" => Command::Export,
            "export_users" => Command::ExportUsers,
            "submissions" => Command::Submissions,
            "notify" => match args.as_slice() {
                [] => Command::Notify(NotifyArgs::Show),
                [word] if word.eq_ignore_ascii_case("reset") => Command::Notify(NotifyArgs::Reset),
                [h] => Command::Notify(NotifyArgs::Set {
                    hours: hours(h)?,
                    seconds: None,
                }),
                [h, s] => Command::Notify(NotifyArgs::Set {
                    hours: hours(h)?,
                    seconds: Some(seconds(s)?),
                }),
                _ => return Err(usage("/notify <hours> [period_seconds] | /notify reset")),
            },
            "notify_defaults" => match args.as_slice() {
                [h, s] => Command::NotifyDefaults {
                    hours: hours(h)?,
                    seconds: seconds(s)?,
                },
                _ => return Err(usage("/notify_defaults <hours> <period_seconds>")),
            },
            _ => Command::Unknown(head),
        };
        Ok(command)
    }

    /// Commands reserved for the teacher role.
    pub fn requires_teacher(&self) -> bool {
        matches!(
            self,
            Command::AddAssignment { .. }
                | Command::DeleteAssignment(_)
                | Command::AddNote { .. }
                | Command::DeleteNote(_)
                | Command::Classroom
                | Command::Export
                | Command::ExportUsers
                | Command::NotifyDefaults { .. }
        )
    }
}
