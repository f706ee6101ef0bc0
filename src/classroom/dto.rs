//! Payload shapes returned by the remote classroom service.
//!
//! Every field is optional and decoded leniently: a field with an unexpected
//! type reads as absent instead of failing the whole record.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::datetime::parse_json_datetime;

/// First candidate that is present and non-blank after trimming.
pub fn first_present<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn lenient_objects<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Classroom {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub archived: Option<bool>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RepositoryRef {
    #[serde(default, deserialize_with = "lenient_text")]
    pub html_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StudentRef {
    #[serde(default, deserialize_with = "lenient_text")]
    pub login: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub github_username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
}

/// One remote assignment inside a classroom.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AssignmentDescriptor {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub invite_link: Option<String>,
    #[serde(default)]
    pub deadline: Option<Value>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub starter_code_repository: Option<RepositoryRef>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub accepted: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub submitted: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub passing: Option<i64>,
}

impl AssignmentDescriptor {
    pub fn external_id(&self) -> Option<&str> {
        first_present([self.id.as_deref()])
    }

    pub fn title(&self) -> Option<&str> {
        first_present([self.title.as_deref(), self.slug.as_deref()])
    }

    pub fn deadline(&self) -> Option<NaiveDateTime> {
        self.deadline.as_ref().and_then(parse_json_datetime)
    }
}

/// One student's acceptance of a remote assignment, plus the untouched payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Acceptance {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub submitted: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub passing: Option<bool>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub grade: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub commit_count: Option<i64>,
    #[serde(default)]
    pub submitted_at: Option<Value>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub student: Option<StudentRef>,
    #[serde(default, deserialize_with = "lenient_objects")]
    pub students: Vec<StudentRef>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub repository: Option<RepositoryRef>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub login: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub github_username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub student_login: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl Acceptance {
    /// Decodes a raw payload; anything that is not an object becomes an empty acceptance.
    pub fn from_raw(raw: Value) -> Self {
        let mut acceptance: Acceptance = match &raw {
            Value::Object(_) => serde_json::from_value(raw.clone()).unwrap_or_default(),
            _ => Acceptance::default(),
        };
        acceptance.raw = raw;
        acceptance
    }

    /// The `student` object, or else the first entry of `students`.
    pub fn primary_student(&self) -> Option<&StudentRef> {
        self.student.as_ref().or_else(|| self.students.first())
    }

    pub fn submitted_at(&self) -> Option<NaiveDateTime> {
        self.submitted_at.as_ref().and_then(parse_json_datetime)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RepositoryInfo {
    #[serde(default, deserialize_with = "lenient_text")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub html_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CommitAuthor {
    #[serde(default, deserialize_with = "lenient_text")]
    name: Option<String>,
    #[serde(default)]
    date: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CommitDetail {
    #[serde(default, deserialize_with = "lenient_text")]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CommitPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    sha: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    html_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    commit: Option<CommitDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: Option<NaiveDateTime>,
    pub url: Option<String>,
}

impl From<CommitPayload> for CommitInfo {
    fn from(payload: CommitPayload) -> Self {
        let detail = payload.commit.unwrap_or_default();
        let author = detail.author.unwrap_or_default();
        Self {
            sha: payload.sha.unwrap_or_default(),
            message: detail.message.unwrap_or_default(),
            author: author.name.unwrap_or_else(|| "Unknown".to_string()),
            date: author.date.as_ref().and_then(parse_json_datetime),
            url: payload.html_url,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkflowRun {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub conclusion: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub head_branch: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub html_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowRunsResponse {
    #[serde(default, deserialize_with = "lenient_objects")]
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthenticatedUser {
    pub login: String,
}
