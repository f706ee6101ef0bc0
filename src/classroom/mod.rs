pub mod dto;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use dto::{
    Acceptance, AssignmentDescriptor, Classroom, CommitInfo, RepositoryInfo, RepositoryRef,
    StudentRef, WorkflowRun, first_present,
};

const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 50;
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("classroom-assistant/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ClassroomError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token rejected by the remote service")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by the remote service")]
    RateLimited,

    #[error("remote API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected payload: {0}")]
    Decode(String),

    #[error("invalid repository reference: {0}")]
    InvalidRepository(String),
}

/// Read-only view of the remote classroom service.
///
/// Every call carries the caller's own token; the client holds no credentials.
#[async_trait]
pub trait ClassroomClient: Send + Sync {
    async fn current_login(&self, token: &str) -> Result<String, ClassroomError>;
    async fn list_classrooms(&self, token: &str) -> Result<Vec<Classroom>, ClassroomError>;
    async fn list_assignments(
        &self,
        token: &str,
        classroom_id: &str,
    ) -> Result<Vec<AssignmentDescriptor>, ClassroomError>;
    async fn list_acceptances(
        &self,
        token: &str,
        assignment_id: &str,
    ) -> Result<Vec<Acceptance>, ClassroomError>;
    async fn list_user_repositories(&self, token: &str)
    -> Result<Vec<RepositoryRef>, ClassroomError>;
    async fn repository_info(
        &self,
        token: Option<&str>,
        full_name: &str,
    ) -> Result<RepositoryInfo, ClassroomError>;
    async fn latest_commit(
        &self,
        token: Option<&str>,
        full_name: &str,
    ) -> Result<Option<CommitInfo>, ClassroomError>;
    async fn latest_workflow_run(
        &self,
        token: Option<&str>,
        full_name: &str,
    ) -> Result<Option<WorkflowRun>, ClassroomError>;
}

/// Normalizes `https://github.com/org/repo(.git)`, `github.com/org/repo` or `org/repo`
/// into `org/repo`.
pub fn parse_repo_reference(reference: &str) -> Result<String, ClassroomError> {
    let trimmed = reference.trim().trim_end_matches('/');
    let path = match trimmed.find("github.com/") {
        Some(idx) => &trimmed[idx + "github.com/".len()..],
        None => trimmed,
    };
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo))
            if !owner.contains(char::is_whitespace) && !repo.contains(char::is_whitespace) =>
        {
            Ok(format!("{}/{}", owner, repo))
        }
        _ => Err(ClassroomError::InvalidRepository(reference.to_string())),
    }
}

pub struct GithubHttpClient {
    client: Client,
    base_url: String,
}

impl GithubHttpClient {
    pub fn new(base_url: &str) -> Result<Self, ClassroomError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: Option<&str>,
        path: &str,
    ) -> Result<T, ClassroomError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => ClassroomError::Unauthorized,
                StatusCode::NOT_FOUND => ClassroomError::NotFound(path.to_string()),
                StatusCode::TOO_MANY_REQUESTS => ClassroomError::RateLimited,
                StatusCode::FORBIDDEN if body.to_lowercase().contains("rate limit") => {
                    ClassroomError::RateLimited
                }
                _ => ClassroomError::Api {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<T>(&body)
            .map_err(|e| ClassroomError::Decode(format!("{}: {}", path, e)))
    }

    /// Follows `page=N` until a short page comes back.
    async fn get_paged(&self, token: &str, path: &str) -> Result<Vec<Value>, ClassroomError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let paged = format!("{}{}per_page={}&page={}", path, separator, PAGE_SIZE, page);
            let batch: Vec<Value> = self.get_json(Some(token), &paged).await?;
            let len = batch.len();
            items.extend(batch);
            if len < PAGE_SIZE {
                break;
            }
        }
        debug!("fetched {} items from {}", items.len(), path);
        Ok(items)
    }
}

fn decode_objects<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

#[async_trait]
impl ClassroomClient for GithubHttpClient {
    async fn current_login(&self, token: &str) -> Result<String, ClassroomError> {
        let user: dto::AuthenticatedUser = self.get_json(Some(token), "/user").await?;
        Ok(user.login)
    }

    async fn list_classrooms(&self, token: &str) -> Result<Vec<Classroom>, ClassroomError> {
        Ok(decode_objects(self.get_paged(token, "/classrooms").await?))
    }

    async fn list_assignments(
        &self,
        token: &str,
        classroom_id: &str,
    ) -> Result<Vec<AssignmentDescriptor>, ClassroomError> {
        let path = format!("/classrooms/{}/assignments", classroom_id);
        Ok(decode_objects(self.get_paged(token, &path).await?))
    }

    async fn list_acceptances(
        &self,
        token: &str,
        assignment_id: &str,
    ) -> Result<Vec<Acceptance>, ClassroomError> {
        let path = format!("/assignments/{}/accepted_assignments", assignment_id);
        Ok(self
            .get_paged(token, &path)
            .await?
            .into_iter()
            .map(Acceptance::from_raw)
            .collect())
    }

    async fn list_user_repositories(
        &self,
        token: &str,
    ) -> Result<Vec<RepositoryRef>, ClassroomError> {
        Ok(decode_objects(
            self.get_paged(token, "/user/repos?sort=updated").await?,
        ))
    }

    async fn repository_info(
        &self,
        token: Option<&str>,
        full_name: &str,
    ) -> Result<RepositoryInfo, ClassroomError> {
        let full_name = parse_repo_reference(full_name)?;
        self.get_json(token, &format!("/repos/{}", full_name)).await
    }

    async fn latest_commit(
        &self,
        token: Option<&str>,
        full_name: &str,
    ) -> Result<Option<CommitInfo>, ClassroomError> {
        let full_name = parse_repo_reference(full_name)?;
        let path = format!("/repos/{}/commits?per_page=1", full_name);
        match self.get_json::<Vec<dto::CommitPayload>>(token, &path).await {
            Ok(commits) => Ok(commits.into_iter().next().map(CommitInfo::from)),
            // An empty repository answers 409 Conflict.
            Err(ClassroomError::Api { status: 409, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn latest_workflow_run(
        &self,
        token: Option<&str>,
        full_name: &str,
    ) -> Result<Option<WorkflowRun>, ClassroomError> {
        let full_name = parse_repo_reference(full_name)?;
        let path = format!("/repos/{}/actions/runs?per_page=1", full_name);
        let runs: dto::WorkflowRunsResponse = self.get_json(token, &path).await?;
        Ok(runs.workflow_runs.into_iter().next())
    }
}
