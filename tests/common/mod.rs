#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::SqlitePool;

use classroom_assistant::chat::{ChatGateway, DeliveryError};
use classroom_assistant::classroom::{
    Acceptance, AssignmentDescriptor, Classroom, ClassroomClient, ClassroomError, CommitInfo,
    RepositoryInfo, RepositoryRef, WorkflowRun,
};
use classroom_assistant::db::{self, repository};
use classroom_assistant::models::{ChatIdentity, NotifySettings, Role, User};
use classroom_assistant::state::AppState;

pub const TEACHER_PASSWORD: &str = "letmein";

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

pub async fn pool() -> SqlitePool {
    db::connect_in_memory().await.expect("in-memory database")
}

/// Registers a chat user and applies the optional role, login and token.
pub async fn user(
    pool: &SqlitePool,
    chat_id: i64,
    role: Role,
    github_login: Option<&str>,
    token: Option<&str>,
) -> User {
    let created = repository::upsert_chat_user(
        pool,
        &ChatIdentity {
            chat_id,
            username: Some(format!("user{}", chat_id)),
            first_name: None,
            last_name: None,
        },
    )
    .await
    .expect("user");
    repository::set_role(pool, &created.id, role).await.expect("role");
    match (github_login, token) {
        (Some(login), Some(token)) => {
            repository::set_github_credentials(pool, &created.id, token, login)
                .await
                .expect("credentials");
        }
        (Some(login), None) => {
            repository::set_github_username(pool, &created.id, login)
                .await
                .expect("login");
        }
        _ => {}
    }
    repository::find_user_by_id(pool, &created.id)
        .await
        .expect("reload")
        .expect("user exists")
}

pub fn descriptor(value: Value) -> AssignmentDescriptor {
    serde_json::from_value(value).expect("descriptor")
}

pub fn classroom(id: &str, name: &str) -> Classroom {
    Classroom {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

/// In-memory remote classroom service.
#[derive(Default)]
pub struct FakeClassroom {
    pub login: Option<String>,
    pub classrooms: Vec<Classroom>,
    pub assignments: HashMap<String, Vec<AssignmentDescriptor>>,
    pub acceptances: HashMap<String, Vec<Value>>,
    pub repositories: Vec<RepositoryRef>,
    pub commits: HashMap<String, CommitInfo>,
    pub runs: HashMap<String, WorkflowRun>,
    pub fail_classrooms: bool,
    pub fail_acceptances: HashSet<String>,
}

#[async_trait]
impl ClassroomClient for FakeClassroom {
    async fn current_login(&self, _token: &str) -> Result<String, ClassroomError> {
        self.login.clone().ok_or(ClassroomError::Unauthorized)
    }

    async fn list_classrooms(&self, _token: &str) -> Result<Vec<Classroom>, ClassroomError> {
        if self.fail_classrooms {
            return Err(ClassroomError::RateLimited);
        }
        Ok(self.classrooms.clone())
    }

    async fn list_assignments(
        &self,
        _token: &str,
        classroom_id: &str,
    ) -> Result<Vec<AssignmentDescriptor>, ClassroomError> {
        Ok(self.assignments.get(classroom_id).cloned().unwrap_or_default())
    }

    async fn list_acceptances(
        &self,
        _token: &str,
        assignment_id: &str,
    ) -> Result<Vec<Acceptance>, ClassroomError> {
        if self.fail_acceptances.contains(assignment_id) {
            return Err(ClassroomError::Api {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(self
            .acceptances
            .get(assignment_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(Acceptance::from_raw)
            .collect())
    }

    async fn list_user_repositories(
        &self,
        _token: &str,
    ) -> Result<Vec<RepositoryRef>, ClassroomError> {
        Ok(self.repositories.clone())
    }

    async fn repository_info(
        &self,
        _token: Option<&str>,
        full_name: &str,
    ) -> Result<RepositoryInfo, ClassroomError> {
        Ok(RepositoryInfo {
            full_name: Some(full_name.to_string()),
            html_url: Some(format!("https://github.com/{}", full_name)),
            updated_at: None,
        })
    }

    async fn latest_commit(
        &self,
        _token: Option<&str>,
        full_name: &str,
    ) -> Result<Option<CommitInfo>, ClassroomError> {
        Ok(self.commits.get(full_name).cloned())
    }

    async fn latest_workflow_run(
        &self,
        _token: Option<&str>,
        full_name: &str,
    ) -> Result<Option<WorkflowRun>, ClassroomError> {
        Ok(self.runs.get(full_name).cloned())
    }
}

/// Chat gateway that records deliveries and fails for selected chats.
#[derive(Default)]
pub struct RecordingChat {
    pub messages: Mutex<Vec<(i64, String)>>,
    pub documents: Mutex<Vec<(i64, String, usize)>>,
    pub failing_chats: Mutex<HashSet<i64>>,
}

impl RecordingChat {
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn fail_for(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn recover(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().remove(&chat_id);
    }
}

#[async_trait]
impl ChatGateway for RecordingChat {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(DeliveryError::Rejected("chat not found".to_string()));
        }
        self.messages.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        _caption: Option<&str>,
    ) -> Result<(), DeliveryError> {
        self.documents
            .lock()
            .unwrap()
            .push((chat_id, file_name.to_string(), bytes.len()));
        Ok(())
    }
}

pub fn defaults() -> NotifySettings {
    NotifySettings {
        threshold_hours: 24,
        period_seconds: 3600,
    }
}

pub fn app_state(
    pool: SqlitePool,
    classroom: Arc<dyn ClassroomClient>,
    chat: Arc<dyn ChatGateway>,
) -> AppState {
    AppState {
        db: pool,
        classroom,
        chat,
        teacher_password: Arc::from(TEACHER_PASSWORD),
        notify_defaults: defaults(),
    }
}
