//! Follow-up tasks in a ClickUp list.

use super::{check_reachable, send_json};
use crate::adapters::{task_name, TaskCreator, TaskPriority, TaskRef};
use crate::core::{Lead, StageResult};
use crate::errors::FailureKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.clickup.com/api/v2";

#[derive(Debug, Serialize)]
struct NewTask<'a> {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u8>,
    /// Unix epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

/// Files one follow-up task per lead into a fixed list.
#[derive(Clone)]
pub struct ClickUpTaskCreator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    list_id: String,
}

impl ClickUpTaskCreator {
    /// Creates a task creator for list `list_id`.
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, list_id: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            list_id: list_id.into(),
        }
    }

    /// Points the creator at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn list_url(&self) -> String {
        format!("{}/list/{}", self.base_url.trim_end_matches('/'), self.list_id)
    }
}

impl std::fmt::Debug for ClickUpTaskCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickUpTaskCreator")
            .field("list_id", &self.list_id)
            .finish_non_exhaustive()
    }
}

fn new_task(lead: &Lead, priority: Option<TaskPriority>, due_date: Option<DateTime<Utc>>) -> NewTask<'_> {
    NewTask {
        name: task_name(lead),
        description: lead.message(),
        priority: priority.map(TaskPriority::level),
        due_date: due_date.map(|d| d.timestamp_millis()),
    }
}

#[async_trait]
impl TaskCreator for ClickUpTaskCreator {
    async fn create_task(
        &self,
        lead: &Lead,
        priority: Option<TaskPriority>,
        due_date: Option<DateTime<Utc>>,
    ) -> StageResult<TaskRef> {
        if lead.message().is_none() {
            return StageResult::permanent(FailureKind::Validation, "lead has no generated message");
        }
        let body = new_task(lead, priority, due_date);
        debug!(lead_id = %lead.id, list_id = %self.list_id, "Creating follow-up task");
        let request = self
            .client
            .post(format!("{}/task", self.list_url()))
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&body);
        send_json::<CreatedTask>(request)
            .await
            .map(|task| TaskRef {
                id: task.id,
                url: task.url,
            })
    }

    async fn test_connection(&self) -> bool {
        let request = self
            .client
            .get(self.list_url())
            .header(reqwest::header::AUTHORIZATION, &self.api_key);
        check_reachable(request).await
    }
}
