//! Lead source backed by an Airtable table.

use super::{check_reachable, send_json};
use crate::adapters::LeadSource;
use crate::core::{Lead, StageResult};
use crate::errors::SourceError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    #[serde(default)]
    fields: LeadFields,
}

#[derive(Debug, Default, Deserialize)]
struct LeadFields {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Company", default)]
    company: String,
    #[serde(rename = "Email", default)]
    email: String,
}

impl From<Record> for Lead {
    fn from(record: Record) -> Self {
        let fields = record.fields;
        Self::new(record.id, fields.name, fields.company, fields.email)
    }
}

/// Reads leads from the `Name`, `Company` and `Email` columns of a table.
///
/// Missing columns come through as empty strings and are rejected by lead
/// validation rather than here.
#[derive(Clone)]
pub struct AirtableLeadSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    base_id: String,
    table: String,
}

impl AirtableLeadSource {
    /// Creates a source for `table` in base `base_id`.
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_id: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            base_id: base_id.into(),
            table: table.into(),
        }
    }

    /// Points the source at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.base_id,
            self.table
        )
    }

    async fn fetch_page(&self, offset: Option<&str>) -> StageResult<RecordPage> {
        let mut request = self
            .client
            .get(self.endpoint())
            .bearer_auth(&self.api_key)
            .query(&[("pageSize", PAGE_SIZE)]);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }
        send_json(request).await
    }
}

impl std::fmt::Debug for AirtableLeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableLeadSource")
            .field("base_id", &self.base_id)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LeadSource for AirtableLeadSource {
    async fn list_leads(&self) -> Result<Vec<Lead>, SourceError> {
        let mut leads = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let page = self
                .fetch_page(offset.as_deref())
                .await
                .into_result()
                .map_err(|f| SourceError::new(f.kind, f.reason))?;
            debug!(records = page.records.len(), "Fetched Airtable page");
            leads.extend(page.records.into_iter().map(Lead::from));
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        info!(table = %self.table, leads = leads.len(), "Retrieved leads from Airtable");
        Ok(leads)
    }

    async fn test_connection(&self) -> bool {
        let request = self
            .client
            .get(self.endpoint())
            .bearer_auth(&self.api_key)
            .query(&[("maxRecords", "1")]);
        check_reachable(request).await
    }
}
