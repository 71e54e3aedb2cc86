//! Campaign configuration from flags and environment.

#[cfg(feature = "smtp")]
use crate::adapters::smtp::SmtpSettings;
use crate::adapters::{ClientInfo, TaskPriority};
use crate::campaign::{CampaignOptions, DEFAULT_CONCURRENCY};
use crate::errors::ConfigError;
use crate::pipeline::{OutreachContent, RetryPolicies, TaskSettings, DEFAULT_OFFER};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Campaign behaviour settings.
#[derive(Debug, Clone, Args)]
pub struct CampaignSettings {
    /// Organisation the outreach is sent on behalf of
    #[arg(long, env = "OUTREACH_CLIENT_NAME", default_value = "SuperGrowth Agency")]
    pub client_name: String,

    /// Offer described in every message
    #[arg(long, env = "OUTREACH_OFFER", default_value = DEFAULT_OFFER)]
    pub offer: String,

    /// Number of leads processed in parallel
    #[arg(long, env = "OUTREACH_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Timeout for a single external call, in seconds (0 disables)
    #[arg(long, env = "OUTREACH_CALL_TIMEOUT_SECS", default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Stop processing after this many seconds
    #[arg(long, env = "OUTREACH_DEADLINE_SECS")]
    pub deadline_secs: Option<u64>,

    /// Follow-up task priority (1 urgent .. 4 low)
    #[arg(long, env = "OUTREACH_TASK_PRIORITY")]
    pub task_priority: Option<u8>,

    /// Days until the follow-up task is due
    #[arg(long, env = "OUTREACH_TASK_DUE_DAYS")]
    pub task_due_days: Option<u32>,

    /// Skip an adapter for remaining leads once it rejects credentials
    #[arg(long, env = "OUTREACH_HALT_ON_AUTH_FAILURE", default_value_t = false)]
    pub halt_on_auth_failure: bool,

    /// JSON file with retry policies per adapter category
    #[arg(long, env = "OUTREACH_RETRY_POLICIES")]
    pub retry_policies: Option<PathBuf>,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            client_name: ClientInfo::default().name,
            offer: DEFAULT_OFFER.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            call_timeout_secs: 30,
            deadline_secs: None,
            task_priority: None,
            task_due_days: None,
            halt_on_auth_failure: false,
            retry_policies: None,
        }
    }
}

impl CampaignSettings {
    /// Validates the settings and builds run options.
    pub fn to_options(&self) -> Result<CampaignOptions, ConfigError> {
        if self.client_name.trim().is_empty() {
            return Err(ConfigError::invalid("client_name", "must not be empty"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        let priority = match self.task_priority {
            Some(level) => Some(
                TaskPriority::from_level(level)
                    .ok_or_else(|| ConfigError::invalid("task_priority", format!("{level} is not within 1..=4")))?,
            ),
            None => None,
        };
        let policies = match &self.retry_policies {
            Some(path) => RetryPolicies::from_json_file(path)?,
            None => RetryPolicies::default(),
        };

        let mut options = CampaignOptions::new()
            .with_concurrency(self.concurrency)
            .with_call_timeout((self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs)))
            .with_policies(policies)
            .with_content(OutreachContent {
                client: ClientInfo::new(self.client_name.trim()),
                offer: self.offer.clone(),
            })
            .with_task_settings(TaskSettings {
                priority,
                due_in_days: self.task_due_days,
            })
            .with_halt_on_auth_failure(self.halt_on_auth_failure);
        if let Some(secs) = self.deadline_secs {
            options = options.with_deadline(Duration::from_secs(secs));
        }
        Ok(options)
    }
}

/// Credentials and identifiers for the HTTP adapters.
#[derive(Clone, Args)]
pub struct Credentials {
    /// Airtable API key
    #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true, default_value = "")]
    pub airtable_api_key: String,

    /// Airtable base id
    #[arg(long, env = "AIRTABLE_BASE_ID", default_value = "")]
    pub airtable_base_id: String,

    /// Airtable table holding the leads
    #[arg(long, env = "AIRTABLE_TABLE_NAME", default_value = "")]
    pub airtable_table_name: String,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, default_value = "")]
    pub anthropic_api_key: String,

    /// ClickUp API key
    #[arg(long, env = "CLICKUP_API_KEY", hide_env_values = true, default_value = "")]
    pub clickup_api_key: String,

    /// ClickUp list receiving follow-up tasks
    #[arg(long, env = "CLICKUP_LIST_ID", default_value = "")]
    pub clickup_list_id: String,

    /// SMTP relay host
    #[arg(long, env = "SMTP_SERVER", default_value = "")]
    pub smtp_server: String,

    /// SMTP relay port
    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    /// SMTP login user
    #[arg(long, env = "SMTP_USERNAME", default_value = "")]
    pub smtp_username: String,

    /// SMTP login password
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true, default_value = "")]
    pub smtp_password: String,

    /// Sender address for outreach email
    #[arg(long, env = "FROM_EMAIL", default_value = "")]
    pub from_email: String,
}

impl Credentials {
    fn fields(&self) -> [(&'static str, &str); 10] {
        [
            ("AIRTABLE_API_KEY", self.airtable_api_key.as_str()),
            ("AIRTABLE_BASE_ID", self.airtable_base_id.as_str()),
            ("AIRTABLE_TABLE_NAME", self.airtable_table_name.as_str()),
            ("ANTHROPIC_API_KEY", self.anthropic_api_key.as_str()),
            ("CLICKUP_API_KEY", self.clickup_api_key.as_str()),
            ("CLICKUP_LIST_ID", self.clickup_list_id.as_str()),
            ("SMTP_SERVER", self.smtp_server.as_str()),
            ("SMTP_USERNAME", self.smtp_username.as_str()),
            ("SMTP_PASSWORD", self.smtp_password.as_str()),
            ("FROM_EMAIL", self.from_email.as_str()),
        ]
    }

    /// Fails with every missing variable named.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&str> = self
            .fields()
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing.join(", ")))
        }
    }
}

#[cfg(feature = "smtp")]
impl Credentials {
    /// SMTP relay settings, sending as `from_name` <`FROM_EMAIL`>.
    pub fn smtp_settings(&self, from_name: &str, timeout: Option<Duration>) -> SmtpSettings {
        SmtpSettings {
            server: self.smtp_server.trim().to_string(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            from_email: self.from_email.trim().to_string(),
            from_name: Some(from_name.to_string()),
            timeout,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("airtable_base_id", &self.airtable_base_id)
            .field("airtable_table_name", &self.airtable_table_name)
            .field("clickup_list_id", &self.clickup_list_id)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("from_email", &self.from_email)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            airtable_api_key: "key".into(),
            airtable_base_id: "app1".into(),
            airtable_table_name: "Leads".into(),
            anthropic_api_key: "sk-secret".into(),
            clickup_api_key: "pk".into(),
            clickup_list_id: "901".into(),
            smtp_server: "smtp.agency.io".into(),
            smtp_port: 587,
            smtp_username: "team".into(),
            smtp_password: "pw-secret".into(),
            from_email: "team@agency.io".into(),
        }
    }

    #[test]
    fn test_default_settings_to_options() {
        let options = CampaignSettings::default().to_options().unwrap();
        assert_eq!(options.concurrency, 5);
        assert_eq!(options.call_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.content.client.name, "SuperGrowth Agency");
        assert_eq!(options.policies, RetryPolicies::default());
        assert!(options.deadline.is_none());
    }

    #[test]
    fn test_settings_reject_bad_values() {
        let settings = CampaignSettings {
            task_priority: Some(9),
            ..CampaignSettings::default()
        };
        assert!(matches!(
            settings.to_options().unwrap_err(),
            ConfigError::Invalid { ref field, .. } if field == "task_priority"
        ));

        let settings = CampaignSettings {
            concurrency: 0,
            ..CampaignSettings::default()
        };
        assert!(settings.to_options().is_err());
    }

    #[test]
    fn test_settings_optional_fields() {
        let settings = CampaignSettings {
            call_timeout_secs: 0,
            deadline_secs: Some(60),
            task_priority: Some(2),
            task_due_days: Some(3),
            ..CampaignSettings::default()
        };
        let options = settings.to_options().unwrap();
        assert_eq!(options.call_timeout, None);
        assert_eq!(options.deadline, Some(Duration::from_secs(60)));
        assert_eq!(options.task_settings.priority, Some(TaskPriority::High));
        assert_eq!(options.task_settings.due_in_days, Some(3));
    }

    #[test]
    fn test_settings_load_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retry.json");
        std::fs::write(&path, r#"{"ai_generation": {"max_attempts": 6}}"#).unwrap();

        let settings = CampaignSettings {
            retry_policies: Some(path),
            ..CampaignSettings::default()
        };
        let options = settings.to_options().unwrap();
        assert_eq!(options.policies.ai_generation.max_attempts, 6);
    }

    #[test]
    fn test_credentials_missing_listed() {
        assert!(credentials().validate().is_ok());

        let mut partial = credentials();
        partial.anthropic_api_key.clear();
        partial.smtp_password.clear();
        partial.from_email = "  ".into();
        let err = partial.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required configuration: ANTHROPIC_API_KEY, SMTP_PASSWORD, FROM_EMAIL"
        );
    }

    #[cfg(feature = "smtp")]
    #[test]
    fn test_smtp_settings_from_credentials() {
        let settings = credentials().smtp_settings("SuperGrowth Agency", Some(Duration::from_secs(30)));
        assert_eq!(settings.server, "smtp.agency.io");
        assert_eq!(settings.port, 587);
        assert_eq!(settings.password, "pw-secret");
        assert_eq!(settings.from_name.as_deref(), Some("SuperGrowth Agency"));
    }

    #[test]
    fn test_credentials_debug_hides_keys() {
        let debug = format!("{:?}", credentials());
        assert!(!debug.contains("secret"));
        assert!(debug.contains("app1"));
        assert!(debug.contains("smtp.agency.io"));
    }
}
