//! Lead fixtures and a ready-made adapter set.

use std::sync::Arc;

use super::mocks::{ScriptedEmailSender, ScriptedGenerator, ScriptedTaskCreator, StaticLeadSource};
use crate::adapters::Adapters;
use crate::core::Lead;

/// Builds a pending lead.
#[must_use]
pub fn lead(id: &str, name: &str, company: &str, email: &str) -> Lead {
    Lead::new(id, name, company, email)
}

/// `count` valid leads with ids `lead-0`, `lead-1`, ...
#[must_use]
pub fn valid_leads(count: usize) -> Vec<Lead> {
    (0..count)
        .map(|i| {
            lead(
                &format!("lead-{i}"),
                &format!("Contact {i}"),
                &format!("Company {i}"),
                &format!("contact{i}@company{i}.com"),
            )
        })
        .collect()
}

/// Scripted adapters sharing one lead list, with typed handles kept for
/// assertions.
#[derive(Debug, Clone)]
pub struct MockAdapters {
    /// Lead source.
    pub source: Arc<StaticLeadSource>,
    /// Message generator.
    pub generator: Arc<ScriptedGenerator>,
    /// Email sender.
    pub email: Arc<ScriptedEmailSender>,
    /// Task creator.
    pub tasks: Arc<ScriptedTaskCreator>,
}

impl MockAdapters {
    /// Creates adapters that succeed for every lead.
    #[must_use]
    pub fn new(leads: Vec<Lead>) -> Self {
        Self::with_generator(leads, ScriptedGenerator::new())
    }

    /// Creates adapters with a custom generator.
    #[must_use]
    pub fn with_generator(leads: Vec<Lead>, generator: ScriptedGenerator) -> Self {
        Self {
            source: Arc::new(StaticLeadSource::new(leads)),
            generator: Arc::new(generator),
            email: Arc::new(ScriptedEmailSender::new()),
            tasks: Arc::new(ScriptedTaskCreator::new()),
        }
    }

    /// Type-erased bundle for the engine.
    #[must_use]
    pub fn adapters(&self) -> Adapters {
        Adapters::new(
            self.source.clone(),
            self.generator.clone(),
            self.email.clone(),
            self.tasks.clone(),
        )
    }
}
