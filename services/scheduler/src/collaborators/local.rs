//! In-process collaborators used when no endpoint is configured.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::{CollaboratorError, ContentGenerator, Notifier, NotifyReport, PollDraft, Signal, SignalSource};
use crate::polls::{Poll, PollKind};

/// Serves a fixed list of signals, filtered by category.
#[derive(Debug, Default)]
pub struct StaticSignalSource {
    signals: Mutex<Vec<Signal>>,
}

impl StaticSignalSource {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            signals: Mutex::new(signals),
        }
    }

    /// Replaces the served signals.
    pub fn set(&self, signals: Vec<Signal>) {
        *self.signals.lock().unwrap_or_else(|e| e.into_inner()) = signals;
    }
}

#[async_trait]
impl SignalSource for StaticSignalSource {
    async fn fetch_trending(
        &self,
        categories: &[String],
        limit: usize,
    ) -> Result<Vec<Signal>, CollaboratorError> {
        let signals = self.signals.lock().unwrap_or_else(|e| e.into_inner());
        Ok(signals
            .iter()
            .filter(|s| categories.is_empty() || categories.contains(&s.category))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Drafts a question from the highest-scoring usable signal, or an
/// evergreen question for the first category not being avoided.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    categories: Vec<String>,
}

impl TemplateGenerator {
    pub fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    fn from_signal(signal: &Signal) -> PollDraft {
        PollDraft {
            category: signal.category.clone(),
            question: format!("How big a deal is \"{}\"?", signal.title),
            choices: vec![
                "Huge".to_string(),
                "Somewhat".to_string(),
                "Overhyped".to_string(),
                "Haven't heard of it".to_string(),
            ],
            source_title: signal.title.clone(),
            source_signal: if signal.summary.is_empty() {
                signal.url.clone().unwrap_or_default()
            } else {
                signal.summary.clone()
            },
        }
    }

    fn evergreen(category: &str) -> PollDraft {
        PollDraft {
            category: category.to_string(),
            question: format!("Are you following {category} news this week?"),
            choices: vec![
                "Closely".to_string(),
                "A little".to_string(),
                "Not at all".to_string(),
            ],
            source_title: String::new(),
            source_signal: "evergreen".to_string(),
        }
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(
        &self,
        signals: &[Signal],
        avoid_categories: &[String],
    ) -> Result<Vec<PollDraft>, CollaboratorError> {
        let mut ranked: Vec<&Signal> = signals.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let preferred = ranked
            .iter()
            .find(|s| !avoid_categories.contains(&s.category))
            .or_else(|| ranked.first());

        if let Some(signal) = preferred {
            return Ok(vec![Self::from_signal(signal)]);
        }

        let category = self
            .categories
            .iter()
            .find(|c| !avoid_categories.contains(c))
            .or_else(|| self.categories.first());

        Ok(category.map(|c| Self::evergreen(c)).into_iter().collect())
    }
}

/// Logs announcements instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, poll: &Poll, kind: PollKind) -> NotifyReport {
        info!(
            poll_id = %poll.id,
            kind = %kind,
            category = %poll.category,
            "Poll opened (no notification endpoint configured)"
        );
        NotifyReport {
            skipped: 1,
            ..Default::default()
        }
    }
}
