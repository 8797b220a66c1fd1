//! External collaborators the scheduler calls but does not own.
//!
//! - [`SignalSource`]: trending signals that feed generation.
//! - [`ContentGenerator`]: turns signals into poll drafts.
//! - [`Notifier`]: announces polls that just opened.
//!
//! Each has an HTTP client implementation and a local default used when no
//! endpoint is configured.

mod http;
mod local;

pub use http::{HttpContentGenerator, HttpSignalSource, WebhookNotifier};
pub use local::{LogNotifier, StaticSignalSource, TemplateGenerator};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::polls::{Poll, PollKind};

/// A trending item from the signal aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub category: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: f64,
}

/// Candidate poll content returned by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollDraft {
    pub category: String,
    pub question: String,
    pub choices: Vec<String>,
    /// Title of the signal the draft was built from.
    #[serde(default)]
    pub source_title: String,
    #[serde(default)]
    pub source_signal: String,
}

/// Delivery counts from one announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    pub sent: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

/// Transport or decoding failure talking to a collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch_trending(
        &self,
        categories: &[String],
        limit: usize,
    ) -> Result<Vec<Signal>, CollaboratorError>;
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Zero or more drafts; callers take the first.
    async fn generate(
        &self,
        signals: &[Signal],
        avoid_categories: &[String],
    ) -> Result<Vec<PollDraft>, CollaboratorError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Never fails; delivery problems are reported in the counts.
    async fn notify(&self, poll: &Poll, kind: PollKind) -> NotifyReport;
}

/// Shared client for the HTTP collaborators.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, CollaboratorError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tempo-scheduler/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(CollaboratorError::Client)
}
