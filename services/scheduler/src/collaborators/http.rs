//! HTTP clients for the collaborator services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    CollaboratorError, ContentGenerator, Notifier, NotifyReport, PollDraft, Signal, SignalSource,
};
use crate::polls::{Poll, PollKind};

async fn read_json<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, CollaboratorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CollaboratorError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|source| CollaboratorError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
}

/// `GET {url}?categories=a,b&limit=n` returning `{"signals": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpSignalSource {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SignalsResponse {
    signals: Vec<Signal>,
}

impl HttpSignalSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SignalSource for HttpSignalSource {
    async fn fetch_trending(
        &self,
        categories: &[String],
        limit: usize,
    ) -> Result<Vec<Signal>, CollaboratorError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("categories", categories.join(",")),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|source| CollaboratorError::Transport {
                endpoint: self.url.clone(),
                source,
            })?;

        let body: SignalsResponse = read_json(&self.url, response).await?;
        debug!(count = body.signals.len(), "Fetched trending signals");
        Ok(body.signals)
    }
}

/// `POST {url}` with `{"signals", "avoid_categories"}` returning `{"drafts": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpContentGenerator {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    signals: &'a [Signal],
    avoid_categories: &'a [String],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    drafts: Vec<PollDraft>,
}

impl HttpContentGenerator {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(
        &self,
        signals: &[Signal],
        avoid_categories: &[String],
    ) -> Result<Vec<PollDraft>, CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest {
                signals,
                avoid_categories,
            })
            .send()
            .await
            .map_err(|source| CollaboratorError::Transport {
                endpoint: self.url.clone(),
                source,
            })?;

        let body: GenerateResponse = read_json(&self.url, response).await?;
        Ok(body.drafts)
    }
}

/// Posts a JSON announcement per opened poll to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct Announcement<'a> {
    event: &'static str,
    kind: PollKind,
    poll: &'a Poll,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, poll: &Poll, kind: PollKind) -> NotifyReport {
        let sent = self
            .client
            .post(&self.url)
            .json(&Announcement {
                event: "poll_opened",
                kind,
                poll,
            })
            .send()
            .await;

        match sent {
            Ok(response) if response.status().is_success() => NotifyReport {
                sent: 1,
                ..Default::default()
            },
            Ok(response) => {
                let status = response.status();
                warn!(poll_id = %poll.id, status = %status, "Webhook rejected announcement");
                NotifyReport {
                    errors: vec![format!("webhook returned {status}")],
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!(poll_id = %poll.id, error = %e, "Webhook delivery failed");
                NotifyReport {
                    errors: vec![e.to_string()],
                    ..Default::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::http_client;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        http_client(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_signal_source_sends_categories_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trending"))
            .and(query_param("categories", "science,sports"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signals": [
                    {"title": "Comet visible tonight", "category": "science", "score": 0.9}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpSignalSource::new(client(), format!("{}/trending", server.uri()));
        let signals = source
            .fetch_trending(&["science".to_string(), "sports".to_string()], 5)
            .await
            .unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].title, "Comet visible tonight");
        assert_eq!(signals[0].summary, "");
    }

    #[tokio::test]
    async fn test_signal_source_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let source = HttpSignalSource::new(client(), server.uri());
        let err = source.fetch_trending(&[], 5).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_generator_posts_avoid_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_partial_json(serde_json::json!({
                "avoid_categories": ["sports"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "drafts": [{
                    "category": "science",
                    "question": "Will you watch the comet?",
                    "choices": ["Yes", "No"],
                    "source_title": "Comet visible tonight"
                }]
            })))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(client(), format!("{}/generate", server.uri()));
        let drafts = generator
            .generate(&[], &["sports".to_string()])
            .await
            .unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].choices, vec!["Yes", "No"]);
    }

    #[tokio::test]
    async fn test_generator_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let generator = HttpContentGenerator::new(client(), server.uri());
        let err = generator.generate(&[], &[]).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Decode { .. }));
    }
}
