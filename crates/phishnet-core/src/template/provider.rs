//! Lure template provider
//!
//! The drafting service is an external collaborator behind a trait; any
//! failure there falls back to a fixed deterministic template.

use async_trait::async_trait;
use phishnet_common::config::TemplateConfig;
use phishnet_common::types::TemplateTone;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// A drafted lure template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LureTemplate {
    pub subject: String,
    pub body: String,
}

/// Template provider failure. The caller substitutes the fallback template
/// in every case; the variants exist for logging.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template service request failed: {0}")]
    Request(String),

    #[error("Template service timed out")]
    Timeout,

    #[error("Template service returned malformed content: {0}")]
    Malformed(String),
}

/// Boundary to the drafting collaborator
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    /// Draft a subject and body for the given scenario and tone
    async fn generate(&self, context: &str, tone: TemplateTone)
        -> Result<LureTemplate, TemplateError>;
}

/// Chat-completions request payload
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Drafted content as returned by the model; extra fields are ignored
#[derive(Debug, Deserialize)]
struct DraftedTemplate {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
}

/// HTTP template provider against an OpenAI-compatible chat endpoint
pub struct AiTemplateProvider {
    config: TemplateConfig,
    client: Client,
}

impl AiTemplateProvider {
    /// Create a new provider
    pub fn new(config: TemplateConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    fn prompt(context: &str, tone: TemplateTone) -> String {
        format!(
            "You are an expert at creating phishing simulation email templates for \
             security awareness training. Respond ONLY with a valid JSON object, no \
             explanations or extra text. Format: {{\"subject\": \"string\", \"body\": \
             \"string\"}}. Generate a {tone} tone phishing email template for the \
             following scenario: {context}. The email should be professional, \
             convincing, and include a compelling subject line, a greeting, a clear \
             call to action (use a markdown link in the form [click here](URL), do \
             NOT use a raw URL), a sense of urgency, and a professional signature."
        )
    }
}

#[async_trait]
impl TemplateProvider for AiTemplateProvider {
    async fn generate(
        &self,
        context: &str,
        tone: TemplateTone,
    ) -> Result<LureTemplate, TemplateError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are an expert at creating convincing but ethical \
                              phishing email templates for security awareness training. \
                              Always respond with valid JSON."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::prompt(context, tone),
                },
            ],
            temperature: 0.7,
            max_tokens: 1000,
            response_format: ResponseFormat { kind: "json_object" },
        };

        debug!(endpoint = %self.config.endpoint, "Requesting lure template");

        let mut http = self.client.post(&self.config.endpoint).json(&request);
        if let Some(ref key) = self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                TemplateError::Timeout
            } else {
                TemplateError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Template service returned an error");
            return Err(TemplateError::Request(format!(
                "status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| TemplateError::Malformed(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| TemplateError::Malformed("empty choices".to_string()))?;

        let drafted: DraftedTemplate = serde_json::from_str(content)
            .map_err(|e| TemplateError::Malformed(e.to_string()))?;

        if drafted.subject.is_empty() || drafted.body.is_empty() {
            return Err(TemplateError::Malformed(
                "missing subject or body".to_string(),
            ));
        }

        Ok(LureTemplate {
            subject: drafted.subject,
            body: drafted.body,
        })
    }
}

/// Fixed deterministic template substituted whenever the drafting
/// collaborator fails. The markdown link target is rewritten to the
/// per-target tracking URL at dispatch time.
pub fn fallback_template(context: &str, tone: TemplateTone, portal_url: &str) -> LureTemplate {
    let scenario = if context.trim().is_empty() {
        "Action Required"
    } else {
        context.trim()
    };

    let prefix = match tone {
        TemplateTone::Urgent => "URGENT",
        TemplateTone::Alert => "Security Alert",
        TemplateTone::Corporate => "Action Required",
        TemplateTone::Reward => "Congratulations",
    };

    LureTemplate {
        subject: format!("{}: {}", prefix, scenario),
        body: format!(
            "Dear User,\n\n\
             We have detected unusual activity on your account that requires \
             immediate attention. To ensure the security of your account, please \
             verify your credentials by [clicking here]({portal_url}).\n\n\
             This is a time-sensitive matter. Please take action within the next \
             24 hours to avoid any service interruptions.\n\n\
             Best regards,\nIT Security Team"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server_uri: &str) -> AiTemplateProvider {
        AiTemplateProvider::new(TemplateConfig {
            endpoint: format!("{}/v1/chat/completions", server_uri),
            api_key: Some("test-key".to_string()),
            model: "test-model".to_string(),
            timeout_secs: 2,
        })
    }

    #[test]
    fn test_fallback_is_deterministic_and_linked() {
        let a = fallback_template("Password Expiry", TemplateTone::Urgent, "https://x/portal");
        let b = fallback_template("Password Expiry", TemplateTone::Urgent, "https://x/portal");
        assert_eq!(a.subject, b.subject);
        assert_eq!(a.body, b.body);
        assert_eq!(a.subject, "URGENT: Password Expiry");
        assert!(a.body.contains("[clicking here](https://x/portal)"));
    }

    #[test]
    fn test_fallback_empty_context() {
        let t = fallback_template("  ", TemplateTone::Alert, "https://x/portal");
        assert_eq!(t.subject, "Security Alert: Action Required");
    }

    #[tokio::test]
    async fn test_generate_parses_drafted_json() {
        let server = MockServer::start().await;
        let content =
            r#"{"subject":"Payroll update required","body":"Hello, please [click here](https://p) now.","signature":"HR"}"#;
        let reply = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;

        let template = provider_for(&server.uri())
            .generate("payroll", TemplateTone::Corporate)
            .await
            .unwrap();

        assert_eq!(template.subject, "Payroll update required");
        assert!(template.body.contains("[click here]"));
    }

    #[tokio::test]
    async fn test_generate_rejects_missing_fields() {
        let server = MockServer::start().await;
        let reply = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"subject\":\"x\"}"}}]
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;

        let result = provider_for(&server.uri())
            .generate("payroll", TemplateTone::Urgent)
            .await;

        assert!(matches!(result, Err(TemplateError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_generate_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = provider_for(&server.uri())
            .generate("payroll", TemplateTone::Urgent)
            .await;

        assert!(matches!(result, Err(TemplateError::Request(_))));
    }
}
