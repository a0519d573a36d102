//! OpenAI-compatible text generation: chat completions and the assistant thread/run protocol.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, LlmMode};
use crate::constants::HTTP_TIMEOUT_SECS;
use crate::error::AppError;
use crate::helpers::truncate;
use crate::prompt::build_classification_prompt;
use crate::traits::LlmApi;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    status: String,
}

pub(crate) struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    mode: LlmMode,
    assistant_name: String,
    assistant_id: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
}

impl OpenAiClient {
    /// `assistant_name` is passed separately so testing mode can target its own assistant.
    pub(crate) fn new(config: &LlmConfig, api_key: String, assistant_name: String) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Llm(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            mode: config.mode,
            assistant_name,
            assistant_id: config.assistant_id.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_polls: config.max_polls,
        })
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>, beta: bool) -> Result<Value, AppError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.request(method, &url).bearer_auth(&self.api_key);
        if beta {
            req = req.header("OpenAI-Beta", "assistants=v2");
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("request to {path} failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!("{path} returned {status}: {}", truncate(&text, 200))));
        }
        resp.json()
            .await
            .map_err(|e| AppError::Llm(format!("malformed response from {path}: {e}")))
    }

    async fn chat(&self, prompt: &str) -> Result<String, AppError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let value = self.request(Method::POST, "/chat/completions", Some(body), false).await?;
        let parsed: ChatResponse =
            serde_json::from_value(value).map_err(|e| AppError::Llm(format!("unexpected completion shape: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| flatten(&c))
            .unwrap_or_default();
        if content.is_empty() {
            return Err(AppError::Llm("empty completion".into()));
        }
        Ok(content)
    }

    async fn resolve_assistant(&self) -> Result<String, AppError> {
        if let Some(id) = &self.assistant_id {
            return Ok(id.clone());
        }
        let list = self.request(Method::GET, "/assistants?limit=100", None, true).await?;
        list["data"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|a| a["name"].as_str() == Some(self.assistant_name.as_str()))
            .and_then(|a| a["id"].as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::Llm(format!("assistant named {:?} not found", self.assistant_name)))
    }

    async fn run_assistant(&self, prompt: &str) -> Result<String, AppError> {
        let assistant_id = self.resolve_assistant().await?;

        let thread: IdObject = parse(self.request(Method::POST, "/threads", Some(json!({})), true).await?)?;
        self.request(
            Method::POST,
            &format!("/threads/{}/messages", thread.id),
            Some(json!({"role": "user", "content": prompt})),
            true,
        )
        .await?;
        let run: IdObject = parse(
            self.request(
                Method::POST,
                &format!("/threads/{}/runs", thread.id),
                Some(json!({"assistant_id": assistant_id})),
                true,
            )
            .await?,
        )?;
        info!(thread = %thread.id, run = %run.id, "Assistant run started");

        self.wait_for_run(&thread.id, &run.id).await?;

        let messages = self
            .request(Method::GET, &format!("/threads/{}/messages?order=desc", thread.id), None, true)
            .await?;
        let text = messages["data"][0]["content"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|c| c["type"] == "text")
            .and_then(|c| c["text"]["value"].as_str())
            .map(flatten)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(AppError::Llm("assistant returned no text".into()));
        }
        Ok(text)
    }

    async fn wait_for_run(&self, thread_id: &str, run_id: &str) -> Result<(), AppError> {
        for poll in 1..=self.max_polls {
            let run: RunObject = parse(
                self.request(Method::GET, &format!("/threads/{thread_id}/runs/{run_id}"), None, true)
                    .await?,
            )?;
            match run.status.as_str() {
                "completed" => return Ok(()),
                "failed" | "cancelled" | "expired" | "incomplete" => {
                    return Err(AppError::Llm(format!("assistant run ended with status {}", run.status)));
                }
                other => debug!(poll, status = other, "Waiting for assistant response"),
            }
            if poll < self.max_polls {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Err(AppError::Llm(format!(
            "assistant run not completed after {} polls",
            self.max_polls
        )))
    }
}

#[async_trait]
impl LlmApi for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        info!(mode = ?self.mode, model = %self.model, "Requesting prediction");
        match self.mode {
            LlmMode::Chat => self.chat(prompt).await,
            LlmMode::Assistant => self.run_assistant(prompt).await,
        }
    }

    async fn classify(&self, text: &str, threshold: u8) -> Result<bool, AppError> {
        let answer = self.chat(&build_classification_prompt(text, threshold)).await?;
        Ok(parse_verdict(&answer))
    }
}

fn parse<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|e| AppError::Llm(format!("unexpected response shape: {e}")))
}

/// Collapse line breaks into single spaces and trim.
fn flatten(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Anything other than a plain "true" counts as no.
pub(crate) fn parse_verdict(answer: &str) -> bool {
    let word = answer
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_ascii_lowercase();
    match word.as_str() {
        "true" => true,
        "false" => false,
        _ => {
            warn!(answer = %truncate(answer, 80), "Unexpected classification answer, treating as false");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String, mode: LlmMode) -> LlmConfig {
        LlmConfig {
            mode,
            base_url,
            poll_interval_secs: 0,
            max_polls: 3,
            ..LlmConfig::default()
        }
    }

    fn client(server: &MockServer, mode: LlmMode) -> OpenAiClient {
        OpenAiClient::new(&config(server.uri(), mode), "sk-test".into(), "Blizzard".into()).unwrap()
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn test_chat_complete_returns_flattened_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4"})))
            .respond_with(completion("  85% chance of a snow day.\nHeavy snow overnight.  "))
            .mount(&server)
            .await;

        let text = client(&server, LlmMode::Chat).complete("prompt").await.unwrap();
        assert_eq!(text, "85% chance of a snow day. Heavy snow overnight.");
    }

    #[tokio::test]
    async fn test_empty_completion_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion("   "))
            .mount(&server)
            .await;

        let err = client(&server, LlmMode::Chat).complete("prompt").await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[tokio::test]
    async fn test_no_choices_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        assert!(client(&server, LlmMode::Chat).complete("prompt").await.is_err());
    }

    #[tokio::test]
    async fn test_provider_error_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server, LlmMode::Chat).complete("prompt").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_classify_true_and_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("True"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(completion("False."))
            .mount(&server)
            .await;

        let llm = client(&server, LlmMode::Chat);
        assert!(llm.classify("85% chance", 50).await.unwrap());
        assert!(!llm.classify("10% chance", 50).await.unwrap());
    }

    #[test]
    fn test_parse_verdict() {
        assert!(parse_verdict("True"));
        assert!(parse_verdict(" true. "));
        assert!(parse_verdict("\"TRUE\""));
        assert!(!parse_verdict("False"));
        assert!(!parse_verdict("Probably"));
        assert!(!parse_verdict(""));
    }

    #[test]
    fn test_flatten() {
        assert_eq!(flatten("a\n\n b \nc"), "a b c");
        assert_eq!(flatten("  single  "), "single");
    }

    async fn mount_assistant_setup(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/assistants"))
            .and(header("OpenAI-Beta", "assistants=v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": "asst_other", "name": "Blizzard_Testing"},
                    {"id": "asst_123", "name": "Blizzard"}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_1"})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_1"})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/runs"))
            .and(body_partial_json(json!({"assistant_id": "asst_123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})))
            .mount(server)
            .await;
    }

    fn run_status(status: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": status}))
    }

    #[tokio::test]
    async fn test_assistant_run_polls_until_completed() {
        let server = MockServer::start().await;
        mount_assistant_setup(&server).await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(run_status("in_progress"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(run_status("completed"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "role": "assistant",
                    "content": [
                        {"type": "image_file", "image_file": {"file_id": "f"}},
                        {"type": "text", "text": {"value": "90% chance.\nStay home!"}}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let text = client(&server, LlmMode::Assistant).complete("prompt").await.unwrap();
        assert_eq!(text, "90% chance. Stay home!");
    }

    #[tokio::test]
    async fn test_assistant_failed_run_is_llm_error() {
        let server = MockServer::start().await;
        mount_assistant_setup(&server).await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(run_status("failed"))
            .mount(&server)
            .await;

        let err = client(&server, LlmMode::Assistant).complete("prompt").await.unwrap_err();
        assert!(err.to_string().contains("failed"));
    }

    #[tokio::test]
    async fn test_assistant_poll_limit_is_llm_error() {
        let server = MockServer::start().await;
        mount_assistant_setup(&server).await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_1/runs/run_1"))
            .respond_with(run_status("in_progress"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, LlmMode::Assistant).complete("prompt").await.unwrap_err();
        assert!(err.to_string().contains("after 3 polls"));
    }

    #[tokio::test]
    async fn test_unknown_assistant_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assistants"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let err = client(&server, LlmMode::Assistant).complete("prompt").await.unwrap_err();
        assert!(err.to_string().contains("Blizzard"));
    }
}
