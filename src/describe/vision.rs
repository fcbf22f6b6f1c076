//! Chat-completions vision client (Azure OpenAI deployment URL layout).

use super::{DescribeError, Describer};
use crate::config::Vision;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub struct VisionClient {
    client: Client,
    url: String,
    api_key: String,
    system_prompt: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub fn chat_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

fn image_data_url(path: &Path) -> Result<String, DescribeError> {
    let bytes = std::fs::read(path).map_err(|source| DescribeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
}

impl VisionClient {
    pub fn from_config(cfg: &Vision) -> Result<Self, DescribeError> {
        if cfg.endpoint.trim().is_empty() || cfg.deployment.trim().is_empty() {
            return Err(DescribeError::NotConfigured(
                "vision.endpoint and vision.deployment are required".into(),
            ));
        }
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| DescribeError::NotConfigured(format!("{} not set", cfg.api_key_env)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .build()
            .map_err(|e| DescribeError::Http(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: chat_url(&cfg.endpoint, &cfg.deployment, &cfg.api_version),
            api_key,
            system_prompt: cfg.system_prompt.clone(),
            max_tokens: cfg.max_tokens,
        })
    }

    fn request(&self, prompt: &str, images: &[&Path]) -> Result<ChatRequest, DescribeError> {
        let mut parts = Vec::with_capacity(images.len() + 1);
        parts.push(Part::Text {
            text: prompt.to_string(),
        });
        for image in images {
            parts.push(Part::ImageUrl {
                image_url: ImageUrl {
                    url: image_data_url(image)?,
                },
            });
        }
        Ok(ChatRequest {
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(self.system_prompt.clone()),
                },
                Message {
                    role: "user",
                    content: MessageContent::Parts(parts),
                },
            ],
            max_tokens: self.max_tokens,
        })
    }
}

impl Describer for VisionClient {
    fn describe(&self, prompt: &str, images: &[&Path]) -> Result<String, DescribeError> {
        let body = self.request(prompt, images)?;
        debug!("vision request: {} image(s) to {}", images.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    DescribeError::Timeout
                } else {
                    DescribeError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DescribeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| DescribeError::Http(format!("response parse error: {e}")))?;

        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(DescribeError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "vision"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> VisionClient {
        VisionClient {
            client: Client::new(),
            url: chat_url("https://example.test/", "gpt-4o", "2024-02-15-preview"),
            api_key: "test-key".into(),
            system_prompt: "You describe scenes.".into(),
            max_tokens: 300,
        }
    }

    #[test]
    fn url_layout() {
        assert_eq!(
            client().url,
            "https://example.test/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn request_attaches_images_after_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("scene_001_beginning.png");
        let b = dir.path().join("scene_001_end.png");
        std::fs::write(&a, b"png-a").unwrap();
        std::fs::write(&b, b"png-b").unwrap();

        let req = client().request("describe", &[a.as_path(), b.as_path()]).unwrap();
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "You describe scenes.");
        let parts = json["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        let url = parts[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn missing_frame_is_io_error() {
        let err = client()
            .request("describe", &[Path::new("/nonexistent/frame.png")])
            .err()
            .unwrap();
        assert!(matches!(err, DescribeError::Io { .. }));
    }

    #[test]
    fn unconfigured_endpoint_is_rejected() {
        let cfg = Vision::default();
        assert!(matches!(
            VisionClient::from_config(&cfg),
            Err(DescribeError::NotConfigured(_))
        ));
    }
}
