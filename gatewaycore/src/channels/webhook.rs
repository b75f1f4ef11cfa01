//! `webhook` channel: POSTs (or other configured method) generated text to a
//! configured URL (spec §6).

use async_trait::async_trait;

use super::{Channel, ChannelError};

#[derive(Default)]
pub struct WebhookChannel {
    client: reqwest::Client,
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send_text(
        &self,
        target: &serde_json::Value,
        config: &serde_json::Map<String, serde_json::Value>,
        text: &str,
    ) -> Result<(), ChannelError> {
        let enabled = config.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true);
        if !enabled {
            return Err(ChannelError::Misconfigured("webhook channel disabled".to_string()));
        }

        let url = target
            .as_str()
            .map(str::to_string)
            .or_else(|| config.get("url").and_then(|v| v.as_str()).map(str::to_string))
            .ok_or_else(|| ChannelError::Misconfigured("webhook missing url".to_string()))?;

        let method = config
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("POST")
            .to_uppercase();
        let timeout_seconds = config.get("timeout_seconds").and_then(|v| v.as_u64()).unwrap_or(10);

        let mut request = self
            .client
            .request(
                method.parse().unwrap_or(reqwest::Method::POST),
                &url,
            )
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .json(&serde_json::json!({ "text": text }));

        if let Some(headers) = config.get("headers").and_then(|v| v.as_object()) {
            for (k, v) in headers {
                if let Some(v) = v.as_str() {
                    request = request.header(k.as_str(), v);
                }
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChannelError::SendFailed(format!("status {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_text_to_configured_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let channel = WebhookChannel::default();
        let mut config = serde_json::Map::new();
        config.insert("url".to_string(), serde_json::json!(format!("{}/hook", server.uri())));

        channel
            .send_text(&serde_json::Value::Null, &config, "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_url_is_misconfigured() {
        let channel = WebhookChannel::default();
        let config = serde_json::Map::new();
        let err = channel
            .send_text(&serde_json::Value::Null, &config, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Misconfigured(_)));
    }
}
