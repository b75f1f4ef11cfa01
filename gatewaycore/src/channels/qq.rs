//! `qq` channel: sends messages through the QQ bot API, caching the access
//! token per `(app_id, secret, token_url)` until `expires_at - 5min` and
//! maintaining a monotonically incrementing `msg_seq` per `(target, msg_id)`
//! key with a 1000-entry eviction bound (spec §6).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{Channel, ChannelError};

const MSG_SEQ_EVICTION_BOUND: usize = 1000;

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

pub struct QqChannel {
    client: reqwest::Client,
    token_cache: Mutex<HashMap<(String, String, String), CachedToken>>,
    msg_seq: Mutex<HashMap<(String, String), u64>>,
}

impl Default for QqChannel {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            token_cache: Mutex::new(HashMap::new()),
            msg_seq: Mutex::new(HashMap::new()),
        }
    }
}

impl QqChannel {
    async fn access_token(
        &self,
        app_id: &str,
        client_secret: &str,
        token_url: &str,
        timeout_seconds: u64,
    ) -> Result<String, ChannelError> {
        let key = (app_id.to_string(), client_secret.to_string(), token_url.to_string());
        {
            let cache = self.token_cache.lock().await;
            if let Some(cached) = cache.get(&key) {
                if cached.expires_at > Utc::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let response = self
            .client
            .post(token_url)
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .json(&serde_json::json!({ "appId": app_id, "clientSecret": client_secret }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("token request: {e}")))?;

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("token response: {e}")))?;

        let expires_at = Utc::now() + chrono::Duration::seconds(parsed.expires_in) - chrono::Duration::minutes(5);
        let mut cache = self.token_cache.lock().await;
        cache.insert(
            key,
            CachedToken {
                access_token: parsed.access_token.clone(),
                expires_at,
            },
        );
        Ok(parsed.access_token)
    }

    /// Next `msg_seq` for `(target, msg_id)`, evicting the oldest entry when the
    /// cache would otherwise exceed [`MSG_SEQ_EVICTION_BOUND`].
    async fn next_msg_seq(&self, target: &str, msg_id: &str) -> u64 {
        let key = (target.to_string(), msg_id.to_string());
        let mut seqs = self.msg_seq.lock().await;
        if !seqs.contains_key(&key) && seqs.len() >= MSG_SEQ_EVICTION_BOUND {
            if let Some(oldest) = seqs.keys().next().cloned() {
                seqs.remove(&oldest);
            }
        }
        let entry = seqs.entry(key).or_insert(0);
        *entry += 1;
        *entry
    }
}

#[async_trait]
impl Channel for QqChannel {
    fn name(&self) -> &str {
        "qq"
    }

    async fn send_text(
        &self,
        target: &serde_json::Value,
        config: &serde_json::Map<String, serde_json::Value>,
        text: &str,
    ) -> Result<(), ChannelError> {
        let enabled = config.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true);
        if !enabled {
            return Err(ChannelError::Misconfigured("qq channel disabled".to_string()));
        }

        let app_id = config
            .get("app_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::Misconfigured("qq missing app_id".to_string()))?;
        let client_secret = config
            .get("client_secret")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::Misconfigured("qq missing client_secret".to_string()))?;
        let token_url = config
            .get("token_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::Misconfigured("qq missing token_url".to_string()))?;
        let api_base = config
            .get("api_base")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::Misconfigured("qq missing api_base".to_string()))?;
        let target_type = config.get("target_type").and_then(|v| v.as_str()).unwrap_or("c2c");
        let timeout_seconds = config.get("timeout_seconds").and_then(|v| v.as_u64()).unwrap_or(10);

        let target_id = target
            .as_str()
            .map(str::to_string)
            .or_else(|| config.get("target_id").and_then(|v| v.as_str()).map(str::to_string))
            .ok_or_else(|| ChannelError::Misconfigured("qq missing target_id".to_string()))?;

        let token = self.access_token(app_id, client_secret, token_url, timeout_seconds).await?;
        let msg_id = format!("{target_type}:{target_id}");
        let msg_seq = self.next_msg_seq(&target_id, &msg_id).await;

        let send_url = format!("{}/v2/{}/messages", api_base.trim_end_matches('/'), target_type);
        let response = self
            .client
            .post(&send_url)
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "content": text,
                "msg_type": 0,
                "msg_id": msg_id,
                "msg_seq": msg_seq,
            }))
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

    #[tokio::test]
    async fn msg_seq_increments_per_target_and_msg_id() {
        let channel = QqChannel::default();
        let first = channel.next_msg_seq("group-1", "msg-a").await;
        let second = channel.next_msg_seq("group-1", "msg-a").await;
        let other = channel.next_msg_seq("group-1", "msg-b").await;
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(other, 1);
    }

    #[tokio::test]
    async fn msg_seq_cache_is_bounded() {
        let channel = QqChannel::default();
        for i in 0..(MSG_SEQ_EVICTION_BOUND + 10) {
            channel.next_msg_seq("group-1", &format!("msg-{i}")).await;
        }
        let seqs = channel.msg_seq.lock().await;
        assert!(seqs.len() <= MSG_SEQ_EVICTION_BOUND);
    }

    #[tokio::test]
    async fn missing_config_is_misconfigured() {
        let channel = QqChannel::default();
        let config = serde_json::Map::new();
        let err = channel
            .send_text(&serde_json::Value::Null, &config, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Misconfigured(_)));
    }
}
