//! Chats: `GET/POST /chats`, `GET/DELETE /chats/{id}`, `POST /chats/batch-delete` (spec §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gateway_core::store::{Chat, ChatKey, Document, StoreError};
use gateway_core::{ErrorCode, Role, RuntimeMessage};

use crate::app::AppState;
use crate::response::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListChatsQuery {
    pub user_id: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatView {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Chat> for ChatView {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id.clone(),
            session_id: chat.session_id.clone(),
            user_id: chat.user_id.clone(),
            channel: chat.channel.clone(),
            name: chat.name.clone(),
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: &'static str,
    pub text: String,
}

fn message_view(message: &RuntimeMessage) -> MessageView {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
        Role::System => "system",
    };
    MessageView { role, text: message.text() }
}

#[derive(Debug, Serialize)]
pub struct ChatDetail {
    #[serde(flatten)]
    pub chat: ChatView,
    pub messages: Vec<MessageView>,
}

pub async fn list_chats(State(state): State<Arc<AppState>>, Query(filter): Query<ListChatsQuery>) -> Json<Vec<ChatView>> {
    let chats = state.store.read(|doc| {
        doc.chats
            .values()
            .filter(|c| filter.user_id.as_deref().map(|u| u == c.user_id).unwrap_or(true))
            .filter(|c| filter.channel.as_deref().map(|ch| ch == c.channel).unwrap_or(true))
            .map(ChatView::from)
            .collect::<Vec<_>>()
    });
    Json(chats)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChatBody {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub id: String,
}

pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateChatBody>,
) -> Result<Json<CreateChatResponse>, ApiError> {
    if body.session_id.trim().is_empty() || body.user_id.trim().is_empty() || body.channel.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::InvalidChat,
            "session_id, user_id, and channel are required",
        ));
    }

    let key = ChatKey::new(body.session_id.clone(), body.user_id.clone(), body.channel.clone());
    let id = state
        .store
        .write(|doc: &mut Document| -> Result<String, StoreError> {
            if let Some(existing) = doc.find_chat_id(&key) {
                return Ok(existing);
            }
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now();
            doc.chats.insert(
                id.clone(),
                Chat {
                    id: id.clone(),
                    session_id: body.session_id.clone(),
                    user_id: body.user_id.clone(),
                    channel: body.channel.clone(),
                    name: body.name.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(id)
        })
        .map_err(ApiError::from)?;

    Ok(Json(CreateChatResponse { id }))
}

pub async fn get_chat(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<ChatDetail>, ApiError> {
    state
        .store
        .read(|doc| {
            let chat = doc.chats.get(&id)?;
            let messages = doc
                .histories
                .get(&id)
                .map(|history| history.iter().map(message_view).collect())
                .unwrap_or_default();
            Some(ChatDetail { chat: ChatView::from(chat), messages })
        })
        .map(Json)
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("chat not found: {id}")))
}

pub async fn delete_chat(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let removed = state
        .store
        .write(|doc: &mut Document| -> Result<bool, StoreError> {
            let removed = doc.chats.remove(&id).is_some();
            doc.histories.remove(&id);
            Ok(removed)
        })
        .map_err(ApiError::from)?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(ErrorCode::NotFound, format!("chat not found: {id}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteBody {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteResponse {
    pub deleted: usize,
}

pub async fn batch_delete_chats(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchDeleteBody>,
) -> Result<Json<BatchDeleteResponse>, ApiError> {
    let deleted = state
        .store
        .write(|doc: &mut Document| -> Result<usize, StoreError> {
            let mut deleted = 0;
            for id in &body.ids {
                if doc.chats.remove(id).is_some() {
                    deleted += 1;
                }
                doc.histories.remove(id);
            }
            Ok(deleted)
        })
        .map_err(ApiError::from)?;

    Ok(Json(BatchDeleteResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        crate::app::test_state_in(dir.path())
    }

    #[tokio::test]
    async fn create_chat_rejects_blank_session_id() {
        let state = test_state();
        let body = CreateChatBody {
            session_id: String::new(),
            user_id: "u1".into(),
            channel: "console".into(),
            name: None,
        };
        let err = create_chat(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidChat);
    }

    #[tokio::test]
    async fn create_chat_is_idempotent_on_natural_key() {
        let state = test_state();
        let body = CreateChatBody {
            session_id: "s1".into(),
            user_id: "u1".into(),
            channel: "console".into(),
            name: None,
        };
        let first = create_chat(State(Arc::clone(&state)), Json(body.clone())).await.unwrap();
        let second = create_chat(State(state), Json(body)).await.unwrap();
        assert_eq!(first.0.id, second.0.id);
    }

    #[tokio::test]
    async fn get_missing_chat_is_not_found() {
        let state = test_state();
        let err = get_chat(State(state), Path("missing".to_string())).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
