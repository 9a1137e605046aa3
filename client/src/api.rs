//! REST refetch for invalidated collections.
//!
//! SYSTEM CONTEXT
//! ==============
//! Mutation events never carry enough to rebuild local state — they only mark
//! a collection stale. This client rereads the authoritative sequence from
//! the CRUD service, and the results re-hydrate the sync engine.

use reorder::OrderedItem;
use serde::Deserialize;
use uuid::Uuid;

// =============================================================================
// DTOS
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ListDto {
    pub id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub position: i64,
}

impl ListDto {
    #[must_use]
    pub fn as_ordered(&self) -> OrderedItem {
        OrderedItem::new(self.id, self.position)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardDto {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub position: i64,
}

impl CardDto {
    #[must_use]
    pub fn as_ordered(&self) -> OrderedItem {
        OrderedItem::new(self.id, self.position)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// Authoritative list sequence of a board.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or a non-success status.
    pub async fn board_lists(&self, board_id: Uuid) -> Result<Vec<ListDto>, ApiError> {
        let response = self
            .http
            .get(format!("{}/api/boards/{board_id}/lists", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Authoritative card sequence of a list.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or a non-success status.
    pub async fn list_cards(&self, list_id: Uuid) -> Result<Vec<CardDto>, ApiError> {
        let response = self
            .http
            .get(format!("{}/api/lists/{list_id}/cards", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtos_deserialize_and_project_order() {
        let list_id = Uuid::new_v4();
        let board_id = Uuid::new_v4();
        let json = format!(
            r#"{{"id":"{list_id}","board_id":"{board_id}","title":"Backlog","position":3}}"#
        );
        let dto: ListDto = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(dto.as_ordered(), OrderedItem::new(list_id, 3));

        let card_id = Uuid::new_v4();
        let json = format!(
            r#"{{"id":"{card_id}","list_id":"{list_id}","title":"Ship","position":0}}"#
        );
        let dto: CardDto = serde_json::from_str(&json).expect("deserialize");
        assert!(dto.description.is_none());
        assert_eq!(dto.as_ordered(), OrderedItem::new(card_id, 0));
    }
}
