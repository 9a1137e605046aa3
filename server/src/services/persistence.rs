//! Persistence adapter — transactional order writes.
//!
//! DESIGN
//! ======
//! The ordering service talks to storage only through [`BoardStore`], injected
//! as `Arc<dyn BoardStore>` so tests swap in mocks. `reorder` is the write
//! boundary: one all-or-nothing transaction per container. If any row of a
//! batch no longer exists, the whole transaction rolls back and no order value
//! is observably changed — a half-applied reorder would immediately break the
//! uniqueness invariant.
//!
//! ERROR HANDLING
//! ==============
//! Failures split into transient (connection-level, worth one retry) and
//! permanent (the data itself disagrees, e.g. a card deleted mid-drag). The
//! caller maps them onto the `PERSIST_TRANSIENT` / `PERSIST_PERMANENT` wire
//! codes.

use async_trait::async_trait;
use protocol::RejectCode;
use reorder::{ItemPosition, OrderedItem};
use sqlx::PgPool;
use uuid::Uuid;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("transient storage failure: {0}")]
    Transient(#[source] sqlx::Error),
    #[error("storage failure: {0}")]
    Permanent(#[source] sqlx::Error),
    #[error("item no longer exists: {0}")]
    Missing(Uuid),
}

impl PersistError {
    /// Classify a driver error. Connection-level failures are retryable;
    /// anything the database itself rejected is not.
    #[must_use]
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Transient(e),
            _ => Self::Permanent(e),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    #[must_use]
    pub fn code(&self) -> RejectCode {
        if self.is_transient() {
            RejectCode::PersistTransient
        } else {
            RejectCode::PersistPermanent
        }
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Which orderable collection a reorder targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderScope {
    /// Lists of a board, ordered by `lists.position`.
    Lists { board_id: Uuid },
    /// Cards of a list, ordered by `cards.position`.
    Cards { list_id: Uuid },
}

/// Storage boundary consumed by the sync engine.
#[async_trait]
pub trait BoardStore: Send + Sync {
    /// Whether the board exists (join validation).
    async fn board_exists(&self, board_id: Uuid) -> Result<bool, PersistError>;

    /// Current lists of a board, ascending by position.
    async fn lists_in_board(&self, board_id: Uuid) -> Result<Vec<OrderedItem>, PersistError>;

    /// Current cards of a list, ascending by position.
    async fn cards_in_list(&self, list_id: Uuid) -> Result<Vec<OrderedItem>, PersistError>;

    /// Apply one container's new order values as a single transaction. For
    /// card scopes the update also re-homes each card to the scope's list,
    /// which is how a cross-container move lands in its destination.
    async fn reorder(&self, scope: ReorderScope, items: &[ItemPosition]) -> Result<(), PersistError>;
}

// =============================================================================
// POSTGRES IMPLEMENTATION
// =============================================================================

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BoardStore for PgStore {
    async fn board_exists(&self, board_id: Uuid) -> Result<bool, PersistError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM boards WHERE id = $1)")
            .bind(board_id)
            .fetch_one(&self.pool)
            .await
            .map_err(PersistError::from_sqlx)
    }

    async fn lists_in_board(&self, board_id: Uuid) -> Result<Vec<OrderedItem>, PersistError> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT id, position FROM lists WHERE board_id = $1 ORDER BY position ASC",
        )
        .bind(board_id)
        .fetch_all(&self.pool)
        .await
        .map_err(PersistError::from_sqlx)?;

        Ok(rows.into_iter().map(|(id, order)| OrderedItem::new(id, order)).collect())
    }

    async fn cards_in_list(&self, list_id: Uuid) -> Result<Vec<OrderedItem>, PersistError> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT id, position FROM cards WHERE list_id = $1 ORDER BY position ASC",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await
        .map_err(PersistError::from_sqlx)?;

        Ok(rows.into_iter().map(|(id, order)| OrderedItem::new(id, order)).collect())
    }

    async fn reorder(&self, scope: ReorderScope, items: &[ItemPosition]) -> Result<(), PersistError> {
        let mut tx = self.pool.begin().await.map_err(PersistError::from_sqlx)?;

        for item in items {
            let result = match scope {
                ReorderScope::Lists { board_id } => {
                    sqlx::query("UPDATE lists SET position = $1 WHERE id = $2 AND board_id = $3")
                        .bind(item.order)
                        .bind(item.id)
                        .bind(board_id)
                        .execute(tx.as_mut())
                        .await
                }
                ReorderScope::Cards { list_id } => {
                    sqlx::query("UPDATE cards SET list_id = $1, position = $2 WHERE id = $3")
                        .bind(list_id)
                        .bind(item.order)
                        .bind(item.id)
                        .execute(tx.as_mut())
                        .await
                }
            };

            let result = result.map_err(PersistError::from_sqlx)?;
            if result.rows_affected() == 0 {
                // Dropping the transaction rolls everything back.
                return Err(PersistError::Missing(item.id));
            }
        }

        tx.commit().await.map_err(PersistError::from_sqlx)
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
