//! Retro board columns and items.
//!
//! DESIGN
//! ======
//! Columns and items are kept in insertion-ordered maps so a saved board
//! reloads in the order it was written. Display order of columns comes from
//! their `order` field, not map position.
//!
//! Ownership is by display name: only a participant whose current name
//! equals an item's `author_name` may edit or delete it. The author name is
//! fixed at creation.

use frames::{ColumnView, ItemView, MAX_ITEM_CHARS};
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::services::identity::is_same_identity;
use crate::services::now_ms;

const DEFAULT_COLUMNS: [(&str, &str); 3] = [
    ("went-well", "What went well"),
    ("improve", "What could improve"),
    ("actions", "Action items"),
];

const ITEM_ID_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("item belongs to another participant")]
    NotOwner,
    #[error("item content is empty")]
    EmptyContent,
    #[error("item content exceeds {MAX_ITEM_CHARS} characters")]
    ContentTooLong,
}

impl crate::services::ErrorCode for BoardError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "E_COLUMN_NOT_FOUND",
            Self::ItemNotFound(_) => "E_ITEM_NOT_FOUND",
            Self::NotOwner => "E_NOT_OWNER",
            Self::EmptyContent | Self::ContentTooLong => "E_INVALID_CONTENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub content: String,
    pub author_name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub title: String,
    pub order: u32,
    #[serde(default)]
    pub items: IndexMap<String, Item>,
}

/// Durable form of a board, one JSON document per room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    pub room_id: String,
    pub columns: IndexMap<String, Column>,
    pub saved_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    columns: IndexMap<String, Column>,
}

// =============================================================================
// BOARD
// =============================================================================

impl Board {
    #[must_use]
    pub fn with_default_columns() -> Self {
        let columns = DEFAULT_COLUMNS
            .iter()
            .zip(0u32..)
            .map(|((id, title), order)| {
                let column =
                    Column { id: (*id).to_owned(), title: (*title).to_owned(), order, items: IndexMap::new() };
                ((*id).to_owned(), column)
            })
            .collect();
        Self { columns }
    }

    /// Rebuild a board from a stored snapshot. A snapshot without columns
    /// yields the default layout.
    #[must_use]
    pub fn from_stored(stored: StoredSnapshot) -> Self {
        if stored.columns.is_empty() {
            return Self::with_default_columns();
        }
        Self { columns: stored.columns }
    }

    #[must_use]
    pub fn to_stored(&self, room_id: &str) -> StoredSnapshot {
        StoredSnapshot { room_id: room_id.to_owned(), columns: self.columns.clone(), saved_at: now_ms() }
    }

    #[cfg(test)]
    #[must_use]
    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.get(column_id)
    }

    /// Add an item authored by `author_name`, returning its id.
    ///
    /// # Errors
    ///
    /// Fails on an unknown column or invalid content.
    pub fn add_item(&mut self, column_id: &str, content: &str, author_name: &str) -> Result<String, BoardError> {
        let content = validate_content(content)?;
        let column = self
            .columns
            .get_mut(column_id)
            .ok_or_else(|| BoardError::ColumnNotFound(column_id.to_owned()))?;
        let now = now_ms();
        let id = generate_item_id(now);
        let item = Item { id: id.clone(), content, author_name: author_name.to_owned(), created_at: now };
        column.items.insert(id.clone(), item);
        Ok(id)
    }

    /// Replace an item's content.
    ///
    /// # Errors
    ///
    /// Fails on an unknown column or item, when `actor_name` is not the
    /// author, or on invalid content.
    pub fn edit_item(
        &mut self,
        column_id: &str,
        item_id: &str,
        content: &str,
        actor_name: &str,
    ) -> Result<(), BoardError> {
        let item = self.owned_item_mut(column_id, item_id, actor_name)?;
        item.content = validate_content(content)?;
        Ok(())
    }

    /// Remove an item, preserving the order of the rest.
    ///
    /// # Errors
    ///
    /// Fails on an unknown column or item, or when `actor_name` is not the
    /// author.
    pub fn delete_item(&mut self, column_id: &str, item_id: &str, actor_name: &str) -> Result<Item, BoardError> {
        self.owned_item_mut(column_id, item_id, actor_name)?;
        self.columns
            .get_mut(column_id)
            .and_then(|column| column.items.shift_remove(item_id))
            .ok_or_else(|| BoardError::ItemNotFound(item_id.to_owned()))
    }

    /// Columns in display order.
    #[must_use]
    pub fn views(&self) -> Vec<ColumnView> {
        let mut columns: Vec<&Column> = self.columns.values().collect();
        columns.sort_by_key(|column| column.order);
        columns
            .into_iter()
            .map(|column| ColumnView {
                id: column.id.clone(),
                title: column.title.clone(),
                order: column.order,
                items: column
                    .items
                    .values()
                    .map(|item| ItemView {
                        id: item.id.clone(),
                        content: item.content.clone(),
                        author_name: item.author_name.clone(),
                        created_at: item.created_at,
                    })
                    .collect(),
            })
            .collect()
    }

    fn owned_item_mut(&mut self, column_id: &str, item_id: &str, actor_name: &str) -> Result<&mut Item, BoardError> {
        let column = self
            .columns
            .get_mut(column_id)
            .ok_or_else(|| BoardError::ColumnNotFound(column_id.to_owned()))?;
        let item = column
            .items
            .get_mut(item_id)
            .ok_or_else(|| BoardError::ItemNotFound(item_id.to_owned()))?;
        if !is_same_identity(&item.author_name, actor_name) {
            return Err(BoardError::NotOwner);
        }
        Ok(item)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn validate_content(raw: &str) -> Result<String, BoardError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(BoardError::EmptyContent);
    }
    if content.chars().count() > MAX_ITEM_CHARS {
        return Err(BoardError::ContentTooLong);
    }
    Ok(content.to_owned())
}

/// Item id of the form `<ms>-<7 random base36 chars>`.
pub(crate) fn generate_item_id(now_ms: i64) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ITEM_ID_SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect();
    format!("{now_ms}-{suffix}")
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
