use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

// ---- Errors ----

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KanbanError {
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Card '{0}' not found")]
    CardNotFound(String),

    #[error("Card id '{0}' appears more than once on the board")]
    DuplicateCard(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

// ---- Board Types ----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Older boards were written without timestamps; those load as "now".
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanBoard {
    pub columns: Vec<Column>,
}

/// Fields supplied by the user when creating a card.
#[derive(Debug, Clone, Default)]
pub struct CardDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
}

/// Partial update; `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct CardPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub tags: Option<BTreeSet<String>>,
}

const EXPORT_VERSION: &str = "1.0";

impl Default for KanbanBoard {
    fn default() -> Self {
        Self::default_board()
    }
}

impl KanbanBoard {
    pub fn default_board() -> Self {
        let column = |id: &str, title: &str, color: &str| Column {
            id: id.to_string(),
            title: title.to_string(),
            color: Some(color.to_string()),
            cards: Vec::new(),
        };
        Self {
            columns: vec![
                column("todo", "To Do", "#ef4444"),
                column("in-progress", "In Progress", "#f59e0b"),
                column("done", "Done", "#10b981"),
            ],
        }
    }

    /// Parse a board and check the one-column-per-card invariant.
    pub fn from_json(content: &str) -> Result<Self, KanbanError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| KanbanError::InvalidFormat(e.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, KanbanError> {
        if !value.get("columns").map_or(false, Value::is_array) {
            return Err(KanbanError::InvalidFormat(
                "missing columns array".to_string(),
            ));
        }
        let board: KanbanBoard = serde_json::from_value(value)
            .map_err(|e| KanbanError::InvalidFormat(e.to_string()))?;
        board.validate()?;
        Ok(board)
    }

    pub fn validate(&self) -> Result<(), KanbanError> {
        let mut seen = HashSet::new();
        for card in self.columns.iter().flat_map(|c| c.cards.iter()) {
            if !seen.insert(card.id.as_str()) {
                return Err(KanbanError::DuplicateCard(card.id.clone()));
            }
        }
        Ok(())
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn find_card(&self, card_id: &str) -> Option<(&Column, &Card)> {
        self.columns.iter().find_map(|column| {
            column
                .cards
                .iter()
                .find(|card| card.id == card_id)
                .map(|card| (column, card))
        })
    }

    fn find_card_mut(&mut self, card_id: &str) -> Option<&mut Card> {
        self.columns
            .iter_mut()
            .flat_map(|c| c.cards.iter_mut())
            .find(|card| card.id == card_id)
    }

    fn next_card_id(&self) -> String {
        let millis = Utc::now().timestamp_millis();
        let mut counter = 0u32;
        loop {
            let id = format!("card-{}-{}", millis, counter);
            if self.find_card(&id).is_none() {
                return id;
            }
            counter += 1;
        }
    }

    pub fn add_card(&mut self, column_id: &str, draft: CardDraft) -> Result<String, KanbanError> {
        let id = self.next_card_id();
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.id == column_id)
            .ok_or_else(|| KanbanError::ColumnNotFound(column_id.to_string()))?;

        let now = Utc::now();
        column.cards.push(Card {
            id: id.clone(),
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            tags: draft.tags,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    pub fn update_card(&mut self, card_id: &str, patch: CardPatch) -> Result<(), KanbanError> {
        let card = self
            .find_card_mut(card_id)
            .ok_or_else(|| KanbanError::CardNotFound(card_id.to_string()))?;

        if let Some(title) = patch.title {
            card.title = title;
        }
        if let Some(description) = patch.description {
            card.description = description;
        }
        if let Some(priority) = patch.priority {
            card.priority = priority;
        }
        if let Some(tags) = patch.tags {
            card.tags = tags;
        }
        card.updated_at = Utc::now();
        Ok(())
    }

    pub fn delete_card(&mut self, card_id: &str) -> Result<Card, KanbanError> {
        for column in &mut self.columns {
            if let Some(idx) = column.cards.iter().position(|c| c.id == card_id) {
                return Ok(column.cards.remove(idx));
            }
        }
        Err(KanbanError::CardNotFound(card_id.to_string()))
    }

    /// Remove the card from its column and append it to `target_column`.
    /// Both ends are checked up front so a failed move leaves the board as it was.
    pub fn move_card(&mut self, card_id: &str, target_column: &str) -> Result<(), KanbanError> {
        let target_idx = self
            .columns
            .iter()
            .position(|c| c.id == target_column)
            .ok_or_else(|| KanbanError::ColumnNotFound(target_column.to_string()))?;
        if self.find_card(card_id).is_none() {
            return Err(KanbanError::CardNotFound(card_id.to_string()));
        }

        let mut card = self.delete_card(card_id)?;
        card.updated_at = Utc::now();
        self.columns[target_idx].cards.push(card);
        Ok(())
    }

    pub fn card_count(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }

    /// Pretty JSON with export metadata attached.
    pub fn export(&self) -> Result<String, KanbanError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| KanbanError::InvalidFormat(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "exportedAt".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
            map.insert(
                "version".to_string(),
                Value::String(EXPORT_VERSION.to_string()),
            );
        }
        serde_json::to_string_pretty(&value).map_err(|e| KanbanError::InvalidFormat(e.to_string()))
    }

    /// Replace the board with imported data. On any error `self` is untouched.
    pub fn import(&mut self, json: &str) -> Result<(), KanbanError> {
        let imported = Self::from_json(json)?;
        *self = imported;
        Ok(())
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> CardDraft {
        CardDraft {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_board_columns() {
        let board = KanbanBoard::default_board();
        let ids: Vec<&str> = board.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["todo", "in-progress", "done"]);
        assert_eq!(board.columns[0].color.as_deref(), Some("#ef4444"));
        assert_eq!(board.card_count(), 0);
    }

    #[test]
    fn test_add_and_update_card() {
        let mut board = KanbanBoard::default_board();
        let id = board.add_card("todo", draft("Write docs")).unwrap();
        let (column, card) = board.find_card(&id).unwrap();
        assert_eq!(column.id, "todo");
        assert_eq!(card.priority, Priority::Medium);
        let created = card.created_at;

        board
            .update_card(
                &id,
                CardPatch {
                    title: Some("Write better docs".to_string()),
                    priority: Some(Priority::High),
                    ..Default::default()
                },
            )
            .unwrap();
        let (_, card) = board.find_card(&id).unwrap();
        assert_eq!(card.title, "Write better docs");
        assert_eq!(card.priority, Priority::High);
        assert_eq!(card.created_at, created);
        assert!(card.updated_at >= created);
    }

    #[test]
    fn test_add_card_unknown_column() {
        let mut board = KanbanBoard::default_board();
        let err = board.add_card("nope", draft("x")).unwrap_err();
        assert_eq!(err, KanbanError::ColumnNotFound("nope".to_string()));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut board = KanbanBoard::default_board();
        let a = board.add_card("todo", draft("a")).unwrap();
        let b = board.add_card("todo", draft("b")).unwrap();
        assert_ne!(a, b);
        assert!(board.validate().is_ok());
    }

    #[test]
    fn test_move_card_keeps_single_owner() {
        let mut board = KanbanBoard::default_board();
        let id = board.add_card("todo", draft("Ship it")).unwrap();
        board.move_card(&id, "done").unwrap();

        assert!(board.column("todo").unwrap().cards.is_empty());
        assert_eq!(board.column("done").unwrap().cards[0].id, id);
        assert_eq!(board.card_count(), 1);
        assert!(board.validate().is_ok());
    }

    #[test]
    fn test_move_card_to_missing_column_is_atomic() {
        let mut board = KanbanBoard::default_board();
        let id = board.add_card("todo", draft("Stay")).unwrap();
        let before = board.clone();

        let err = board.move_card(&id, "archive").unwrap_err();
        assert_eq!(err, KanbanError::ColumnNotFound("archive".to_string()));
        assert_eq!(board, before);
    }

    #[test]
    fn test_delete_card() {
        let mut board = KanbanBoard::default_board();
        let id = board.add_card("in-progress", draft("Temp")).unwrap();
        let removed = board.delete_card(&id).unwrap();
        assert_eq!(removed.title, "Temp");
        assert!(board.delete_card(&id).is_err());
    }

    #[test]
    fn test_from_json_accepts_legacy_format() {
        let content = r#"{
  "columns": [
    {
      "id": "todo",
      "title": "To Do",
      "cards": [
        {
          "id": "task-1",
          "title": "Example task",
          "description": "This is an example task.",
          "priority": "medium",
          "tags": ["example"],
          "createdAt": "2025-01-10T12:00:00.000Z",
          "updatedAt": "2025-01-10T12:00:00.000Z"
        }
      ]
    },
    { "id": "doing", "title": "In Progress", "cards": [] }
  ]
}"#;
        let board = KanbanBoard::from_json(content).unwrap();
        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.columns[1].color, None);
        let (_, card) = board.find_card("task-1").unwrap();
        assert!(card.tags.contains("example"));
    }

    #[test]
    fn test_from_json_rejects_duplicate_cards() {
        let content = r#"{"columns":[
            {"id":"a","title":"A","cards":[{"id":"c1","title":"x"}]},
            {"id":"b","title":"B","cards":[{"id":"c1","title":"y"}]}
        ]}"#;
        let err = KanbanBoard::from_json(content).unwrap_err();
        assert_eq!(err, KanbanError::DuplicateCard("c1".to_string()));
    }

    #[test]
    fn test_import_failure_leaves_board_untouched() {
        let mut board = KanbanBoard::default_board();
        board.add_card("todo", draft("keep me")).unwrap();
        let before = board.clone();

        assert!(board.import("{\"lanes\": []}").is_err());
        assert!(board.import("not json").is_err());
        assert_eq!(board, before);
    }

    #[test]
    fn test_export_adds_metadata_and_reimports() {
        let mut board = KanbanBoard::default_board();
        board.add_card("todo", draft("exported")).unwrap();
        let exported = board.export().unwrap();

        let value: Value = serde_json::from_str(&exported).unwrap();
        assert_eq!(value["version"], "1.0");
        assert!(value["exportedAt"].is_string());

        let mut other = KanbanBoard { columns: vec![] };
        other.import(&exported).unwrap();
        assert_eq!(other, board);
    }
}
