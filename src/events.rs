//! Inbound webhook payloads
//!
//! Only the fields the sync flows read are modelled. Every field defaults, so
//! a payload that is valid JSON but missing parts still decodes and then
//! simply fails its trigger check.

use serde::Deserialize;

/// Trello's translation key for "moved card from list A to list B"
pub const CARD_MOVED_BETWEEN_LISTS: &str = "action_move_card_from_list_to_list";

/// GitLab issue hook action for a closed issue
pub const ISSUE_CLOSE_ACTION: &str = "close";

/// Trello webhook body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardEvent {
    #[serde(default)]
    pub action: BoardAction,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardAction {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub display: BoardDisplay,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardDisplay {
    #[serde(rename = "translationKey", default)]
    pub translation_key: String,

    #[serde(default)]
    pub entities: BoardEntities,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardEntities {
    #[serde(default)]
    pub card: CardEntity,

    #[serde(rename = "listAfter", default)]
    pub list_after: ListEntity,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardEntity {
    #[serde(default)]
    pub id: String,

    /// Card name as shown on the board
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEntity {
    #[serde(default)]
    pub id: String,
}

/// A card that landed in the in-progress list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardMoved {
    pub card_id: String,
    pub title: String,
}

impl BoardEvent {
    pub fn card_id(&self) -> &str {
        &self.action.display.entities.card.id
    }

    pub fn destination_list(&self) -> &str {
        &self.action.display.entities.list_after.id
    }

    /// The card move that starts a sync cycle, if this event is one
    ///
    /// Requires the list-to-list move key, a destination equal to
    /// `in_progress_list`, and a card id.
    pub fn card_moved_into(&self, in_progress_list: &str) -> Option<CardMoved> {
        let display = &self.action.display;
        if display.translation_key != CARD_MOVED_BETWEEN_LISTS
            || display.entities.list_after.id != in_progress_list
            || display.entities.card.id.is_empty()
        {
            return None;
        }

        Some(CardMoved {
            card_id: display.entities.card.id.clone(),
            title: display.entities.card.text.clone(),
        })
    }
}

/// GitLab issue hook body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerEvent {
    #[serde(default)]
    pub object_attributes: IssueAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueAttributes {
    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub id: i64,
}

impl TrackerEvent {
    /// Id of the closed issue, if this event closes one
    pub fn closed_issue(&self) -> Option<i64> {
        let attrs = &self.object_attributes;
        (attrs.action == ISSUE_CLOSE_ACTION && attrs.id != 0).then_some(attrs.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_event(key: &str, list: &str) -> BoardEvent {
        serde_json::from_value(serde_json::json!({
            "action": {
                "type": "updateCard",
                "display": {
                    "translationKey": key,
                    "entities": {
                        "card": {"type": "card", "id": "abc123", "text": "Fix bug"},
                        "listBefore": {"type": "list", "id": "list-todo"},
                        "listAfter": {"type": "list", "id": list}
                    }
                }
            },
            "model": {"id": "board-1"}
        }))
        .unwrap()
    }

    #[test]
    fn test_card_moved_into_in_progress() {
        let event = board_event(CARD_MOVED_BETWEEN_LISTS, "list-in-progress");
        assert_eq!(event.action.kind, "updateCard");

        let moved = event.card_moved_into("list-in-progress").unwrap();
        assert_eq!(moved.card_id, "abc123");
        assert_eq!(moved.title, "Fix bug");
    }

    #[test]
    fn test_other_destination_ignored() {
        let event = board_event(CARD_MOVED_BETWEEN_LISTS, "list-done");
        assert!(event.card_moved_into("list-in-progress").is_none());
    }

    #[test]
    fn test_other_action_ignored() {
        let event = board_event("action_comment_on_card", "list-in-progress");
        assert!(event.card_moved_into("list-in-progress").is_none());
    }

    #[test]
    fn test_sparse_board_payload_decodes() {
        let event: BoardEvent = serde_json::from_str(r#"{"model": {}}"#).unwrap();
        assert_eq!(event.card_id(), "");
        assert_eq!(event.destination_list(), "");
        assert!(event.card_moved_into("").is_none());
    }

    #[test]
    fn test_close_event() {
        let event: TrackerEvent = serde_json::from_value(serde_json::json!({
            "object_kind": "issue",
            "object_attributes": {"action": "close", "id": 42, "iid": 3, "state": "closed"}
        }))
        .unwrap();
        assert_eq!(event.closed_issue(), Some(42));
    }

    #[test]
    fn test_non_close_actions() {
        for action in ["open", "update", "reopen", ""] {
            let event: TrackerEvent = serde_json::from_value(serde_json::json!({
                "object_attributes": {"action": action, "id": 42}
            }))
            .unwrap();
            assert_eq!(event.closed_issue(), None, "action {action:?}");
        }
    }
}
