use super::*;

fn item_count(board: &Board, column_id: &str) -> usize {
    board.column(column_id).map_or(0, |column| column.items.len())
}

// =============================================================================
// defaults
// =============================================================================

#[test]
fn default_columns_in_order() {
    let board = Board::with_default_columns();
    let views = board.views();
    let ids: Vec<&str> = views.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["went-well", "improve", "actions"]);
    assert_eq!(views[1].title, "What could improve");
    assert_eq!(views[2].order, 2);
}

#[test]
fn views_sort_by_order_field() {
    let mut columns = IndexMap::new();
    for (id, order) in [("b", 1), ("a", 0)] {
        columns.insert(id.to_owned(), Column { id: id.to_owned(), title: id.to_uppercase(), order, items: IndexMap::new() });
    }
    let board = Board::from_stored(StoredSnapshot { room_id: "r".to_owned(), columns, saved_at: 0 });
    let ids: Vec<String> = board.views().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, ["a", "b"]);
}

#[test]
fn empty_snapshot_falls_back_to_defaults() {
    let stored = StoredSnapshot { room_id: "r".to_owned(), columns: IndexMap::new(), saved_at: 0 };
    assert_eq!(Board::from_stored(stored), Board::with_default_columns());
}

// =============================================================================
// add / edit / delete
// =============================================================================

#[test]
fn add_item_trims_and_records_author() {
    let mut board = Board::with_default_columns();
    let id = board.add_item("improve", "  more coffee  ", "Ada").expect("add");
    let item = &board.column("improve").expect("column").items[&id];
    assert_eq!(item.content, "more coffee");
    assert_eq!(item.author_name, "Ada");
    assert!(item.created_at > 0);
}

#[test]
fn add_item_rejects_blank_and_overlong_content() {
    let mut board = Board::with_default_columns();
    assert_eq!(board.add_item("improve", "   ", "Ada"), Err(BoardError::EmptyContent));
    let long = "x".repeat(MAX_ITEM_CHARS + 1);
    assert_eq!(board.add_item("improve", &long, "Ada"), Err(BoardError::ContentTooLong));
    assert!(board.add_item("improve", &"x".repeat(MAX_ITEM_CHARS), "Ada").is_ok());
    assert_eq!(item_count(&board, "improve"), 1);
}

#[test]
fn add_item_to_unknown_column_fails() {
    let mut board = Board::with_default_columns();
    assert!(matches!(board.add_item("nope", "x", "Ada"), Err(BoardError::ColumnNotFound(_))));
}

#[test]
fn owner_can_edit_and_delete() {
    let mut board = Board::with_default_columns();
    let id = board.add_item("actions", "ship it", "Ada").expect("add");

    board.edit_item("actions", &id, "ship it today", "Ada").expect("edit");
    assert_eq!(board.column("actions").expect("column").items[&id].content, "ship it today");

    let removed = board.delete_item("actions", &id, "Ada").expect("delete");
    assert_eq!(removed.id, id);
    assert_eq!(item_count(&board, "actions"), 0);
}

#[test]
fn non_owner_edit_and_delete_leave_board_unchanged() {
    let mut board = Board::with_default_columns();
    let id = board.add_item("actions", "ship it", "Ada").expect("add");
    let before = board.clone();

    assert_eq!(board.edit_item("actions", &id, "hijacked", "Grace"), Err(BoardError::NotOwner));
    assert_eq!(board.delete_item("actions", &id, "Grace"), Err(BoardError::NotOwner));
    assert_eq!(board, before);
}

#[test]
fn board_errors_carry_codes() {
    use crate::services::ErrorCode;

    assert_eq!(BoardError::NotOwner.error_code(), "E_NOT_OWNER");
    assert_eq!(BoardError::EmptyContent.error_code(), "E_INVALID_CONTENT");
    assert_eq!(BoardError::ColumnNotFound("x".into()).error_code(), "E_COLUMN_NOT_FOUND");
    assert!(!BoardError::NotOwner.retryable());
}

#[test]
fn invalid_edit_keeps_previous_content() {
    let mut board = Board::with_default_columns();
    let id = board.add_item("went-well", "demo", "Ada").expect("add");
    assert_eq!(board.edit_item("went-well", &id, "  ", "Ada"), Err(BoardError::EmptyContent));
    assert_eq!(board.column("went-well").expect("column").items[&id].content, "demo");
}

#[test]
fn delete_preserves_order_of_remaining_items() {
    let mut board = Board::with_default_columns();
    let first = board.add_item("went-well", "one", "Ada").expect("add");
    let second = board.add_item("went-well", "two", "Ada").expect("add");
    let third = board.add_item("went-well", "three", "Ada").expect("add");

    board.delete_item("went-well", &second, "Ada").expect("delete");
    let ids: Vec<&String> = board.column("went-well").expect("column").items.keys().collect();
    assert_eq!(ids, [&first, &third]);
}

// =============================================================================
// snapshots
// =============================================================================

#[test]
fn stored_snapshot_round_trips_columns_and_items() {
    let mut board = Board::with_default_columns();
    board.add_item("went-well", "pairing", "Ada").expect("add");
    board.add_item("actions", "write docs", "Grace").expect("add");

    let stored = board.to_stored("retro-1");
    let json = serde_json::to_string_pretty(&stored).expect("serialize");
    let loaded: StoredSnapshot = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(loaded.room_id, "retro-1");
    assert_eq!(Board::from_stored(loaded), board);
}

#[test]
fn stored_snapshot_uses_camel_case_keys() {
    let mut board = Board::with_default_columns();
    let id = board.add_item("improve", "tests", "Ada").expect("add");
    let value = serde_json::to_value(board.to_stored("r")).expect("serialize");

    assert!(value["savedAt"].is_i64());
    assert_eq!(value["roomId"], "r");
    assert_eq!(value["columns"]["improve"]["items"][&id]["authorName"], "Ada");
    assert!(value["columns"]["improve"]["items"][&id]["createdAt"].is_i64());
}

// =============================================================================
// ids
// =============================================================================

#[test]
fn item_id_has_timestamp_and_base36_suffix() {
    let id = generate_item_id(1_700_000_000_000);
    let (ms, suffix) = id.split_once('-').expect("dash");
    assert_eq!(ms, "1700000000000");
    assert_eq!(suffix.len(), ITEM_ID_SUFFIX_LEN);
    assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
}
