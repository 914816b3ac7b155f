use crate::grpc::proto;
use chain_cursor_connector::Cursor;

impl From<Cursor> for proto::Cursor {
    fn from(cursor: Cursor) -> Self {
        Self {
            value: cursor.to_string(),
        }
    }
}

impl From<&Cursor> for proto::StartCursor {
    fn from(cursor: &Cursor) -> Self {
        Self {
            value: Some(cursor.to_string()),
        }
    }
}
