// Helper for generating UUIDv7 (timestamp-sortable UUIDs)
//
// New user ids are minted app-side so that ids sort by the time the first
// character of a user logged in.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// A fresh user id in its canonical hyphenated form.
pub fn new_user_id() -> String {
    uuidv7().to_string()
}
