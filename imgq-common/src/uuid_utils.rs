//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new UUIDv4 in its stored (hyphenated string) form
pub fn generate_id() -> String {
    generate().to_string()
}
