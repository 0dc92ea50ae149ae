/// Per-user task categories
///
/// A category is only a label/color pair. Tasks store the category name as
/// free text, so deleting a category leaves existing tasks untouched.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE categories (
///     user_id UUID NOT NULL,
///     name VARCHAR(100) NOT NULL,
///     color VARCHAR(32) NOT NULL,
///     PRIMARY KEY (user_id, name)
/// );
/// ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Color used when a category is created without one
pub const DEFAULT_CATEGORY_COLOR: &str = "#64748b";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub user_id: Uuid,
    pub name: String,
    pub color: String,
}

impl Category {
    pub fn new(user_id: Uuid, name: impl Into<String>, color: Option<String>) -> Self {
        Category {
            user_id,
            name: name.into(),
            color: color.unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
        }
    }
}

/// Checks a `#rgb` / `#rrggbb` hex color
pub fn is_valid_color(color: &str) -> bool {
    let Some(hex) = color.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}
