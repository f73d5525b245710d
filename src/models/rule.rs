use serde::{Deserialize, Serialize};

/// Import rule: descriptions matching `pattern` are filed under `category_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: i64,
    pub pattern: String,
    pub category_id: String,
}
