use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A caller known to the store, keyed internally by an integer id and
/// externally by the identity provider's subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
