/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Free-form metadata attached to a request (e.g. `task_url`).
pub type Metadata = std::collections::HashMap<String, String>;
