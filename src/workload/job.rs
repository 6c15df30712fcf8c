use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// A unit of externally submitted work
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            duration,
            submitted_at: Utc::now(),
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
