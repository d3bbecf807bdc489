use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AppError;
use crate::portal::dto::FallbackClassRow;
use crate::portal::{Endpoints, XkClient};

/// Fetches the alternate sections a course can be registered through.
#[derive(Clone)]
pub struct FallbackResolver {
    client: Arc<dyn XkClient>,
    endpoints: Endpoints,
}

impl FallbackResolver {
    pub fn new(client: Arc<dyn XkClient>, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    /// Never fails: any problem is logged and yields an empty list.
    pub async fn fetch_fallback_classes(&self, course_id: &str) -> Vec<String> {
        match self.try_fetch(course_id).await {
            Ok(ids) => {
                debug!("course {} has {} fallback classes", course_id, ids.len());
                ids
            }
            Err(e) => {
                warn!("fallback classes for {} unavailable: {}", course_id, e);
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, course_id: &str) -> Result<Vec<String>, AppError> {
        let url = self.endpoints.fallback_classes_url(course_id);
        let reply = self.client.get(&url).await?;

        if !reply.is_success() {
            return Err(AppError::UnexpectedStatus(reply.status));
        }

        let rows: Vec<FallbackClassRow> = serde_json::from_str(&reply.body)?;
        Ok(rows.iter().filter_map(FallbackClassRow::id).collect())
    }
}
