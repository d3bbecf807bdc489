use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::storage::KvStorage;
use crate::error::AppError;
use crate::models::{CourseDetails, CourseType, DEFAULT_COURSE_NAME, StatusRecord};

pub const COURSES_KEY: &str = "xkbot.courses";
pub const FALLBACK_CLASSES_KEY: &str = "xkbot.fallback_classes";
pub const METADATA_KEY: &str = "xkbot.metadata";
pub const SCHEMA_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCourse {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_type: Option<String>,
    #[serde(default)]
    pub added_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_updated_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: StatusRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub last_saved: DateTime<Utc>,
    pub version: String,
    #[serde(default)]
    pub session_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courses_count: Option<usize>,
}

/// Arguments of a save. Maps left as `None` mean "keep what is stored".
#[derive(Debug, Clone, Default)]
pub struct SaveBatch {
    pub courses: Vec<String>,
    pub fallback_classes: HashMap<String, Vec<String>>,
    pub status_map: HashMap<String, StatusRecord>,
    pub type_map: Option<HashMap<String, CourseType>>,
    pub name_map: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedSnapshot {
    pub courses: Vec<String>,
    pub course_details: HashMap<String, CourseDetails>,
    pub fallback_classes: HashMap<String, Vec<String>>,
    pub status_map: HashMap<String, StatusRecord>,
    pub metadata: Option<Metadata>,
}

impl LoadedSnapshot {
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

/// Durable record of tracked courses.
///
/// Every public operation swallows its own errors: failures are logged and
/// reported as `false` or an empty snapshot so callers can carry on in memory.
#[derive(Clone)]
pub struct CourseStore {
    storage: Option<Arc<dyn KvStorage>>,
}

impl CourseStore {
    pub fn new(storage: Arc<dyn KvStorage>) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    /// A store with no medium behind it; every call is a logged no-op.
    pub fn detached() -> Self {
        Self { storage: None }
    }

    pub fn is_available(&self) -> bool {
        self.storage.is_some()
    }

    fn storage(&self) -> Result<&Arc<dyn KvStorage>, AppError> {
        self.storage.as_ref().ok_or(AppError::StorageUnavailable)
    }

    pub async fn save(&self, batch: &SaveBatch) -> bool {
        match self.try_save(batch).await {
            Ok(count) => {
                debug!("saved {} courses", count);
                true
            }
            Err(AppError::StorageUnavailable) => {
                warn!("storage unavailable, courses kept in memory only");
                false
            }
            Err(e) => {
                warn!("failed to save courses: {}", e);
                false
            }
        }
    }

    async fn try_save(&self, batch: &SaveBatch) -> Result<usize, AppError> {
        let storage = self.storage()?;
        let previous: HashMap<String, StoredCourse> = self
            .read_courses()
            .await
            .unwrap_or_else(|e| {
                warn!("previous courses unreadable, saving without merge: {}", e);
                Vec::new()
            })
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(batch.courses.len());

        for raw in &batch.courses {
            let id = raw.trim();
            if id.is_empty() {
                warn!("ignoring empty course id in save");
                continue;
            }
            if !seen.insert(id.to_string()) {
                warn!("ignoring duplicate course id in save: {}", id);
                continue;
            }

            let stored = previous.get(id);
            let explicit_name = batch.name_map.as_ref().and_then(|m| m.get(id));
            let name = explicit_name
                .cloned()
                .or_else(|| stored.and_then(|s| s.name.clone()))
                .unwrap_or_else(|| DEFAULT_COURSE_NAME.to_string());
            let course_type = batch
                .type_map
                .as_ref()
                .and_then(|m| m.get(id))
                .map(|t| t.key().to_string())
                .or_else(|| stored.and_then(|s| s.course_type.clone()))
                .unwrap_or_else(|| CourseType::default().key().to_string());

            let previous_name = stored.and_then(|s| s.name.as_deref());
            let name_updated_time = match explicit_name {
                Some(n) if previous_name != Some(n.as_str()) => Some(now),
                _ => stored.and_then(|s| s.name_updated_time),
            };

            let status = batch
                .status_map
                .get(id)
                .copied()
                .or_else(|| stored.map(|s| s.status))
                .unwrap_or_default();

            records.push(StoredCourse {
                id: id.to_string(),
                name: Some(name),
                course_type: Some(course_type),
                added_time: Some(stored.and_then(|s| s.added_time).unwrap_or(now)),
                name_updated_time,
                status,
            });
        }

        storage
            .set(COURSES_KEY, &serde_json::to_string(&records)?)
            .await?;
        storage
            .set(
                FALLBACK_CLASSES_KEY,
                &serde_json::to_string(&batch.fallback_classes)?,
            )
            .await?;

        let session_count = match self.read_metadata().await {
            Ok(Some(meta)) => meta.session_count,
            _ => 0,
        };
        let metadata = Metadata {
            last_saved: now,
            version: SCHEMA_VERSION.to_string(),
            session_count: session_count + 1,
            courses_count: Some(records.len()),
        };
        storage
            .set(METADATA_KEY, &serde_json::to_string(&metadata)?)
            .await?;

        Ok(records.len())
    }

    pub async fn load(&self) -> LoadedSnapshot {
        match self.try_load().await {
            Ok(snapshot) => snapshot,
            Err(AppError::StorageUnavailable) => {
                warn!("storage unavailable, starting with no saved courses");
                LoadedSnapshot::default()
            }
            Err(e) => {
                warn!("saved courses unreadable, starting empty: {}", e);
                LoadedSnapshot::default()
            }
        }
    }

    async fn try_load(&self) -> Result<LoadedSnapshot, AppError> {
        let courses = self.read_courses().await?;
        let fallback_classes = self.read_fallback_classes().await?;
        let metadata = self.read_metadata().await?;

        let mut snapshot = LoadedSnapshot {
            metadata,
            ..Default::default()
        };

        for course in courses {
            if course.id.trim().is_empty() || snapshot.course_details.contains_key(&course.id) {
                warn!("skipping malformed stored course {:?}", course.id);
                continue;
            }
            let course_type = match course.course_type.as_deref() {
                Some(key) => key.parse::<CourseType>().unwrap_or_else(|_| {
                    warn!("stored course {} has unknown type {}, using default", course.id, key);
                    CourseType::default()
                }),
                None => CourseType::default(),
            };
            let details = CourseDetails {
                name: course
                    .name
                    .unwrap_or_else(|| DEFAULT_COURSE_NAME.to_string()),
                course_type,
                added_time: course.added_time.unwrap_or_else(Utc::now),
                name_updated_time: course.name_updated_time,
                status: course.status,
            };
            snapshot.status_map.insert(course.id.clone(), course.status);
            snapshot.course_details.insert(course.id.clone(), details);
            snapshot.courses.push(course.id);
        }

        snapshot.fallback_classes = fallback_classes
            .into_iter()
            .filter(|(id, _)| snapshot.course_details.contains_key(id))
            .collect();

        Ok(snapshot)
    }

    pub async fn update_name(&self, id: &str, name: &str) -> bool {
        let result: Result<bool, AppError> = async {
            let storage = self.storage()?;
            let mut courses = self.read_courses().await?;
            let Some(course) = courses.iter_mut().find(|c| c.id == id) else {
                return Ok(false);
            };
            course.name = Some(name.to_string());
            course.name_updated_time = Some(Utc::now());
            storage
                .set(COURSES_KEY, &serde_json::to_string(&courses)?)
                .await?;
            Ok(true)
        }
        .await;

        match result {
            Ok(true) => true,
            Ok(false) => {
                warn!("cannot rename {}: not in saved courses", id);
                false
            }
            Err(e) => {
                warn!("failed to save name for {}: {}", id, e);
                false
            }
        }
    }

    pub async fn remove_course(&self, id: &str) -> bool {
        let storage = match self.storage() {
            Ok(s) => s,
            Err(e) => {
                warn!("cannot remove {} from storage: {}", id, e);
                return false;
            }
        };

        let courses_ok = match self.read_courses().await {
            Ok(mut courses) => {
                courses.retain(|c| c.id != id);
                match serde_json::to_string(&courses) {
                    Ok(json) => storage.set(COURSES_KEY, &json).await,
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &courses_ok {
            warn!("failed to remove {} from saved courses: {}", id, e);
        }

        let fallback_ok = match self.read_fallback_classes().await {
            Ok(mut fallback) => {
                fallback.remove(id);
                match serde_json::to_string(&fallback) {
                    Ok(json) => storage.set(FALLBACK_CLASSES_KEY, &json).await,
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &fallback_ok {
            warn!("failed to remove fallback classes of {}: {}", id, e);
        }

        courses_ok.is_ok() && fallback_ok.is_ok()
    }

    pub async fn clear_all(&self) -> bool {
        let storage = match self.storage() {
            Ok(s) => s,
            Err(e) => {
                warn!("cannot clear storage: {}", e);
                return false;
            }
        };

        let mut ok = true;
        for key in [COURSES_KEY, FALLBACK_CLASSES_KEY, METADATA_KEY] {
            if let Err(e) = storage.delete(key).await {
                warn!("failed to delete {}: {}", key, e);
                ok = false;
            }
        }
        ok
    }

    async fn read_courses(&self) -> Result<Vec<StoredCourse>, AppError> {
        match self.storage()?.get(COURSES_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn read_fallback_classes(&self) -> Result<HashMap<String, Vec<String>>, AppError> {
        match self.storage()?.get(FALLBACK_CLASSES_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    async fn read_metadata(&self) -> Result<Option<Metadata>, AppError> {
        match self.storage()?.get(METADATA_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
