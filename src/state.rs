use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;

use crate::db::{LoadedSnapshot, SaveBatch};
use crate::models::{CourseEntry, CourseStatus, CourseType, StatusRecord};

/// What one registration attempt should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPlan {
    pub course_type: CourseType,
    pub fallback_class: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    pub id: String,
    pub name: String,
    pub course_type: CourseType,
    pub success: bool,
    pub fallback_ready: bool,
    pub fallback_attempt_index: usize,
    pub fallback_classes: usize,
}

/// In-memory maps of the active set. One entry and one status per id.
#[derive(Debug, Default)]
pub struct TrackerState {
    order: Vec<String>,
    entries: HashMap<String, CourseEntry>,
    statuses: HashMap<String, CourseStatus>,
    fallback_classes: HashMap<String, Vec<String>>,
}

impl TrackerState {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn entry(&self, id: &str) -> Option<&CourseEntry> {
        self.entries.get(id)
    }

    pub fn status(&self, id: &str) -> Option<&CourseStatus> {
        self.statuses.get(id)
    }

    pub fn fallback_classes(&self, id: &str) -> Option<&[String]> {
        self.fallback_classes.get(id).map(Vec::as_slice)
    }

    /// Returns false if the id is already tracked.
    pub fn insert(&mut self, entry: CourseEntry) -> bool {
        if self.entries.contains_key(&entry.id) {
            return false;
        }
        self.order.push(entry.id.clone());
        self.statuses.insert(entry.id.clone(), CourseStatus::default());
        self.entries.insert(entry.id.clone(), entry);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<CourseEntry> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|o| o != id);
        self.statuses.remove(id);
        self.fallback_classes.remove(id);
        Some(entry)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn rename(&mut self, id: &str, name: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.display_name = name.to_string();
                entry.name_updated_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Stores a freshly resolved list and makes the course pollable.
    pub fn set_fallback_classes(&mut self, id: &str, classes: Vec<String>) -> bool {
        let Some(status) = self.statuses.get_mut(id) else {
            return false;
        };
        status.fallback_ready = true;
        status.fallback_attempt_index = 0;
        self.fallback_classes.insert(id.to_string(), classes);
        true
    }

    /// Ids a tick should attempt: not yet successful and resolved.
    pub fn pollable_ids(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                self.statuses
                    .get(id.as_str())
                    .is_some_and(|s| !s.success && s.fallback_ready)
            })
            .cloned()
            .collect()
    }

    /// Picks the fallback class for the next attempt, wrapping the cursor to 0
    /// once it has run past the list. `None` when the course must be skipped.
    pub fn plan_attempt(&mut self, id: &str) -> Option<AttemptPlan> {
        let course_type = self.entries.get(id)?.course_type;
        let status = self.statuses.get_mut(id)?;
        if status.success || !status.fallback_ready {
            return None;
        }

        let mut fallback_class = None;
        if course_type.needs_fallback_class() {
            if let Some(list) = self.fallback_classes.get(id).filter(|l| !l.is_empty()) {
                if status.fallback_attempt_index >= list.len() {
                    status.fallback_attempt_index = 0;
                }
                fallback_class = Some(list[status.fallback_attempt_index].clone());
            }
        }

        Some(AttemptPlan {
            course_type,
            fallback_class,
        })
    }

    /// Moves to the next fallback class after a failed attempt, if rotation applies.
    pub fn advance_fallback(&mut self, id: &str) -> Option<usize> {
        let course_type = self.entries.get(id)?.course_type;
        if !course_type.needs_fallback_class() {
            return None;
        }
        if self.fallback_classes.get(id).is_none_or(|l| l.is_empty()) {
            return None;
        }
        let status = self.statuses.get_mut(id)?;
        if status.success {
            return None;
        }
        status.fallback_attempt_index += 1;
        Some(status.fallback_attempt_index)
    }

    /// Flips the course to succeeded. Returns its type only on the first flip.
    pub fn mark_success(&mut self, id: &str) -> Option<CourseType> {
        let status = self.statuses.get_mut(id)?;
        if status.success {
            return None;
        }
        status.success = true;
        self.entries.get(id).map(|e| e.course_type)
    }

    pub fn success_count(&self) -> usize {
        self.statuses.values().filter(|s| s.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.is_empty() && self.success_count() == self.len()
    }

    pub fn views(&self) -> Vec<CourseView> {
        self.order
            .iter()
            .filter_map(|id| {
                let entry = self.entries.get(id)?;
                let status = self.statuses.get(id).cloned().unwrap_or_default();
                Some(CourseView {
                    id: id.clone(),
                    name: entry.display_name.clone(),
                    course_type: entry.course_type,
                    success: status.success,
                    fallback_ready: status.fallback_ready,
                    fallback_attempt_index: status.fallback_attempt_index,
                    fallback_classes: self.fallback_classes.get(id).map_or(0, Vec::len),
                })
            })
            .collect()
    }

    /// Everything a full save needs. Memory is authoritative for names and types.
    pub fn save_batch(&self) -> SaveBatch {
        SaveBatch {
            courses: self.order.clone(),
            fallback_classes: self.fallback_classes.clone(),
            status_map: self
                .statuses
                .iter()
                .map(|(id, s)| (id.clone(), StatusRecord { success: s.success }))
                .collect(),
            type_map: Some(
                self.entries
                    .iter()
                    .map(|(id, e)| (id.clone(), e.course_type))
                    .collect(),
            ),
            name_map: Some(
                self.entries
                    .iter()
                    .map(|(id, e)| (id.clone(), e.display_name.clone()))
                    .collect(),
            ),
        }
    }

    /// Replaces the maps with a loaded snapshot. Cached fallback lists are kept
    /// but courses stay unresolved until the resolver runs again.
    pub fn rehydrate(&mut self, snapshot: &LoadedSnapshot) {
        self.clear();
        for id in &snapshot.courses {
            let Some(details) = snapshot.course_details.get(id) else {
                continue;
            };
            let entry = CourseEntry {
                id: id.clone(),
                course_type: details.course_type,
                display_name: details.name.clone(),
                added_at: details.added_time,
                name_updated_at: details.name_updated_time,
            };
            if !self.insert(entry) {
                continue;
            }
            if let Some(status) = self.statuses.get_mut(id) {
                status.success = snapshot.status_map.get(id).is_some_and(|s| s.success);
            }
            if let Some(list) = snapshot.fallback_classes.get(id) {
                self.fallback_classes.insert(id.clone(), list.clone());
            }
        }
    }
}
