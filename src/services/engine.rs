use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{Local, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::CourseStore;
use crate::error::AppError;
use crate::events::{EngineEvent, EventBus};
use crate::models::{CourseEntry, CourseType, DEFAULT_COURSE_NAME, validate_course_id};
use crate::portal::{Endpoints, XkClient};
use crate::services::attempt::{AttemptOutcome, interpret_reply};
use crate::services::resolver::FallbackResolver;
use crate::services::scheduler::TickScheduler;
use crate::state::{CourseView, TrackerState};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_VOLUNTEER_LEVEL: u8 = 1;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub base_url: String,
    pub poll_interval: Duration,
    pub volunteer_level: u8,
}

impl EngineSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            volunteer_level: DEFAULT_VOLUNTEER_LEVEL,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub total: usize,
    pub success_count: usize,
    pub pending_count: usize,
    pub courses: Vec<CourseView>,
}

/// The registration state machine.
///
/// Cloning is cheap and every clone drives the same courses. Ticks fire at a
/// fixed interval and never wait for the previous tick's requests, so two
/// attempts for one course can be in flight at once. Effects of late replies
/// (success, index advance) are applied to whatever state exists when they land.
#[derive(Clone)]
pub struct RegistrationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    settings: EngineSettings,
    endpoints: Endpoints,
    client: Arc<dyn XkClient>,
    resolver: FallbackResolver,
    store: CourseStore,
    events: EventBus,
    state: Mutex<TrackerState>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    /// Serializes every write to the store so an older snapshot never lands last.
    persist_lock: Mutex<()>,
}

impl RegistrationEngine {
    pub fn new(
        settings: EngineSettings,
        client: Arc<dyn XkClient>,
        store: CourseStore,
        events: EventBus,
    ) -> Self {
        let endpoints = Endpoints::new(settings.base_url.clone());
        let resolver = FallbackResolver::new(client.clone(), endpoints.clone());
        Self {
            inner: Arc::new(EngineInner {
                settings,
                endpoints,
                client,
                resolver,
                store,
                events,
                state: Mutex::new(TrackerState::default()),
                ticker: Mutex::new(None),
                persist_lock: Mutex::new(()),
            }),
        }
    }

    /// Rebuilds the in-memory maps from storage and announces `data.loaded`.
    pub async fn restore(&self) -> usize {
        let snapshot = self.inner.store.load().await;
        let count = {
            let mut state = self.inner.state.lock().await;
            state.rehydrate(&snapshot);
            state.len()
        };
        info!("restored {} saved courses", count);

        self.inner.events.emit(EngineEvent::DataLoaded {
            courses: snapshot.courses,
            course_details: snapshot.course_details,
            status_map: snapshot.status_map,
        });
        count
    }

    pub async fn add_course(&self, raw_id: &str, course_type: CourseType) -> Result<(), AppError> {
        let id = validate_course_id(raw_id).inspect_err(|e| warn!("add rejected: {}", e))?;

        {
            let mut state = self.inner.state.lock().await;
            if !state.insert(CourseEntry::new(id.clone(), course_type)) {
                warn!("add rejected: {} already tracked", id);
                return Err(AppError::DuplicateCourse(id));
            }
        }
        info!("added course {} ({})", id, course_type);

        self.inner.persist().await;
        self.inner.events.emit(EngineEvent::CourseAdded {
            id: id.clone(),
            course_type,
        });

        if self.is_running().await {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.resolve_one(id).await;
            });
        }
        Ok(())
    }

    pub async fn remove_course(&self, id: &str) -> Result<(), AppError> {
        self.remove_quietly(id).await?;
        self.inner.stop_if_idle().await;
        Ok(())
    }

    async fn remove_quietly(&self, id: &str) -> Result<(), AppError> {
        let id = id.trim();
        let removed = self.inner.state.lock().await.remove(id);
        if removed.is_none() {
            warn!("remove: course {} not found", id);
            return Err(AppError::NotFound(id.to_string()));
        }
        info!("removed course {}", id);

        {
            let _guard = self.inner.persist_lock.lock().await;
            self.inner.store.remove_course(id).await;
        }
        self.inner.events.emit(EngineEvent::CourseRemoved { id: id.to_string() });
        Ok(())
    }

    /// Replaces `old_id` with `new_id`. Same id is a no-op.
    pub async fn update_course(
        &self,
        old_id: &str,
        new_id: &str,
        course_type: CourseType,
    ) -> Result<(), AppError> {
        if old_id.trim() == new_id.trim() {
            return Ok(());
        }

        let new_id = validate_course_id(new_id).inspect_err(|e| warn!("update rejected: {}", e))?;
        {
            let state = self.inner.state.lock().await;
            if !state.contains(old_id.trim()) {
                return Err(AppError::NotFound(old_id.trim().to_string()));
            }
            if state.contains(&new_id) {
                warn!("update rejected: {} already tracked", new_id);
                return Err(AppError::DuplicateCourse(new_id));
            }
        }

        self.remove_quietly(old_id).await?;
        self.add_course(&new_id, course_type).await
    }

    pub async fn update_course_name(&self, id: &str, name: &str) -> Result<(), AppError> {
        let id = id.trim();
        let name = match name.trim() {
            "" => DEFAULT_COURSE_NAME,
            n => n,
        };

        if !self.inner.state.lock().await.rename(id, name) {
            warn!("rename: course {} not found", id);
            return Err(AppError::NotFound(id.to_string()));
        }

        {
            let _guard = self.inner.persist_lock.lock().await;
            self.inner.store.update_name(id, name).await;
        }
        self.inner.events.emit(EngineEvent::NameUpdated {
            id: id.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    /// Fetches every course's fallback list concurrently and marks them ready.
    /// Per-course failures leave that course with an empty list.
    pub async fn resolve_fallback_classes(&self) {
        let ids = self.inner.state.lock().await.ids();
        info!("resolving fallback classes for {} courses", ids.len());

        let lists = join_all(
            ids.iter()
                .map(|id| self.inner.resolver.fetch_fallback_classes(id)),
        )
        .await;

        {
            let mut state = self.inner.state.lock().await;
            for (id, list) in ids.into_iter().zip(lists) {
                if !state.set_fallback_classes(&id, list) {
                    debug!("course {} removed while resolving", id);
                }
            }
        }
        self.inner.persist().await;
    }

    /// Resolves fallback classes, then starts polling.
    pub async fn start(&self) -> bool {
        if self.is_running().await {
            warn!("start ignored: already running");
            return false;
        }
        {
            let state = self.inner.state.lock().await;
            if state.is_empty() {
                warn!("start ignored: no courses to register");
                return false;
            }
            if state.all_succeeded() {
                warn!("start ignored: every course is already registered");
                return false;
            }
        }

        self.resolve_fallback_classes().await;
        self.start_loop().await
    }

    pub async fn start_loop(&self) -> bool {
        let mut ticker = self.inner.ticker.lock().await;
        if ticker.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("start ignored: already running");
            return false;
        }

        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let scheduler = TickScheduler::new(self.inner.settings.poll_interval);
        *ticker = Some(scheduler.spawn(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch_tick().await;
                }
            }
        }));
        drop(ticker);

        info!("registration loop started");
        self.inner.events.emit(EngineEvent::Started { at: Utc::now() });
        true
    }

    pub async fn stop_loop(&self) -> bool {
        self.inner.stop_loop().await
    }

    pub async fn is_running(&self) -> bool {
        self.inner.is_running().await
    }

    /// Runs one pass over the active set and waits for its attempts to settle.
    pub async fn poll_once(&self) {
        for handle in self.inner.dispatch_tick().await {
            if let Err(e) = handle.await {
                error!("registration attempt panicked: {}", e);
            }
        }
    }

    pub async fn reset(&self) {
        if self.is_running().await {
            self.inner.stop_loop().await;
        }
        self.inner.state.lock().await.clear();
        {
            let _guard = self.inner.persist_lock.lock().await;
            self.inner.store.clear_all().await;
        }
        info!("all courses cleared");
    }

    pub async fn get_status(&self) -> EngineStatus {
        let running = self.is_running().await;
        let state = self.inner.state.lock().await;
        let total = state.len();
        let success_count = state.success_count();
        EngineStatus {
            running,
            total,
            success_count,
            pending_count: total - success_count,
            courses: state.views(),
        }
    }
}

impl EngineInner {
    async fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    async fn stop_loop(&self) -> bool {
        let handle = self.ticker.lock().await.take();
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!("registration loop stopped");
                self.events.emit(EngineEvent::Stopped { at: Utc::now() });
                true
            }
            _ => {
                warn!("stop ignored: not running");
                false
            }
        }
    }

    /// Stops the loop once nothing is left to poll.
    async fn stop_if_idle(&self) {
        let (empty, all_done) = {
            let state = self.state.lock().await;
            (state.is_empty(), state.all_succeeded())
        };
        if (empty || all_done) && self.is_running().await {
            if empty {
                info!("no courses left, stopping");
            } else {
                info!("every remaining course registered, stopping");
            }
            self.stop_loop().await;
        }
    }

    async fn persist(&self) -> bool {
        let _guard = self.persist_lock.lock().await;
        let batch = self.state.lock().await.save_batch();
        self.store.save(&batch).await
    }

    async fn resolve_one(&self, id: String) {
        let list = self.resolver.fetch_fallback_classes(&id).await;
        let stored = self.state.lock().await.set_fallback_classes(&id, list);
        if stored {
            self.persist().await;
        }
    }

    /// Spawns one attempt per pollable course without waiting for any of them.
    async fn dispatch_tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let ids = self.state.lock().await.pollable_ids();
        ids.into_iter()
            .map(|id| {
                let inner = self.clone();
                tokio::spawn(async move { inner.attempt(id).await })
            })
            .collect()
    }

    async fn attempt(&self, id: String) {
        let Some(plan) = self.state.lock().await.plan_attempt(&id) else {
            return;
        };

        let url = self.endpoints.registration_url(
            plan.course_type,
            &id,
            plan.fallback_class.as_deref(),
            self.settings.volunteer_level,
        );
        debug!("attempting {} via {}", id, url);

        let outcome = match self.client.get(&url).await {
            Ok(reply) => interpret_reply(&reply),
            Err(e) => AttemptOutcome::TransportFailed {
                reason: e.to_string(),
            },
        };

        match &outcome {
            AttemptOutcome::Succeeded { message, timestamp } => {
                self.on_success(&id, message.as_deref(), timestamp.clone()).await;
                return;
            }
            AttemptOutcome::Rejected {
                message,
                type_mismatch,
            } => {
                if *type_mismatch {
                    warn!("{}: section not found for type {} ({}), check the course type", id, plan.course_type, message);
                } else {
                    info!("{}: registration refused: {}", id, message);
                }
            }
            AttemptOutcome::CourseFull { status } => {
                debug!("{}: course full (HTTP {})", id, status);
            }
            AttemptOutcome::UnexpectedStatus { status, snippet } => {
                error!("{}: unexpected HTTP {}: {}", id, status, snippet);
            }
            AttemptOutcome::Malformed { reason } => {
                warn!("{}: unreadable response: {}", id, reason);
            }
            AttemptOutcome::TransportFailed { reason } => {
                warn!("{}: request failed: {}", id, reason);
            }
        }

        if outcome.advances_fallback() {
            if let Some(next) = self.state.lock().await.advance_fallback(&id) {
                debug!("{}: next fallback index {}", id, next);
            }
        }
    }

    async fn on_success(&self, id: &str, message: Option<&str>, timestamp: Option<String>) {
        let (course_type, all_done) = {
            let mut state = self.state.lock().await;
            match state.mark_success(id) {
                Some(t) => (t, state.all_succeeded()),
                None => {
                    debug!("{}: late success reply ignored", id);
                    return;
                }
            }
        };
        info!("{}: registered ({})", id, message.unwrap_or("ok"));

        self.persist().await;
        self.events.emit(EngineEvent::CourseSucceeded {
            id: id.to_string(),
            course_type,
            timestamp: timestamp
                .unwrap_or_else(|| Local::now().format("%H:%M:%S").to_string()),
        });

        if all_done && self.is_running().await {
            info!("every course registered, stopping");
            self.stop_loop().await;
        }
    }
}
