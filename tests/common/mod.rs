#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use url::Url;

use xkbot::db::store::COURSES_KEY;
use xkbot::db::{CourseStore, KvStorage, MemoryStorage};
use xkbot::error::AppError;
use xkbot::events::{EngineEvent, EventBus};
use xkbot::portal::{HttpReply, XkClient};
use xkbot::services::{EngineSettings, RegistrationEngine};

pub const BASE_URL: &str = "http://127.0.0.1:9/xsxk";

#[derive(Clone)]
pub enum Scripted {
    Reply(HttpReply),
    Fail,
}

pub fn ok_json(body: &str) -> Scripted {
    Scripted::Reply(HttpReply::new(200, body))
}

pub fn refused() -> Scripted {
    ok_json(r#"{"success":false,"message":"选课失败"}"#)
}

pub fn accepted(timestamp: &str) -> Scripted {
    ok_json(&format!(r#"{{"success":true,"timestamp":"{}"}}"#, timestamp))
}

/// Fake portal: answers per course from a script and records every URL.
pub struct ScriptedClient {
    fallback: Mutex<HashMap<String, Scripted>>,
    replies: Mutex<HashMap<String, VecDeque<Scripted>>>,
    default_reply: Scripted,
    latency: Duration,
    requests: Mutex<Vec<Url>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            fallback: Mutex::new(HashMap::new()),
            replies: Mutex::new(HashMap::new()),
            default_reply: refused(),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_default(mut self, reply: Scripted) -> Self {
        self.default_reply = reply;
        self
    }

    pub fn fallback_list(&self, course_id: &str, ids: &[&str]) {
        let rows: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| serde_json::json!({ "sectionId": id }))
            .collect();
        self.fallback_reply(
            course_id,
            Scripted::Reply(HttpReply::new(200, serde_json::Value::Array(rows).to_string())),
        );
    }

    pub fn fallback_reply(&self, course_id: &str, reply: Scripted) {
        self.fallback
            .lock()
            .unwrap()
            .insert(course_id.to_string(), reply);
    }

    pub fn push_reply(&self, course_id: &str, reply: Scripted) {
        self.replies
            .lock()
            .unwrap()
            .entry(course_id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().unwrap().clone()
    }

    /// Registration calls made for one course, in order.
    pub fn registrations(&self, course_id: &str) -> Vec<Url> {
        self.requests()
            .into_iter()
            .filter(|u| u.path().ends_with("/xkOper") && param(u, "jxbid").as_deref() == Some(course_id))
            .collect()
    }

    pub fn lookups(&self) -> Vec<Url> {
        self.requests()
            .into_iter()
            .filter(|u| u.path().ends_with("/loadData"))
            .collect()
    }
}

#[async_trait]
impl XkClient for ScriptedClient {
    async fn get(&self, url: &str) -> Result<HttpReply, AppError> {
        let parsed = Url::parse(url).expect("engine built an invalid url");
        self.requests.lock().unwrap().push(parsed.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = if parsed.path().ends_with("/loadData") {
            let id = param(&parsed, "id").unwrap_or_default();
            self.fallback
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .unwrap_or_else(|| ok_json("[]"))
        } else {
            let id = param(&parsed, "jxbid").unwrap_or_default();
            self.replies
                .lock()
                .unwrap()
                .get_mut(&id)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| self.default_reply.clone())
        };

        match scripted {
            Scripted::Reply(reply) => Ok(reply),
            Scripted::Fail => Err(transport_error()),
        }
    }
}

/// A genuine reqwest error, built without touching the network.
fn transport_error() -> AppError {
    match reqwest::Client::new().get("connection reset").build() {
        Err(e) => AppError::Http(e),
        Ok(_) => panic!("relative url unexpectedly accepted"),
    }
}

/// Memory storage whose course-list writes stall unless they record a success.
pub struct SlowCourseWrites {
    inner: MemoryStorage,
    delay: Duration,
}

impl SlowCourseWrites {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStorage::new(),
            delay,
        }
    }
}

#[async_trait]
impl KvStorage for SlowCourseWrites {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        if key == COURSES_KEY && !value.contains(r#""success":true"#) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.inner.delete(key).await
    }
}

pub fn param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub struct Harness {
    pub engine: RegistrationEngine,
    pub client: Arc<ScriptedClient>,
    pub store: CourseStore,
    pub rx: broadcast::Receiver<EngineEvent>,
}

pub fn settings(poll_interval: Duration) -> EngineSettings {
    EngineSettings {
        base_url: BASE_URL.to_string(),
        poll_interval,
        volunteer_level: 2,
    }
}

pub fn harness(client: ScriptedClient) -> Harness {
    harness_with(client, Duration::from_secs(3600), CourseStore::new(Arc::new(MemoryStorage::new())))
}

pub fn harness_with(client: ScriptedClient, poll_interval: Duration, store: CourseStore) -> Harness {
    let client = Arc::new(client);
    let events = EventBus::new();
    let rx = events.subscribe();
    let engine = RegistrationEngine::new(settings(poll_interval), client.clone(), store.clone(), events);
    Harness {
        engine,
        client,
        store,
        rx,
    }
}

/// Every event received so far.
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count(events: &[EngineEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

/// Waits for the first event with the given name.
pub async fn wait_for(rx: &mut broadcast::Receiver<EngineEvent>, name: &str) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if event.name() == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}
