//! # Project Test Support
//!
//! In-memory stand-ins for the REST collaborator, shared by the scenario tests
//! under `tests/`. Each fake records every call, can be told to fail, and can
//! delay its responses so tests can interleave operations on virtual time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lib_sync::core::model::{SavedSection, SectionSnapshot};
use lib_sync::errors::ApiError;
use lib_sync::retrieve::api::{AnalysisApi, AnalysisResult, ApiResult, NotificationApi, NotificationRecord, SectionApi};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `PUT /sections/{id}` stand-in.
#[derive(Default)]
pub struct FakeSectionApi {
    calls: Mutex<Vec<(String, SectionSnapshot)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail: AtomicBool,
    latency: Mutex<Duration>,
    trim_server_side: AtomicBool,
}

impl FakeSectionApi {
    /// A fake that answers immediately and successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every PUT, in order.
    pub fn calls(&self) -> Vec<(String, SectionSnapshot)> {
        lock(&self.calls).clone()
    }

    /// Number of PUTs.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Highest number of PUTs that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Makes subsequent PUTs fail with a 503.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Delays every response.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Makes the server trim trailing whitespace, so its canonical copy differs
    /// from what was sent.
    pub fn set_trim_server_side(&self, trim: bool) {
        self.trim_server_side.store(trim, Ordering::SeqCst);
    }
}

#[async_trait]
impl SectionApi for FakeSectionApi {
    async fn put_section(&self, id: &str, snapshot: &SectionSnapshot) -> ApiResult<SavedSection> {
        lock(&self.calls).push((id.to_string(), snapshot.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                body: "service unavailable".into(),
            });
        }

        let mut content = snapshot.content.clone();
        if self.trim_server_side.load(Ordering::SeqCst) {
            for text in content.values_mut() {
                *text = text.trim_end().to_string();
            }
        }
        Ok(SavedSection {
            id: id.to_string(),
            owner_id: None,
            content,
            status: snapshot.status,
        })
    }
}

/// `POST /analyze` stand-in.
#[derive(Default)]
pub struct FakeAnalysisApi {
    texts: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeAnalysisApi {
    /// A fake that answers `analysis of <owner>` unless told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the narrative returned for `owner`.
    pub fn set_text(&self, owner: &str, text: &str) {
        lock(&self.texts).insert(owner.to_string(), text.to_string());
    }

    /// Makes subsequent calls fail with a 502.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of calls for `owner`.
    pub fn calls_for(&self, owner: &str) -> usize {
        lock(&self.calls).iter().filter(|o| *o == owner).count()
    }

    /// Total number of calls.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl AnalysisApi for FakeAnalysisApi {
    async fn analyze(&self, owner_id: &str) -> ApiResult<AnalysisResult> {
        lock(&self.calls).push(owner_id.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 502,
                body: "analyzer unavailable".into(),
            });
        }
        let analysis = lock(&self.texts)
            .get(owner_id)
            .cloned()
            .unwrap_or_else(|| format!("analysis of {}", owner_id));
        Ok(AnalysisResult {
            analysis,
            items: vec![],
        })
    }
}

/// Notification endpoints stand-in.
#[derive(Default)]
pub struct FakeNotificationApi {
    records: Mutex<Vec<NotificationRecord>>,
    no_bulk_clear: AtomicBool,
    missing: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
    list_latency: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeNotificationApi {
    /// Empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the server-side list.
    pub fn set_records(&self, records: Vec<NotificationRecord>) {
        *lock(&self.records) = records;
    }

    /// Server-side list.
    pub fn records(&self) -> Vec<NotificationRecord> {
        lock(&self.records).clone()
    }

    /// Makes `DELETE /notifications` answer 405.
    pub fn disable_bulk_clear(&self) {
        self.no_bulk_clear.store(true, Ordering::SeqCst);
    }

    /// Makes `DELETE /notifications/{id}` answer 404 for `id`.
    pub fn mark_missing(&self, id: &str) {
        lock(&self.missing).insert(id.to_string());
    }

    /// Makes `DELETE /notifications/{id}` answer 500 for `id`.
    pub fn fail_delete(&self, id: &str) {
        lock(&self.broken).insert(id.to_string());
    }

    /// Delays `GET /notifications`. The list is captured before the delay.
    pub fn set_list_latency(&self, latency: Duration) {
        *lock(&self.list_latency) = latency;
    }

    /// Every call, as `verb[:id]`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl NotificationApi for FakeNotificationApi {
    async fn list(&self) -> ApiResult<Vec<NotificationRecord>> {
        lock(&self.calls).push("list".into());
        let snapshot = lock(&self.records).clone();
        let latency = *lock(&self.list_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(snapshot)
    }

    async fn mark_read(&self, id: &str) -> ApiResult<()> {
        lock(&self.calls).push(format!("read:{}", id));
        let mut records = lock(&self.records);
        match records.iter_mut().find(|r| r.id == id) {
            Some(r) => {
                r.read_at = Some(Utc::now());
                Ok(())
            }
            None => Err(ApiError::NotFound),
        }
    }

    async fn mark_all_read(&self) -> ApiResult<()> {
        lock(&self.calls).push("read-all".into());
        for r in lock(&self.records).iter_mut() {
            r.read_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        lock(&self.calls).push(format!("delete:{}", id));
        if lock(&self.missing).contains(id) {
            return Err(ApiError::NotFound);
        }
        if lock(&self.broken).contains(id) {
            return Err(ApiError::Status {
                status: 500,
                body: "delete failed".into(),
            });
        }
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }

    async fn clear_all(&self) -> ApiResult<()> {
        lock(&self.calls).push("clear".into());
        if self.no_bulk_clear.load(Ordering::SeqCst) {
            return Err(ApiError::Unsupported);
        }
        lock(&self.records).clear();
        Ok(())
    }
}

/// A server notification created `minute` minutes after a fixed epoch.
pub fn record(id: &str, kind: &str, link: Option<&str>, minute: u32) -> NotificationRecord {
    NotificationRecord {
        id: id.to_string(),
        kind: kind.to_string(),
        message: format!("{} {}", kind, id),
        link: link.map(str::to_string),
        created_at: at(minute),
        read_at: None,
    }
}

/// The same record as a raw push frame.
pub fn push_frame(id: &str, kind: &str, link: &str, minute: u32) -> String {
    serde_json::json!({
        "id": id,
        "type": kind,
        "message": format!("{} {}", kind, id),
        "link": link,
        "created_at": at(minute),
    })
    .to_string()
}

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
        + chrono::Duration::minutes(i64::from(minute))
}
