//! In-memory tracking of asynchronous scan jobs

use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::analysis::AnalysisResult;
use crate::error::{Result, ScanError};
use crate::pipeline::ScanOutcome;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Analysis plus where the image was stored.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    pub upload: ScanOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub status: JobStatus,
    /// 0..=100
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Default)]
struct Table {
    jobs: HashMap<String, JobRecord>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
}

/// Bounded job table. When full, the oldest finished job is evicted; if
/// every tracked job is still running, new jobs are refused.
pub struct JobTracker {
    table: RwLock<Table>,
    max_jobs: usize,
}

impl JobTracker {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            max_jobs: max_jobs.max(1),
        }
    }

    /// Register a pending job and return its id.
    pub fn create(&self, metadata: serde_json::Value) -> Result<String> {
        let id = format!(
            "proc_{}_{}",
            Local::now().format("%Y%m%d_%H%M%S_%6f"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );

        let mut table = self.table.write();
        if table.jobs.len() >= self.max_jobs {
            let oldest_finished = table
                .order
                .iter()
                .position(|key| table.jobs.get(key).is_some_and(|j| j.status.is_finished()));
            match oldest_finished {
                Some(pos) => {
                    if let Some(evicted) = table.order.remove(pos) {
                        table.jobs.remove(&evicted);
                        tracing::debug!(job = %evicted, "Evicted finished job");
                    }
                }
                None => return Err(ScanError::Busy(table.jobs.len())),
            }
        }

        table.jobs.insert(
            id.clone(),
            JobRecord {
                status: JobStatus::Pending,
                progress: 0,
                result: None,
                error: None,
                timestamp: Utc::now(),
                metadata,
            },
        );
        table.order.push_back(id.clone());
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.table.read().jobs.get(id).cloned()
    }

    pub fn set_progress(&self, id: &str, status: JobStatus, progress: u8) {
        if let Some(job) = self.table.write().jobs.get_mut(id) {
            job.status = status;
            job.progress = progress.min(100);
        }
    }

    pub fn complete(&self, id: &str, report: ScanReport) {
        if let Some(job) = self.table.write().jobs.get_mut(id) {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.result = Some(report);
        }
    }

    /// Failed jobs keep the progress they reached.
    pub fn fail(&self, id: &str, error: impl Into<String>) {
        if let Some(job) = self.table.write().jobs.get_mut(id) {
            job.status = JobStatus::Failed;
            job.error = Some(error.into());
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lifecycle() {
        let tracker = JobTracker::new(10);
        let id = tracker.create(json!({"device": "ios"})).unwrap();
        assert!(id.starts_with("proc_"));

        let job = tracker.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.metadata["device"], "ios");

        tracker.set_progress(&id, JobStatus::Processing, 25);
        assert_eq!(tracker.get(&id).unwrap().status, JobStatus::Processing);

        tracker.fail(&id, "upload failed");
        let job = tracker.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 25);
        assert_eq!(job.error.as_deref(), Some("upload failed"));
    }

    #[test]
    fn test_unknown_id() {
        let tracker = JobTracker::new(10);
        assert!(tracker.get("proc_missing").is_none());
        tracker.set_progress("proc_missing", JobStatus::Processing, 50);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_evicts_oldest_finished() {
        let tracker = JobTracker::new(2);
        let first = tracker.create(json!({})).unwrap();
        let second = tracker.create(json!({})).unwrap();
        tracker.fail(&second, "boom");

        let third = tracker.create(json!({})).unwrap();
        assert_eq!(tracker.len(), 2);
        assert!(tracker.get(&first).is_some());
        assert!(tracker.get(&second).is_none());
        assert!(tracker.get(&third).is_some());
    }

    #[test]
    fn test_refuses_when_all_running() {
        let tracker = JobTracker::new(1);
        tracker.create(json!({})).unwrap();
        assert!(matches!(tracker.create(json!({})), Err(ScanError::Busy(1))));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(JobStatus::Completed).unwrap(),
            json!("completed")
        );
    }
}
