use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod token;

/// One stored object as seen by a listing. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub key: String,
    pub size: u64,
    pub e_tag: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl ObjectRecord {
    pub fn new(
        key: impl Into<String>,
        size: u64,
        e_tag: Option<String>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            size,
            e_tag,
            last_modified,
        }
    }
}

/// Point-in-time snapshot of one bucket at one endpoint, keyed by object key.
///
/// Built once from a fully drained listing and never mutated afterward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    bucket: String,
    records: BTreeMap<String, ObjectRecord>,
}

impl Inventory {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn from_records<I>(bucket: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator<Item = ObjectRecord>,
    {
        Self {
            bucket: bucket.into(),
            records: records
                .into_iter()
                .map(|record| (record.key.clone(), record))
                .collect(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn get(&self, key: &str) -> Option<&ObjectRecord> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.records.values().map(|record| record.size).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CopyNew,
    CopyChanged,
    Skip,
    DeleteExtraneous,
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::CopyNew => "copy_new",
            ActionKind::CopyChanged => "copy_changed",
            ActionKind::Skip => "skip",
            ActionKind::DeleteExtraneous => "delete_extraneous",
        };
        f.write_str(name)
    }
}

/// The decision taken for a single key.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CopyNew(ObjectRecord),
    CopyChanged {
        source: ObjectRecord,
        target: ObjectRecord,
    },
    Skip(ObjectRecord),
    DeleteExtraneous(ObjectRecord),
}

impl Action {
    pub fn key(&self) -> &str {
        match self {
            Action::CopyNew(record)
            | Action::Skip(record)
            | Action::DeleteExtraneous(record) => &record.key,
            Action::CopyChanged { source, .. } => &source.key,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::CopyNew(_) => ActionKind::CopyNew,
            Action::CopyChanged { .. } => ActionKind::CopyChanged,
            Action::Skip(_) => ActionKind::Skip,
            Action::DeleteExtraneous(_) => ActionKind::DeleteExtraneous,
        }
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, Action::CopyNew(_) | Action::CopyChanged { .. })
    }
}

/// Ordered actions for one bucket pair. Consumed once by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub bucket: String,
    pub actions: Vec<Action>,
}

impl SyncPlan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions
            .iter()
            .filter(|action| action.kind() == kind)
            .count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(Action::key)
    }

    pub fn is_all_skip(&self) -> bool {
        self.actions
            .iter()
            .all(|action| action.kind() == ActionKind::Skip)
    }

    pub fn transfer_size(&self) -> u64 {
        self.actions
            .iter()
            .map(|action| match action {
                Action::CopyNew(source) | Action::CopyChanged { source, .. } => source.size,
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    TransientExhausted,
    Permanent,
    Cancelled,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::TransientExhausted => "transient-exhausted",
            FailureKind::Permanent => "permanent",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferResult {
    Succeeded,
    Failed { kind: FailureKind, message: String },
    SkippedByPolicy,
}

/// Result message sent from a worker to the report aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub key: String,
    pub kind: ActionKind,
    pub result: TransferResult,
    pub bytes: u64,
}

impl ActionOutcome {
    pub fn new(
        key: impl Into<String>,
        kind: ActionKind,
        result: TransferResult,
        bytes: u64,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            result,
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectFailure {
    pub key: String,
    pub action: ActionKind,
    pub kind: FailureKind,
    pub message: String,
}

/// Per-bucket outcome counts. Written only by the report aggregator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub bucket: String,
    pub copied: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes_transferred: u64,
    pub failures: Vec<ObjectFailure>,
    pub not_dispatched: u64,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: ActionOutcome) {
        match outcome.result {
            TransferResult::Succeeded => match outcome.kind {
                ActionKind::CopyNew | ActionKind::CopyChanged => {
                    self.copied += 1;
                    self.bytes_transferred += outcome.bytes;
                }
                ActionKind::DeleteExtraneous => self.deleted += 1,
                ActionKind::Skip => self.skipped += 1,
            },
            TransferResult::SkippedByPolicy => self.skipped += 1,
            TransferResult::Failed { kind, message } => {
                self.failed += 1;
                self.failures.push(ObjectFailure {
                    key: outcome.key,
                    action: outcome.kind,
                    kind,
                    message,
                });
            }
        }
    }

    pub fn processed(&self) -> u64 {
        self.copied + self.deleted + self.skipped + self.failed
    }

    pub fn has_failure(&self) -> bool {
        0 < self.failed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketError {
    pub bucket: String,
    pub message: String,
}

/// Outcome of a whole run across every selected bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub bucket_reports: Vec<SyncReport>,
    pub bucket_errors: Vec<BucketError>,
    pub excluded_buckets: Vec<String>,
    pub buckets_created: u64,
    pub cancelled: bool,
}

impl RunReport {
    pub fn has_failure(&self) -> bool {
        !self.bucket_errors.is_empty() || self.bucket_reports.iter().any(SyncReport::has_failure)
    }

    pub fn buckets_processed(&self) -> u64 {
        self.bucket_reports.len() as u64
    }

    pub fn buckets_skipped(&self) -> u64 {
        self.bucket_errors.len() as u64
    }

    pub fn copied(&self) -> u64 {
        self.bucket_reports.iter().map(|report| report.copied).sum()
    }

    pub fn deleted(&self) -> u64 {
        self.bucket_reports.iter().map(|report| report.deleted).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.bucket_reports.iter().map(|report| report.skipped).sum()
    }

    pub fn failed(&self) -> u64 {
        self.bucket_reports.iter().map(|report| report.failed).sum()
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bucket_reports
            .iter()
            .map(|report| report.bytes_transferred)
            .sum()
    }

    pub fn report(&self, bucket: &str) -> Option<&SyncReport> {
        self.bucket_reports
            .iter()
            .find(|report| report.bucket == bucket)
    }
}

#[derive(Debug, PartialEq)]
pub enum SyncStatistics {
    SyncBytes(u64),
    SyncComplete { key: String },
    SyncSkip { key: String },
    SyncDelete { key: String },
    SyncError { key: String },
    SyncWarning { key: String },
    ETagVerified { key: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
