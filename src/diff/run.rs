//! Run driver: wires a past source, a next destination (or a keyed store),
//! a sink and a live stream into one diff run.
//!
//! Collaborators are checked once, in [`RunBuilder::build`]. After that a run
//! cannot fail to start; everything that goes wrong while running ends up in
//! the returned [`RunReport`].

#![allow(missing_docs)]

use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{DendrError, Result};
use crate::core::paths::SnapshotLocation;
use crate::diff::cancel::CancelToken;
use crate::diff::change::ChangeCounts;
use crate::diff::classifier::Classifier;
use crate::diff::merge::MergeComparator;
use crate::diff::sink::CollectorSink;
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::scanner::walker::{SortedWalker, WalkItem, WalkerConfig};
use crate::snapshot::codec::DecodePolicy;
use crate::snapshot::entry::FileEntry;
use crate::snapshot::reader::SnapshotReader;
use crate::snapshot::writer::SnapshotWriter;
use crate::store::{KeyedComparator, KeyedStore};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every live entry was fed and the past snapshot was drained.
    Completed,
    /// Stop was requested; the drain was skipped.
    Cancelled,
    /// A sink, read or traversal failure ended the run; the drain was skipped.
    Aborted { code: String, message: String },
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub counts: ChangeCounts,
    pub skipped_visits: u64,
    /// Malformed snapshot fields recovered under the lenient policy.
    pub field_errors: u64,
    pub past_entries_read: u64,
    /// Records persisted to the next snapshot or the keyed store.
    pub records_written: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub past_open_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_error: Option<String>,
    /// The next snapshot is missing or incomplete.
    pub next_degraded: bool,
    pub duration_ms: u64,
}

impl RunReport {
    fn new() -> Self {
        Self {
            outcome: RunOutcome::Completed,
            counts: ChangeCounts::default(),
            skipped_visits: 0,
            field_errors: 0,
            past_entries_read: 0,
            records_written: 0,
            past_open_error: None,
            next_error: None,
            next_degraded: false,
            duration_ms: 0,
        }
    }

    /// Completed with the next snapshot fully persisted.
    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Completed && !self.next_degraded
    }

    /// Process exit code: 0 clean, 1 aborted, 2 degraded, 130 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Completed if self.next_degraded => 2,
            RunOutcome::Completed => 0,
            RunOutcome::Aborted { .. } => 1,
            RunOutcome::Cancelled => 130,
        }
    }
}

enum PastSource {
    Location(SnapshotLocation),
    Reader(SnapshotReader),
}

enum NextDest {
    Location(SnapshotLocation),
    Writer(SnapshotWriter),
}

enum Backend<'a> {
    Snapshots { past: PastSource, next: NextDest },
    Keyed(Box<dyn KeyedStore + 'a>),
}

/// Collects a run's collaborators.
pub struct RunBuilder<'a> {
    past: Option<PastSource>,
    next: Option<NextDest>,
    store: Option<Box<dyn KeyedStore + 'a>>,
    sink: Option<Box<dyn CollectorSink + 'a>>,
    classifier: Classifier,
    policy: DecodePolicy,
    walker: Option<WalkerConfig>,
    log: Option<JsonlWriter>,
    config_hash: Option<String>,
    cancel: CancelToken,
}

impl Default for RunBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> RunBuilder<'a> {
    pub fn new() -> Self {
        Self {
            past: None,
            next: None,
            store: None,
            sink: None,
            classifier: Classifier::exact(),
            policy: DecodePolicy::default(),
            walker: None,
            log: None,
            config_hash: None,
            cancel: CancelToken::new(),
        }
    }

    /// Take classifier, decode policy and log destination from configuration.
    ///
    /// The config's stable hash is recorded in the `run_start` log entry.
    #[must_use]
    pub fn configure(mut self, config: &Config) -> Self {
        self.classifier = Classifier::with_mtime_tolerance_ns(config.compare.mtime_tolerance_ns);
        self.policy = config.compare.decode_policy;
        self.log = Some(JsonlWriter::from_config(&config.logging));
        self.config_hash = config.stable_hash().ok();
        self
    }

    #[must_use]
    pub fn past(mut self, location: SnapshotLocation) -> Self {
        self.past = Some(PastSource::Location(location));
        self
    }

    /// Use an already-open reader. Its own decode policy applies.
    #[must_use]
    pub fn past_reader(mut self, reader: SnapshotReader) -> Self {
        self.past = Some(PastSource::Reader(reader));
        self
    }

    #[must_use]
    pub fn next(mut self, location: SnapshotLocation) -> Self {
        self.next = Some(NextDest::Location(location));
        self
    }

    #[must_use]
    pub fn next_writer(mut self, writer: SnapshotWriter) -> Self {
        self.next = Some(NextDest::Writer(writer));
        self
    }

    /// Compare against a keyed store instead of a snapshot pair.
    #[must_use]
    pub fn store<St: KeyedStore + 'a>(mut self, store: St) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    #[must_use]
    pub fn sink<S: CollectorSink + 'a>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    #[must_use]
    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Traversal options for [`DiffRun::run`]. The root is supplied there.
    #[must_use]
    pub fn walker(mut self, config: WalkerConfig) -> Self {
        self.walker = Some(config);
        self
    }

    #[must_use]
    pub fn log(mut self, log: JsonlWriter) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate collaborators and produce a runnable diff.
    pub fn build(self) -> Result<DiffRun<'a>> {
        let Some(sink) = self.sink else {
            return Err(invalid("a run requires a collector sink"));
        };

        let backend = match (self.store, self.past, self.next) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(invalid("a keyed store cannot be combined with snapshots"));
            }
            (Some(store), None, None) => Backend::Keyed(store),
            (None, None, _) => return Err(invalid("a run requires a past snapshot")),
            (None, _, None) => return Err(invalid("a run requires a next snapshot")),
            (None, Some(past), Some(next)) => {
                if let (PastSource::Location(p), NextDest::Location(n)) = (&past, &next)
                    && p.aliases(n)
                {
                    return Err(invalid(&format!(
                        "past and next snapshots name the same file: {p}"
                    )));
                }
                Backend::Snapshots { past, next }
            }
        };

        Ok(DiffRun {
            backend,
            sink,
            classifier: self.classifier,
            policy: self.policy,
            walker: self.walker,
            log: self.log.unwrap_or_else(JsonlWriter::disabled),
            config_hash: self.config_hash,
            cancel: self.cancel,
        })
    }
}

/// A validated, ready-to-run diff. Each run consumes it.
pub struct DiffRun<'a> {
    backend: Backend<'a>,
    sink: Box<dyn CollectorSink + 'a>,
    classifier: Classifier,
    policy: DecodePolicy,
    walker: Option<WalkerConfig>,
    log: JsonlWriter,
    config_hash: Option<String>,
    cancel: CancelToken,
}

impl DiffRun<'_> {
    /// Walk `root` in sorted order and diff it.
    pub fn run(mut self, root: &Path) -> RunReport {
        let config = match self.walker.take() {
            Some(config) => WalkerConfig {
                root: root.to_path_buf(),
                ..config
            },
            None => WalkerConfig::new(root),
        };
        let walker = SortedWalker::new(config);
        self.drive(walker.walk())
    }

    /// Diff an arbitrary live stream. Entries must be in byte-wise path order.
    pub fn run_entries<I>(self, live: I) -> RunReport
    where
        I: IntoIterator<Item = FileEntry>,
    {
        self.drive(live.into_iter().map(|entry| Ok(WalkItem::File(entry))))
    }

    /// Token that stops this run when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn drive<I>(self, live: I) -> RunReport
    where
        I: Iterator<Item = Result<WalkItem>>,
    {
        let started = Instant::now();
        let Self {
            backend,
            mut sink,
            classifier,
            policy,
            walker: _,
            mut log,
            config_hash,
            cancel,
        } = self;
        let config_suffix = config_hash
            .map(|hash| format!(" config={hash}"))
            .unwrap_or_default();
        let mut report = RunReport::new();

        let stop = match backend {
            Backend::Snapshots { past, next } => {
                let mut reader = match past {
                    PastSource::Location(location) => SnapshotReader::open(&location, policy),
                    PastSource::Reader(reader) => reader,
                };
                let mut writer = match next {
                    NextDest::Location(location) => SnapshotWriter::create(&location),
                    NextDest::Writer(writer) => writer,
                };
                log.write_entry(
                    &LogEntry::new(EventType::RunStart, Severity::Info).with_details(format!(
                        "past={} next={}{config_suffix}",
                        reader.location(),
                        writer.location()
                    )),
                );
                let stop = merge_run(
                    &mut reader,
                    &mut writer,
                    &mut sink,
                    classifier,
                    live,
                    &cancel,
                    &mut log,
                    &mut report,
                );
                finish_snapshots(&mut reader, &mut writer, &mut log, &mut report);
                stop
            }
            Backend::Keyed(store) => {
                log.write_entry(
                    &LogEntry::new(EventType::RunStart, Severity::Info)
                        .with_details(format!("keyed store{config_suffix}")),
                );
                let mut cmp = KeyedComparator::new(store, &mut sink, classifier);
                let stop = pump(live, &cancel, &mut log, &mut report, |entry, _| {
                    cmp.visit(&entry).map(|_| ())
                });
                report.counts = cmp.counts();
                report.records_written = cmp.records_written();
                match (cmp.finish(), stop) {
                    (Err(err), Stop::Drained | Stop::Cancelled) => Stop::Failed(err),
                    (_, stop) => stop,
                }
            }
        };

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let entry = match stop {
            Stop::Drained => {
                report.outcome = RunOutcome::Completed;
                let severity = if report.next_degraded {
                    Severity::Warning
                } else {
                    Severity::Info
                };
                LogEntry::new(EventType::RunComplete, severity)
            }
            Stop::Cancelled => {
                report.outcome = RunOutcome::Cancelled;
                LogEntry::new(EventType::RunCancelled, Severity::Warning)
            }
            Stop::Failed(err) => {
                report.outcome = RunOutcome::Aborted {
                    code: err.code().to_string(),
                    message: err.to_string(),
                };
                LogEntry::new(EventType::RunAborted, Severity::Critical).with_error(&err)
            }
        };
        log.write_entry(
            &entry
                .with_counts(report.counts)
                .with_duration_ms(report.duration_ms),
        );
        log.flush();
        report
    }
}

impl std::fmt::Debug for DiffRun<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Snapshots { .. } => "snapshots",
            Backend::Keyed(_) => "keyed",
        };
        f.debug_struct("DiffRun")
            .field("backend", &backend)
            .field("classifier", &self.classifier)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Why feeding stopped.
enum Stop {
    Drained,
    Cancelled,
    Failed(DendrError),
}

#[allow(clippy::too_many_arguments)]
fn merge_run<I, S>(
    reader: &mut SnapshotReader,
    writer: &mut SnapshotWriter,
    sink: S,
    classifier: Classifier,
    live: I,
    cancel: &CancelToken,
    log: &mut JsonlWriter,
    report: &mut RunReport,
) -> Stop
where
    I: Iterator<Item = Result<WalkItem>>,
    S: CollectorSink,
{
    if let Some(err) = reader.open_error() {
        report.past_open_error = Some(err.to_string());
        log.write_entry(
            &LogEntry::new(EventType::SnapshotOpenFailed, Severity::Warning)
                .with_path(reader.location())
                .with_error(err),
        );
    }
    report_writer_error(writer, log);

    let mut cmp = match MergeComparator::new(reader, writer, sink, classifier) {
        Ok(cmp) => cmp,
        Err(err) => return Stop::Failed(err),
    };
    let stop = pump(live, cancel, log, report, |entry, log| {
        let visited = cmp.visit(entry);
        report_writer_error(cmp.writer_mut(), log);
        visited
    });
    let stop = match stop {
        Stop::Drained => match cmp.drain() {
            Ok(()) => Stop::Drained,
            Err(err) => Stop::Failed(err),
        },
        other => other,
    };
    report.counts = cmp.counts();
    stop
}

/// Close both snapshots and fold their final state into the report.
fn finish_snapshots(
    reader: &mut SnapshotReader,
    writer: &mut SnapshotWriter,
    log: &mut JsonlWriter,
    report: &mut RunReport,
) {
    report.past_entries_read = reader.entries_read();
    report.field_errors = reader.field_errors();
    reader.close();
    if report.field_errors > 0 {
        log.write_entry(
            &LogEntry::new(EventType::FieldDecodeFailed, Severity::Warning)
                .with_path(reader.location())
                .with_details(format!("{} malformed field(s) recovered", report.field_errors)),
        );
    }

    report.records_written = writer.finish();
    report_writer_error(writer, log);
    report.next_degraded = writer.is_degraded();
    report.next_error = writer.error().map(ToString::to_string);
}

fn report_writer_error(writer: &mut SnapshotWriter, log: &mut JsonlWriter) {
    let location = writer.location().to_string();
    if let Some(err) = writer.take_unreported_error() {
        let event = if matches!(err, DendrError::SnapshotOpen { .. }) {
            EventType::SnapshotOpenFailed
        } else {
            EventType::SnapshotWriteFailed
        };
        log.write_entry(
            &LogEntry::new(event, Severity::Warning)
                .with_path(location)
                .with_error(err),
        );
    }
}

/// Feed live entries to `visit` until the stream ends, a stop is requested or
/// something fails. Cancellation is checked before each entry is pulled.
fn pump<I, F>(
    mut live: I,
    cancel: &CancelToken,
    log: &mut JsonlWriter,
    report: &mut RunReport,
    mut visit: F,
) -> Stop
where
    I: Iterator<Item = Result<WalkItem>>,
    F: FnMut(FileEntry, &mut JsonlWriter) -> Result<()>,
{
    loop {
        if cancel.is_cancelled() {
            return Stop::Cancelled;
        }
        match live.next() {
            None => break,
            Some(Ok(WalkItem::File(entry))) => {
                if let Err(err) = visit(entry, log) {
                    return Stop::Failed(err);
                }
            }
            Some(Ok(WalkItem::Skipped(skip))) => {
                report.skipped_visits += 1;
                log.write_entry(
                    &LogEntry::new(EventType::VisitSkipped, Severity::Warning)
                        .with_path(skip.path.to_string_lossy())
                        .with_error(&skip.error),
                );
            }
            Some(Err(err)) => return Stop::Failed(err),
        }
    }
    if cancel.is_cancelled() {
        Stop::Cancelled
    } else {
        Stop::Drained
    }
}

fn invalid(details: &str) -> DendrError {
    DendrError::InvalidConfig {
        details: details.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::change::{Change, ChangeEvent};
    use crate::diff::sink::{CountingSink, VecSink};
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;

    fn e(path: &str, size: i64) -> FileEntry {
        FileEntry::new(path, size, Utc.timestamp_opt(1_700_000_000, 0).single().unwrap())
    }

    fn past_of(entries: &[FileEntry]) -> SnapshotReader {
        let text: String = entries
            .iter()
            .map(|entry| crate::snapshot::codec::SnapshotCodec::default().encode(entry))
            .collect();
        SnapshotReader::from_reader(Cursor::new(text.into_bytes()), "past", DecodePolicy::Strict)
    }

    fn null_writer() -> SnapshotWriter {
        SnapshotWriter::from_writer(std::io::sink(), "next")
    }

    #[test]
    fn build_requires_sink() {
        let err = RunBuilder::new()
            .past_reader(past_of(&[]))
            .next_writer(null_writer())
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "DDR-1001");
        assert!(err.to_string().contains("collector sink"));
    }

    #[test]
    fn build_requires_both_snapshots() {
        let err = RunBuilder::new()
            .sink(CountingSink::default())
            .next_writer(null_writer())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("past snapshot"));

        let err = RunBuilder::new()
            .sink(CountingSink::default())
            .past_reader(past_of(&[]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("next snapshot"));
    }

    #[test]
    fn build_rejects_aliased_snapshots() {
        let tmp = tempfile::tempdir().unwrap();
        let same = tmp.path().join("x.inventory");
        let err = RunBuilder::new()
            .sink(CountingSink::default())
            .past(SnapshotLocation::File(same.clone()))
            .next(SnapshotLocation::File(tmp.path().join(".").join("x.inventory")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("same file"));
    }

    #[test]
    fn build_rejects_store_with_snapshots() {
        let err = RunBuilder::new()
            .sink(CountingSink::default())
            .store(crate::store::MemoryStore::new())
            .past_reader(past_of(&[]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cannot be combined"));
    }

    #[test]
    fn completed_run_reports_counts() {
        let mut sink = VecSink::new();
        let report = RunBuilder::new()
            .past_reader(past_of(&[e("a", 1), e("b", 1), e("d", 1)]))
            .next_writer(null_writer())
            .sink(&mut sink)
            .build()
            .unwrap()
            .run_entries(vec![e("b", 1), e("c", 1), e("d", 2)]);

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.exit_code(), 0);
        assert!(report.is_clean());
        assert_eq!(report.counts.removed, 1);
        assert_eq!(report.counts.added, 1);
        assert_eq!(report.counts.unchanged, 1);
        assert_eq!(report.counts.stats_changed, 1);
        assert_eq!(report.past_entries_read, 3);
        assert_eq!(report.records_written, 3);
        assert_eq!(sink.events.len(), 4);
    }

    #[test]
    fn missing_past_is_reported_and_everything_is_added() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = VecSink::new();
        let report = RunBuilder::new()
            .past(SnapshotLocation::File(tmp.path().join("absent.inventory")))
            .next_writer(null_writer())
            .sink(&mut sink)
            .build()
            .unwrap()
            .run_entries(vec![e("a", 1), e("b", 1)]);

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.past_open_error.as_deref().unwrap().contains("DDR-2001"));
        assert_eq!(report.counts.added, 2);
        assert!(sink.events.iter().all(|ev| ev.change == Change::Added));
    }

    #[test]
    fn pre_cancelled_run_feeds_nothing_and_skips_drain() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = VecSink::new();
        let report = RunBuilder::new()
            .past_reader(past_of(&[e("a", 1)]))
            .next_writer(null_writer())
            .sink(&mut sink)
            .cancel_token(cancel)
            .build()
            .unwrap()
            .run_entries(vec![e("b", 1)]);

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.exit_code(), 130);
        assert!(sink.events.is_empty());
        assert_eq!(report.records_written, 0);
    }

    /// Cancels the shared token after the first event.
    struct CancelAfterFirst {
        token: CancelToken,
        seen: usize,
    }

    impl CollectorSink for CancelAfterFirst {
        fn record(&mut self, _event: &ChangeEvent) -> Result<()> {
            self.seen += 1;
            self.token.cancel();
            Ok(())
        }
    }

    #[test]
    fn cancellation_mid_run_leaves_prefix() {
        let token = CancelToken::new();
        let mut sink = CancelAfterFirst {
            token: token.clone(),
            seen: 0,
        };
        let report = RunBuilder::new()
            .past_reader(past_of(&[e("z", 1)]))
            .next_writer(null_writer())
            .sink(&mut sink)
            .cancel_token(token)
            .build()
            .unwrap()
            .run_entries(vec![e("a", 1), e("b", 1), e("c", 1)]);

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(sink.seen, 1);
        assert_eq!(report.records_written, 1);
        // "z" is never drained.
        assert_eq!(report.counts.removed, 0);
    }

    struct FailOn(&'static str);

    impl CollectorSink for FailOn {
        fn record(&mut self, event: &ChangeEvent) -> Result<()> {
            if event.path == self.0 {
                return Err(DendrError::Sink {
                    details: format!("refused {}", event.path),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn sink_failure_aborts_without_drain() {
        let report = RunBuilder::new()
            .past_reader(past_of(&[e("y", 1), e("z", 1)]))
            .next_writer(null_writer())
            .sink(FailOn("b"))
            .build()
            .unwrap()
            .run_entries(vec![e("a", 1), e("b", 1), e("c", 1)]);

        let RunOutcome::Aborted { code, message } = &report.outcome else {
            panic!("expected abort, got {:?}", report.outcome);
        };
        assert_eq!(code, "DDR-3003");
        assert!(message.contains("refused b"));
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.counts.removed, 0);
        assert_eq!(report.records_written, 2);
    }

    #[test]
    fn strict_decode_error_aborts() {
        let reader = SnapshotReader::from_reader(
            Cursor::new(b"a\ts1\tt2020-01-01T00:00:00Z\nb\tsNaN\n".to_vec()),
            "past",
            DecodePolicy::Strict,
        );
        let report = RunBuilder::new()
            .past_reader(reader)
            .next_writer(null_writer())
            .sink(CountingSink::default())
            .build()
            .unwrap()
            .run_entries(vec![e("c", 1)]);

        let RunOutcome::Aborted { code, .. } = &report.outcome else {
            panic!("expected abort, got {:?}", report.outcome);
        };
        assert_eq!(code, "DDR-2002");
    }

    #[test]
    fn degraded_writer_still_completes_with_exit_two() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let report = RunBuilder::new()
            .past_reader(past_of(&[]))
            .next(SnapshotLocation::File(blocker.join("next.inventory")))
            .sink(CountingSink::default())
            .build()
            .unwrap()
            .run_entries(vec![e("a", 1)]);

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.next_degraded);
        assert!(report.next_error.is_some());
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.counts.added, 1);
    }

    #[test]
    fn run_events_are_logged() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("run.jsonl");
        let log = JsonlWriter::open(crate::logger::jsonl::JsonlConfig {
            path: log_path.clone(),
            fallback_path: None,
        });
        let report = RunBuilder::new()
            .past(SnapshotLocation::File(tmp.path().join("absent")))
            .next_writer(null_writer())
            .sink(CountingSink::default())
            .log(log)
            .build()
            .unwrap()
            .run_entries(vec![e("a", 1)]);
        assert!(report.is_clean());

        let events: Vec<String> = std::fs::read_to_string(&log_path)
            .unwrap()
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["event"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(events, vec!["run_start", "snapshot_open_failed", "run_complete"]);
    }

    #[test]
    fn run_start_records_config_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("run.jsonl");
        let mut config = Config::default();
        config.logging.jsonl_log = Some(log_path.clone());
        let hash = config.stable_hash().unwrap();

        RunBuilder::new()
            .configure(&config)
            .past_reader(past_of(&[]))
            .next_writer(null_writer())
            .sink(CountingSink::default())
            .build()
            .unwrap()
            .run_entries(vec![e("a", 1)]);

        let raw = std::fs::read_to_string(&log_path).unwrap();
        let first: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(first["event"], "run_start");
        let details = first["details"].as_str().unwrap();
        assert!(details.ends_with(&format!(" config={hash}")), "{details}");
    }

    #[test]
    fn keyed_run_through_builder() {
        let mut store = crate::store::MemoryStore::new();
        for expected in [Change::Added, Change::Unchanged] {
            let mut sink = VecSink::new();
            let report = RunBuilder::new()
                .store(&mut store)
                .sink(&mut sink)
                .build()
                .unwrap()
                .run_entries(vec![e("/b", 1), e("/a", 1)]);
            assert_eq!(report.outcome, RunOutcome::Completed);
            assert_eq!(report.records_written, 2);
            assert!(sink.events.iter().all(|ev| ev.change == expected));
        }
    }

    #[test]
    fn report_serializes_outcome_tag() {
        let mut report = RunReport::new();
        report.outcome = RunOutcome::Aborted {
            code: "DDR-3001".to_string(),
            message: "gone".to_string(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "aborted");
        assert_eq!(json["outcome"]["code"], "DDR-3001");
        assert!(json.get("past_open_error").is_none());
    }
}
