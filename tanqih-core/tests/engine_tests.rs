//! End-to-end tests for the processing engine

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tanqih_core::corpus;
use tanqih_core::*;
use tempfile::TempDir;

/// Echoes input and counts calls
#[derive(Clone, Default)]
struct CountingService {
    calls: Arc<AtomicUsize>,
}

impl CleaningService for CountingService {
    fn clean(&self, request: &CleanRequest<'_>) -> std::result::Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(request.text.to_string())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Succeeds for the first `ok_calls` calls, then fails transiently forever
struct FailAfter {
    ok_calls: usize,
    calls: Arc<AtomicUsize>,
}

impl CleaningService for FailAfter {
    fn clean(&self, request: &CleanRequest<'_>) -> std::result::Result<String, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.ok_calls {
            Ok(request.text.to_string())
        } else {
            Err(ServiceError::transient("HTTP 503 service unavailable"))
        }
    }

    fn name(&self) -> &'static str {
        "fail-after"
    }
}

/// Fails every distinct chunk `failures` times before echoing it
struct Flaky {
    failures: usize,
    seen: Mutex<std::collections::HashMap<String, usize>>,
}

impl CleaningService for Flaky {
    fn clean(&self, request: &CleanRequest<'_>) -> std::result::Result<String, ServiceError> {
        let mut seen = self.seen.lock().unwrap();
        let count = seen.entry(request.text.to_string()).or_insert(0);
        *count += 1;
        if *count <= self.failures {
            Err(ServiceError::transient("HTTP 429 rate limited"))
        } else {
            Ok(request.text.to_string())
        }
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Cancels the run once chunk `at` has been recorded
struct CancelAfter {
    at: usize,
    flag: CancelFlag,
}

impl ProgressObserver for CancelAfter {
    fn chunk_finished(&self, _file: &CorpusFile, index: usize, _input_bytes: usize) {
        if index == self.at {
            self.flag.cancel();
        }
    }
}

/// Asks the engine for chunk statuses whenever a chunk starts
#[derive(Default)]
struct StatusWatcher {
    engine: OnceLock<Weak<ProcessingEngine<EchoService>>>,
    seen: Mutex<Vec<(usize, ChunkStatus, Option<ChunkStatus>)>>,
}

impl ProgressObserver for StatusWatcher {
    fn chunk_started(&self, file: &CorpusFile, index: usize) {
        let Some(engine) = self.engine.get().and_then(Weak::upgrade) else {
            return;
        };
        let current = engine.chunk_status(&file.key, index);
        let previous = index
            .checked_sub(1)
            .map(|prev| engine.chunk_status(&file.key, prev));
        self.seen.lock().unwrap().push((index, current, previous));
    }
}

struct Workspace {
    _dir: TempDir,
    corpus: PathBuf,
    cleaned: PathBuf,
    state: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let corpus = dir.path().join("corpus");
        let cleaned = dir.path().join("cleaned");
        fs::create_dir_all(&corpus).unwrap();
        Self {
            state: dir.path().join("state.json"),
            corpus,
            cleaned,
            _dir: dir,
        }
    }

    fn add(&self, name: &str, text: &str) -> PathBuf {
        let path = self.corpus.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn files(&self) -> Vec<CorpusFile> {
        corpus::discover(&self.corpus, "txt", &self.cleaned).unwrap()
    }

    fn store(&self) -> StateStore {
        StateStore::load(&self.state).unwrap()
    }

    fn output(&self, name: &str) -> String {
        fs::read_to_string(self.cleaned.join(format!("cleaned_{name}"))).unwrap()
    }
}

fn config(max_chunk_chars: usize) -> EngineConfig {
    EngineConfigBuilder::new()
        .max_chunk_chars(max_chunk_chars)
        .retry(RetryPolicy::immediate(5))
        .build()
        .unwrap()
}

fn layout_config(policy: ChunkPolicy, separator: &str) -> EngineConfig {
    EngineConfigBuilder::new()
        .max_chunk_chars(policy.max_chunk_chars)
        .lookback_percent(policy.lookback_percent)
        .chunk_separator(separator)
        .retry(RetryPolicy::immediate(5))
        .build()
        .unwrap()
}

fn arabic_text(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("هذا نص عربي للتجربة رقم {i}. "))
        .collect()
}

fn expected_output(text: &str, max_chunk_chars: usize) -> String {
    split(text, ChunkPolicy::new(max_chunk_chars))
        .map(|c| format!("{}\n", c.text))
        .collect()
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_full_run_writes_every_chunk_in_order() {
    let ws = Workspace::new();
    let text = arabic_text(200);
    let path = ws.add("a.txt", &text);

    let engine = ProcessingEngine::new(config(500), EchoService, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.outcomes[0].status, FileStatus::Completed);
    assert_eq!(ws.output("a.txt"), expected_output(&text, 500));

    let reloaded = ws.store();
    let record = reloaded.record(&key(&path)).unwrap();
    assert!(record.is_finished());
    assert_eq!(
        record.output_bytes,
        fs::metadata(&record.output_path).unwrap().len()
    );
}

#[test]
fn test_resume_after_interrupt_skips_done_chunks() {
    let ws = Workspace::new();
    let text = arabic_text(200);
    let path = ws.add("a.txt", &text);
    let total = split(&text, ChunkPolicy::new(500)).count();
    assert!(total > 4);

    let flag = CancelFlag::new();
    let engine = ProcessingEngine::new(config(500), EchoService, ws.store())
        .unwrap()
        .with_cancel_flag(flag.clone())
        .with_observer(Arc::new(CancelAfter { at: 2, flag }));
    let summary = engine.run(&ws.files()).unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.outcomes[0].chunks_done, 3);
    let store = ws.store();
    assert_eq!(store.record(&key(&path)).unwrap().last_completed_index, Some(2));
    assert_eq!(store.chunk_status(&key(&path), 2), ChunkStatus::Done);
    assert_eq!(store.chunk_status(&key(&path), 3), ChunkStatus::Pending);

    let service = CountingService::default();
    let calls = service.calls.clone();
    let engine = ProcessingEngine::new(config(500), service, store).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert!(summary.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), total - 3);
    assert_eq!(ws.output("a.txt"), expected_output(&text, 500));
}

#[test]
fn test_transient_failures_leave_no_gaps_or_duplicates() {
    let ws = Workspace::new();
    let text = arabic_text(120);
    ws.add("a.txt", &text);

    let service = Flaky {
        failures: 2,
        seen: Mutex::new(Default::default()),
    };
    let engine = ProcessingEngine::new(config(400), service, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert!(summary.is_success());
    assert_eq!(ws.output("a.txt"), expected_output(&text, 400));
}

#[test]
fn test_exhausted_retries_flag_chunk_and_stop_file() {
    let ws = Workspace::new();
    // 6400 words of five chars: 32,000 chars, three chunks of at most 15,000
    let text = "كلمة ".repeat(6400);
    assert_eq!(text.chars().count(), 32_000);
    let path = ws.add("big.txt", &text);
    let chunks: Vec<_> = split(&text, ChunkPolicy::new(15_000)).collect();
    assert_eq!(chunks.len(), 3);

    let calls = Arc::new(AtomicUsize::new(0));
    let service = FailAfter {
        ok_calls: 1,
        calls: calls.clone(),
    };
    let engine = ProcessingEngine::new(config(15_000), service, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    // one success plus five attempts at chunk 1
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, FileStatus::PartiallyFailed);
    assert_eq!(outcome.failed_chunks, vec![1]);
    assert_eq!(outcome.chunks_done, 1);
    assert!(!summary.is_success());
    assert_eq!(ws.output("big.txt"), format!("{}\n", chunks[0].text));

    let store = ws.store();
    assert_eq!(store.chunk_status(&key(&path), 1), ChunkStatus::Failed);
    assert_eq!(store.chunk_status(&key(&path), 2), ChunkStatus::Pending);

    // a later run retries the flagged chunk and finishes the file
    let engine = ProcessingEngine::new(config(15_000), EchoService, store).unwrap();
    let summary = engine.run(&ws.files()).unwrap();
    assert_eq!(summary.outcomes[0].status, FileStatus::Completed);
    assert!(summary.outcomes[0].failed_chunks.is_empty());
    assert_eq!(ws.output("big.txt"), expected_output(&text, 15_000));
}

#[test]
fn test_permanent_failure_is_not_retried() {
    struct Refuses(Arc<AtomicUsize>);
    impl CleaningService for Refuses {
        fn clean(&self, _: &CleanRequest<'_>) -> std::result::Result<String, ServiceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::permanent("HTTP 400 bad request"))
        }
        fn name(&self) -> &'static str {
            "refuses"
        }
    }

    let ws = Workspace::new();
    ws.add("a.txt", &arabic_text(10));
    let calls = Arc::new(AtomicUsize::new(0));
    let engine =
        ProcessingEngine::new(config(15_000), Refuses(calls.clone()), ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.outcomes[0].status, FileStatus::PartiallyFailed);
    assert!(summary.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("bad request"));
}

#[test]
fn test_completed_files_are_skipped() {
    let ws = Workspace::new();
    ws.add("a.txt", &arabic_text(50));

    let engine = ProcessingEngine::new(config(500), EchoService, ws.store()).unwrap();
    engine.run(&ws.files()).unwrap();

    let service = CountingService::default();
    let calls = service.calls.clone();
    let engine = ProcessingEngine::new(config(500), service, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(summary.outcomes[0].skipped);
    assert_eq!(summary.outcomes[0].status, FileStatus::Completed);
}

#[test]
fn test_unrecorded_output_tail_is_discarded() {
    let ws = Workspace::new();
    let text = arabic_text(100);
    ws.add("a.txt", &text);

    let flag = CancelFlag::new();
    let engine = ProcessingEngine::new(config(500), EchoService, ws.store())
        .unwrap()
        .with_cancel_flag(flag.clone())
        .with_observer(Arc::new(CancelAfter { at: 0, flag }));
    engine.run(&ws.files()).unwrap();

    // simulate a crash between the append and the state update
    let output = ws.cleaned.join("cleaned_a.txt");
    let mut partial = fs::read_to_string(&output).unwrap();
    partial.push_str("نصف جملة لم تسجل");
    fs::write(&output, partial).unwrap();

    let engine = ProcessingEngine::new(config(500), EchoService, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();
    assert!(summary.is_success());
    assert_eq!(ws.output("a.txt"), expected_output(&text, 500));
}

#[test]
fn test_shortened_output_restarts_file() {
    let ws = Workspace::new();
    let text = arabic_text(100);
    ws.add("a.txt", &text);

    let flag = CancelFlag::new();
    let engine = ProcessingEngine::new(config(500), EchoService, ws.store())
        .unwrap()
        .with_cancel_flag(flag.clone())
        .with_observer(Arc::new(CancelAfter { at: 1, flag }));
    engine.run(&ws.files()).unwrap();

    fs::write(ws.cleaned.join("cleaned_a.txt"), "").unwrap();

    let service = CountingService::default();
    let calls = service.calls.clone();
    let engine = ProcessingEngine::new(config(500), service, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert!(summary.is_success());
    assert_eq!(
        calls.load(Ordering::SeqCst),
        split(&text, ChunkPolicy::new(500)).count()
    );
    assert_eq!(ws.output("a.txt"), expected_output(&text, 500));
}

#[test]
fn test_changed_input_restarts_file() {
    let ws = Workspace::new();
    ws.add("a.txt", &arabic_text(40));
    let engine = ProcessingEngine::new(config(300), EchoService, ws.store()).unwrap();
    engine.run(&ws.files()).unwrap();

    let edited = arabic_text(60);
    ws.add("a.txt", &edited);
    let engine = ProcessingEngine::new(config(300), EchoService, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert!(!summary.outcomes[0].skipped);
    assert_eq!(ws.output("a.txt"), expected_output(&edited, 300));
}

#[test]
fn test_changed_chunk_size_restarts_file() {
    let ws = Workspace::new();
    let text = arabic_text(40);
    let path = ws.add("a.txt", &text);
    let engine = ProcessingEngine::new(config(300), EchoService, ws.store()).unwrap();
    engine.run(&ws.files()).unwrap();

    let engine = ProcessingEngine::new(config(700), EchoService, ws.store()).unwrap();
    engine.run(&ws.files()).unwrap();

    assert_eq!(ws.output("a.txt"), expected_output(&text, 700));
    assert_eq!(ws.store().record(&key(&path)).unwrap().max_chunk_chars, 700);
}

#[test]
fn test_changed_lookback_restarts_file() {
    let ws = Workspace::new();
    let text = "aaaa bbbb cc. dd eeee ffff gggg hhhh iiii jjjj kkkk";
    let path = ws.add("a.txt", text);
    let wide = ChunkPolicy {
        max_chunk_chars: 20,
        lookback_percent: 50,
    };
    let narrow = ChunkPolicy {
        lookback_percent: 10,
        ..wide
    };
    // same chunk count, different boundaries
    assert_eq!(split(text, wide).count(), split(text, narrow).count());
    assert_ne!(
        split(text, wide).next().unwrap().end,
        split(text, narrow).next().unwrap().end
    );

    let flag = CancelFlag::new();
    let engine = ProcessingEngine::new(layout_config(wide, "\n"), EchoService, ws.store())
        .unwrap()
        .with_cancel_flag(flag.clone())
        .with_observer(Arc::new(CancelAfter { at: 0, flag }));
    engine.run(&ws.files()).unwrap();

    let engine =
        ProcessingEngine::new(layout_config(narrow, "\n"), EchoService, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert_eq!(summary.outcomes[0].status, FileStatus::Completed);
    let expected: String = split(text, narrow)
        .map(|c| format!("{}\n", c.text))
        .collect();
    assert_eq!(ws.output("a.txt"), expected);
    let without_separators: String = ws.output("a.txt").split('\n').collect();
    assert_eq!(without_separators, text);
    assert_eq!(
        ws.store().record(&key(&path)).unwrap().lookback_percent,
        10
    );
}

#[test]
fn test_changed_separator_restarts_file() {
    let ws = Workspace::new();
    let text = arabic_text(40);
    ws.add("a.txt", &text);
    let policy = ChunkPolicy::new(300);

    let flag = CancelFlag::new();
    let engine = ProcessingEngine::new(layout_config(policy, "\n"), EchoService, ws.store())
        .unwrap()
        .with_cancel_flag(flag.clone())
        .with_observer(Arc::new(CancelAfter { at: 1, flag }));
    engine.run(&ws.files()).unwrap();

    let engine =
        ProcessingEngine::new(layout_config(policy, "\n\n"), EchoService, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert!(summary.is_success());
    let expected: String = split(&text, policy)
        .map(|c| format!("{}\n\n", c.text))
        .collect();
    assert_eq!(ws.output("a.txt"), expected);
}

#[test]
fn test_chunk_being_cleaned_is_in_progress() {
    let ws = Workspace::new();
    let text = arabic_text(40);
    let path = ws.add("a.txt", &text);
    let total = split(&text, ChunkPolicy::new(300)).count();
    assert!(total > 2);

    let watcher = Arc::new(StatusWatcher::default());
    let engine = ProcessingEngine::new(config(300), EchoService, ws.store())
        .unwrap()
        .with_observer(watcher.clone());
    let engine = Arc::new(engine);
    assert!(watcher.engine.set(Arc::downgrade(&engine)).is_ok());

    let summary = engine.run(&ws.files()).unwrap();
    assert!(summary.is_success());

    let seen = watcher.seen.lock().unwrap();
    assert_eq!(seen.len(), total);
    for (i, (index, current, previous)) in seen.iter().enumerate() {
        assert_eq!(*index, i);
        assert_eq!(*current, ChunkStatus::InProgress);
        if i > 0 {
            assert_eq!(*previous, Some(ChunkStatus::Done));
        }
    }
    assert_eq!(engine.chunk_status(&key(&path), 0), ChunkStatus::Done);
    assert_eq!(engine.chunk_status(&key(&path), total - 1), ChunkStatus::Done);
}

#[test]
fn test_unwritable_output_aborts_file_and_run_continues() {
    let ws = Workspace::new();
    let path = ws.add("a.txt", &arabic_text(40));
    let other = ws.add("b.txt", &arabic_text(20));

    let flag = CancelFlag::new();
    let engine = ProcessingEngine::new(config(300), EchoService, ws.store())
        .unwrap()
        .with_cancel_flag(flag.clone())
        .with_observer(Arc::new(CancelAfter { at: 1, flag }));
    engine.run(&ws.files()).unwrap();
    let before = ws.store().record(&key(&path)).unwrap().clone();
    assert_eq!(before.last_completed_index, Some(1));

    // a directory where the output file should be
    let output = ws.cleaned.join("cleaned_a.txt");
    fs::remove_file(&output).unwrap();
    fs::create_dir(&output).unwrap();

    let service = CountingService::default();
    let calls = service.calls.clone();
    let engine = ProcessingEngine::new(config(300), service, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    let aborted = &summary.outcomes[0];
    assert_eq!(aborted.status, FileStatus::Aborted);
    assert!(aborted
        .error
        .as_deref()
        .unwrap()
        .contains("output write failed"));
    assert_eq!(summary.outcomes[1].status, FileStatus::Completed);
    assert_eq!(summary.aborted().count(), 1);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        split(&arabic_text(20), ChunkPolicy::new(300)).count()
    );

    let store = ws.store();
    let after = store.record(&key(&path)).unwrap();
    assert_eq!(after.status, FileStatus::Aborted);
    assert_eq!(after.last_completed_index, before.last_completed_index);
    assert_eq!(after.output_bytes, before.output_bytes);
    assert_eq!(
        store.record(&key(&other)).unwrap().status,
        FileStatus::Completed
    );
}

#[test]
fn test_empty_file_completes_with_zero_chunks() {
    let ws = Workspace::new();
    let path = ws.add("empty.txt", "");

    let service = CountingService::default();
    let calls = service.calls.clone();
    let engine = ProcessingEngine::new(config(500), service, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.outcomes[0].status, FileStatus::Completed);
    assert_eq!(summary.outcomes[0].chunks_total, 0);
    assert_eq!(ws.output("empty.txt"), "");
    assert_eq!(ws.store().record(&key(&path)).unwrap().total_chunks, 0);
}

#[test]
fn test_invalid_utf8_aborts_only_that_file() {
    let ws = Workspace::new();
    fs::write(ws.corpus.join("bad.txt"), [0x68, 0x69, 0xff, 0xfe]).unwrap();
    ws.add("good.txt", &arabic_text(20));

    let engine = ProcessingEngine::new(config(500), EchoService, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    let bad = &summary.outcomes[0];
    assert_eq!(bad.status, FileStatus::Aborted);
    assert!(bad.error.as_deref().unwrap().contains("UTF-8"));
    assert_eq!(summary.outcomes[1].status, FileStatus::Completed);
    assert_eq!(summary.aborted().count(), 1);
}

#[test]
fn test_multiple_workers_process_every_file() {
    let ws = Workspace::new();
    let mut texts = Vec::new();
    for i in 0..5 {
        let text = arabic_text(30 + i * 10);
        ws.add(&format!("f{i}.txt"), &text);
        texts.push(text);
    }

    let config = EngineConfigBuilder::new()
        .max_chunk_chars(200)
        .retry(RetryPolicy::immediate(3))
        .workers(3)
        .build()
        .unwrap();
    let engine = ProcessingEngine::new(config, EchoService, ws.store()).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.outcomes.len(), 5);
    for (i, text) in texts.iter().enumerate() {
        assert_eq!(ws.output(&format!("f{i}.txt")), expected_output(text, 200));
    }
    assert_eq!(ws.store().progress().len(), 5);
}

#[test]
fn test_custom_separator_is_written_after_each_chunk() {
    let ws = Workspace::new();
    let text = arabic_text(30);
    ws.add("a.txt", &text);

    let config = EngineConfigBuilder::new()
        .max_chunk_chars(200)
        .chunk_separator("\n\n")
        .build()
        .unwrap();
    let engine = ProcessingEngine::new(config, EchoService, ws.store()).unwrap();
    engine.run(&ws.files()).unwrap();

    let expected: String = split(&text, ChunkPolicy::new(200))
        .map(|c| format!("{}\n\n", c.text))
        .collect();
    assert_eq!(ws.output("a.txt"), expected);
}

#[test]
fn test_corrupt_state_restarts_from_scratch() {
    let ws = Workspace::new();
    let text = arabic_text(60);
    ws.add("a.txt", &text);
    let engine = ProcessingEngine::new(config(300), EchoService, ws.store()).unwrap();
    engine.run(&ws.files()).unwrap();

    fs::write(&ws.state, "{\"version\": 1, \"files\": {").unwrap();
    let store = ws.store();
    assert!(matches!(store.load_outcome(), LoadOutcome::Corrupt { .. }));

    let engine = ProcessingEngine::new(config(300), EchoService, store).unwrap();
    let summary = engine.run(&ws.files()).unwrap();

    assert!(summary.is_success());
    assert!(!summary.outcomes[0].skipped);
    assert_eq!(ws.output("a.txt"), expected_output(&text, 300));
    assert!(ws.state.with_extension("json.corrupt").exists());
}
