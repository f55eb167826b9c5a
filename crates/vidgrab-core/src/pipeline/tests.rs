use super::*;
use crate::control::RunFlag;
use crate::error_code::{ErrorCode, NegotiationError};
use crate::hls::{EngineOutcome, MergeError, SegmentListener};
use crate::host::QueueHost;
use crate::model::{Delivery, DownloadItem, ItemKind, QualityCandidate};
use crate::naming::partial_path;
use crate::negotiate::NegotiationRequest;
use crate::session::{AbandonReason, SessionState};
use crate::store::{DownloadRecord, MemoryRecordStore, NewRecord};
use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;

type Negotiated = Result<Vec<QualityCandidate>, NegotiationError>;

/// Replays scripted results; the last one repeats.
struct ScriptedNegotiator {
    script: Mutex<VecDeque<Negotiated>>,
    requests: Mutex<Vec<(bool, bool)>>,
    premium: Option<Mutex<VecDeque<bool>>>,
}

impl ScriptedNegotiator {
    fn new(script: Vec<Negotiated>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            premium: None,
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl QualityNegotiator for ScriptedNegotiator {
    fn negotiate(&self, req: &NegotiationRequest<'_>, _running: &dyn Fn() -> bool) -> Negotiated {
        self.requests
            .lock()
            .unwrap()
            .push((req.continuation, req.premium));
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }

    fn supports_premium(&self) -> bool {
        self.premium.is_some()
    }

    fn premium_login(&self) -> Result<(), NegotiationError> {
        let ok = self
            .premium
            .as_ref()
            .and_then(|p| p.lock().unwrap().pop_front())
            .unwrap_or(false);
        if ok {
            Ok(())
        } else {
            Err(ErrorCode::SimpleModeFailed.into())
        }
    }
}

/// Serves `size` bytes of 0xAB for every URL.
struct FakeSource {
    size: u64,
    probes: Mutex<Vec<bool>>,
    offsets: Mutex<Vec<u64>>,
    stop_after: Option<u64>,
}

impl FakeSource {
    fn new(size: u64) -> Self {
        Self {
            size,
            probes: Mutex::new(Vec::new()),
            offsets: Mutex::new(Vec::new()),
            stop_after: None,
        }
    }
}

impl ProgressiveSource for FakeSource {
    fn probe_size(&self, _url: &str, use_head: bool) -> u64 {
        self.probes.lock().unwrap().push(use_head);
        self.size
    }

    fn stream_to_file(
        &self,
        _url: &str,
        dest: &Path,
        resume_offset: u64,
        _running: &dyn Fn() -> bool,
        on_progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<StreamOutcome, TransferError> {
        self.offsets.lock().unwrap().push(resume_offset);
        fs::create_dir_all(dest.parent().unwrap())?;
        let end = self.stop_after.unwrap_or(self.size);
        let mut data = fs::read(dest).unwrap_or_default();
        data.resize(end as usize, 0xAB);
        fs::write(dest, &data)?;
        on_progress(&TransferProgress {
            transferred: end,
            total: self.size,
            speed: 1000.0,
        });
        if self.stop_after.is_some() {
            return Ok(StreamOutcome::Stopped { bytes: end });
        }
        Ok(StreamOutcome::Completed { bytes: end })
    }
}

/// Writes 8 KiB per track; URLs containing "bad" fail.
struct FakeEngine;

impl SegmentEngine for FakeEngine {
    fn download(
        &self,
        manifest_url: &str,
        dest: &Path,
        listener: &mut dyn SegmentListener,
        _running: &(dyn Fn() -> bool + Sync),
    ) -> EngineOutcome {
        fs::write(dest, vec![1u8; 8192]).unwrap();
        if manifest_url.contains("bad") {
            return EngineOutcome::Failed("segment 3: HTTP 404".to_string());
        }
        listener.on_progress(100.0, Some(0));
        EngineOutcome::Finished
    }
}

struct FakeMuxer {
    available: bool,
    merges: Mutex<u32>,
}

impl Muxer for FakeMuxer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MergeError> {
        *self.merges.lock().unwrap() += 1;
        let mut data = fs::read(video)?;
        data.extend(fs::read(audio)?);
        fs::write(output, data)?;
        Ok(())
    }
}

struct FlatNamer(PathBuf);

impl PathNamer for FlatNamer {
    fn destination(&self, item: &DownloadItem, secondary: bool) -> PathBuf {
        let suffix = if secondary { "-part2" } else { "" };
        self.0.join(format!("{}{}.mp4", item.slug, suffix))
    }
}

fn item(kind: ItemKind) -> DownloadItem {
    DownloadItem {
        id: 1,
        slug: "show-s01e01".to_string(),
        series: "Show".to_string(),
        name: "Show S01E01".to_string(),
        kind,
        season: Some(1),
        episode: Some(1),
    }
}

fn progressive(q: Quality) -> QualityCandidate {
    QualityCandidate::progressive(q, format!("https://cdn.example/{}.mp4", q))
}

struct Harness {
    dir: tempfile::TempDir,
    store: Arc<MemoryRecordStore>,
    host: Arc<QueueHost>,
    running: RunFlag,
    negotiator: Arc<ScriptedNegotiator>,
    source: Arc<FakeSource>,
    muxer: Arc<FakeMuxer>,
    settings: PipelineSettings,
}

/// Forwards to a shared fake so tests can inspect it after the run.
struct Shared<T>(Arc<T>);

impl<T: QualityNegotiator> QualityNegotiator for Shared<T> {
    fn negotiate(&self, req: &NegotiationRequest<'_>, running: &dyn Fn() -> bool) -> Negotiated {
        self.0.negotiate(req, running)
    }
    fn supports_premium(&self) -> bool {
        self.0.supports_premium()
    }
    fn premium_login(&self) -> Result<(), NegotiationError> {
        self.0.premium_login()
    }
}

impl<T: ProgressiveSource> ProgressiveSource for Shared<T> {
    fn probe_size(&self, url: &str, use_head: bool) -> u64 {
        self.0.probe_size(url, use_head)
    }
    fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        resume_offset: u64,
        running: &dyn Fn() -> bool,
        on_progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<StreamOutcome, TransferError> {
        self.0.stream_to_file(url, dest, resume_offset, running, on_progress)
    }
}

impl<T: Muxer> Muxer for Shared<T> {
    fn is_available(&self) -> bool {
        self.0.is_available()
    }
    fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MergeError> {
        self.0.merge(video, audio, output)
    }
}

impl Harness {
    fn new(script: Vec<Negotiated>, source: FakeSource) -> Self {
        let running = RunFlag::new();
        Self {
            dir: tempfile::tempdir().unwrap(),
            store: Arc::new(MemoryRecordStore::new()),
            host: Arc::new(QueueHost::new(vec![], running.clone())),
            running,
            negotiator: Arc::new(ScriptedNegotiator::new(script)),
            source: Arc::new(source),
            muxer: Arc::new(FakeMuxer {
                available: true,
                merges: Mutex::new(0),
            }),
            settings: PipelineSettings {
                preferred: Quality::P1080,
                quality_override: None,
                ceilings: Ceilings {
                    general: 3,
                    quality_detection: 2,
                    premium_login: 2,
                    segmented: 1,
                    file_size: 4,
                },
                min_plausible_size: 1024,
                transient_backoff: RetryPolicy {
                    max_attempts: 1,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(1),
                },
            },
        }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline {
            store: self.store.clone(),
            host: self.host.clone(),
            negotiator: Box::new(Shared(self.negotiator.clone())),
            source: Box::new(Shared(self.source.clone())),
            engine: Box::new(FakeEngine),
            muxer: Box::new(Shared(self.muxer.clone())),
            namer: Box::new(FlatNamer(self.dir.path().to_path_buf())),
            settings: self.settings.clone(),
        }
    }

    fn dest(&self, secondary: bool) -> PathBuf {
        FlatNamer(self.dir.path().to_path_buf()).destination(&item(ItemKind::Episode), secondary)
    }

    fn records(&self) -> Vec<DownloadRecord> {
        self.store.list().unwrap()
    }

    fn record(&self, quality: Quality) -> Option<DownloadRecord> {
        self.records().into_iter().find(|r| r.quality == quality)
    }

    /// Unfinished primary record at `quality`, as left by an interrupted run.
    fn interrupted(&self, quality: Quality) -> DownloadRecord {
        self.store
            .create(&NewRecord {
                slug: "show-s01e01".to_string(),
                name: "Show S01E01".to_string(),
                quality,
                path: self.dest(false),
            })
            .unwrap()
    }
}

#[test]
fn progressive_download_completes_item() {
    let h = Harness::new(
        vec![Ok(vec![progressive(Quality::P720), progressive(Quality::P1080)])],
        FakeSource::new(4096),
    );
    let state = h.pipeline().process(item(ItemKind::Episode));
    assert_eq!(state, SessionState::Done);
    assert_eq!(fs::metadata(h.dest(false)).unwrap().len(), 4096);

    let records = h.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quality, Quality::P1080);
    assert!(records[0].completed && !records[0].queued && !records[0].downloading);
    assert_eq!(h.host.finished(), 1);
    assert_eq!(h.host.in_progress(), 0);
    // First probe is a HEAD.
    assert!(h.source.probes.lock().unwrap()[0]);
}

#[test]
fn partial_file_resumes_from_its_length() {
    let h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], FakeSource::new(4096));
    h.interrupted(Quality::P1080);
    let part = partial_path(&h.dest(false), Quality::P1080, Delivery::Progressive);
    fs::write(&part, vec![0xAB; 1500]).unwrap();

    assert_eq!(h.pipeline().process(item(ItemKind::Episode)), SessionState::Done);
    assert_eq!(*h.source.offsets.lock().unwrap(), vec![1500]);
    assert_eq!(fs::metadata(h.dest(false)).unwrap().len(), 4096);
    assert!(!part.exists());
    assert!(h.record(Quality::P1080).unwrap().completed);
}

#[test]
fn partial_of_another_quality_is_never_spliced() {
    let h = Harness::new(vec![Ok(vec![progressive(Quality::P720)])], FakeSource::new(4096));
    h.interrupted(Quality::P1080);
    let stale = partial_path(&h.dest(false), Quality::P1080, Delivery::Progressive);
    fs::write(&stale, vec![0x10; 2000]).unwrap();

    assert_eq!(h.pipeline().process(item(ItemKind::Episode)), SessionState::Done);
    assert_eq!(*h.source.offsets.lock().unwrap(), vec![0]);
    assert_eq!(fs::read(h.dest(false)).unwrap(), vec![0xAB; 4096]);
    assert!(h.record(Quality::P720).unwrap().completed);
    assert!(!h.record(Quality::P1080).unwrap().completed);
    // The other tier's bytes stay for its own record.
    assert_eq!(fs::metadata(&stale).unwrap().len(), 2000);
}

#[test]
fn partial_without_an_unfinished_record_starts_over() {
    let h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], FakeSource::new(4096));
    let part = partial_path(&h.dest(false), Quality::P1080, Delivery::Progressive);
    fs::write(&part, vec![0x10; 2000]).unwrap();

    assert_eq!(h.pipeline().process(item(ItemKind::Episode)), SessionState::Done);
    assert_eq!(*h.source.offsets.lock().unwrap(), vec![0]);
    assert_eq!(fs::read(h.dest(false)).unwrap(), vec![0xAB; 4096]);
}

#[test]
fn interrupted_progressive_bytes_are_not_a_finished_manifest_download() {
    let mut source = FakeSource::new(4096);
    source.stop_after = Some(2000);
    let h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], source);
    assert_eq!(h.pipeline().process(item(ItemKind::Episode)), SessionState::Done);
    assert!(!h.dest(false).exists());

    h.negotiator.script.lock().unwrap().clear();
    h.negotiator
        .script
        .lock()
        .unwrap()
        .push_back(Ok(vec![QualityCandidate::manifest(
            Quality::P1080,
            "https://cdn.example/v.m3u8",
            None,
        )]));
    assert_eq!(h.pipeline().process(item(ItemKind::Episode)), SessionState::Done);
    assert_eq!(fs::read(h.dest(false)).unwrap(), vec![1u8; 8192]);
    let rec = h.record(Quality::P1080).unwrap();
    assert!(rec.completed);
    assert_eq!(rec.size, 8192);
}

#[test]
fn implausible_size_drops_candidate_without_creating_file() {
    let mut h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], FakeSource::new(0));
    h.settings.ceilings.general = 1;
    let state = h.pipeline().process(item(ItemKind::Episode));

    assert_eq!(state, SessionState::Abandoned(AbandonReason::RetryCeiling));
    assert!(!h.dest(false).exists());
    assert_eq!(*h.source.probes.lock().unwrap(), vec![true, false, true, false]);
    assert!(h.source.offsets.lock().unwrap().is_empty());
    assert_eq!(h.negotiator.calls(), 1);
}

#[test]
fn merge_tool_missing_at_negotiation_finishes_immediately() {
    let h = Harness::new(
        vec![Err(ErrorCode::ExternalMergeToolMissing.into())],
        FakeSource::new(4096),
    );
    let state = h.pipeline().process(item(ItemKind::Episode));
    assert_eq!(
        state,
        SessionState::Abandoned(AbandonReason::Terminal(ErrorCode::ExternalMergeToolMissing))
    );
    assert_eq!(h.negotiator.calls(), 1);
    assert_eq!(h.host.in_progress(), 0);
    assert!(h.records().is_empty());
}

#[test]
fn missing_muxer_for_paired_audio_is_terminal() {
    let mut h = Harness::new(
        vec![Ok(vec![QualityCandidate::manifest(
            Quality::P1080,
            "https://cdn.example/v.m3u8",
            Some("https://cdn.example/a.m3u8".to_string()),
        )])],
        FakeSource::new(4096),
    );
    h.muxer = Arc::new(FakeMuxer {
        available: false,
        merges: Mutex::new(0),
    });
    let state = h.pipeline().process(item(ItemKind::Episode));
    assert!(matches!(state, SessionState::Abandoned(AbandonReason::Terminal(_))));
    assert!(h.records().is_empty());
}

#[test]
fn quick_skip_never_negotiates() {
    let mut h = Harness::new(vec![Ok(vec![progressive(Quality::P720)])], FakeSource::new(4096));
    h.settings.quality_override = Some(Quality::P720);
    let rec = h
        .store
        .create(&crate::store::NewRecord {
            slug: "show-s01e01".to_string(),
            name: "Show S01E01".to_string(),
            quality: Quality::P720,
            path: h.dest(false),
        })
        .unwrap();
    h.store
        .update(&DownloadRecord {
            completed: true,
            ..rec
        })
        .unwrap();

    assert_eq!(h.pipeline().process(item(ItemKind::Episode)), SessionState::Done);
    assert_eq!(h.negotiator.calls(), 0);
    assert!(h.source.probes.lock().unwrap().is_empty());
}

#[test]
fn continuation_video_follows_primary() {
    let h = Harness::new(
        vec![Ok(vec![
            progressive(Quality::P1080),
            QualityCandidate::progressive(Quality::P1080, "https://cdn.example/part2.mp4")
                .into_secondary(),
        ])],
        FakeSource::new(2048),
    );
    assert_eq!(h.pipeline().process(item(ItemKind::Episode)), SessionState::Done);
    assert!(h.dest(false).exists());
    assert!(h.dest(true).exists());

    let records = h.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.completed));
    assert!(records.iter().any(|r| r.name == "Show S01E01 (Part 2)"));
    assert_eq!(h.host.finished(), 1);
}

#[test]
fn anti_bot_block_retries_without_counting() {
    let h = Harness::new(
        vec![
            Err(ErrorCode::AntiBotBlock.into()),
            Err(ErrorCode::AntiBotBlock.into()),
            Ok(vec![progressive(Quality::P1080)]),
        ],
        FakeSource::new(4096),
    );
    assert_eq!(h.pipeline().process(item(ItemKind::Episode)), SessionState::Done);
    assert_eq!(h.negotiator.calls(), 3);
}

#[test]
fn quality_detection_exhaustion_abandons() {
    let h = Harness::new(vec![Err(ErrorCode::NoFrame.into())], FakeSource::new(4096));
    let state = h.pipeline().process(item(ItemKind::Episode));
    assert_eq!(state, SessionState::Abandoned(AbandonReason::QualityDetectionExhausted));
    assert_eq!(h.negotiator.calls(), 2);
}

#[test]
fn stop_mid_transfer_keeps_partial_and_requeues() {
    let mut source = FakeSource::new(4096);
    source.stop_after = Some(1000);
    let h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], source);
    let state = h.pipeline().process(item(ItemKind::Episode));

    assert_eq!(state, SessionState::Done);
    let part = partial_path(&h.dest(false), Quality::P1080, Delivery::Progressive);
    assert_eq!(fs::metadata(&part).unwrap().len(), 1000);
    assert!(!h.dest(false).exists());
    let rec = &h.records()[0];
    assert!(!rec.completed && !rec.downloading);
    assert_eq!(h.host.finished(), 0);

    // The next run picks the same record back up and continues the partial.
    let resumed = Arc::new(FakeSource::new(4096));
    let mut pipeline = h.pipeline();
    pipeline.source = Box::new(Shared(resumed.clone()));
    assert_eq!(pipeline.process(item(ItemKind::Episode)), SessionState::Done);
    assert_eq!(*resumed.offsets.lock().unwrap(), vec![1000]);
    assert_eq!(fs::metadata(h.dest(false)).unwrap().len(), 4096);
    assert!(!part.exists());
}

#[test]
fn stopped_run_leaves_item_untouched() {
    let h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], FakeSource::new(4096));
    h.running.stop();
    h.pipeline().process(item(ItemKind::Episode));
    assert_eq!(h.negotiator.calls(), 0);
    assert_eq!(h.host.in_progress(), 0);
}

#[test]
fn paired_audio_failure_switches_to_continuation_frame() {
    let h = Harness::new(
        vec![
            Ok(vec![QualityCandidate::manifest(
                Quality::P1080,
                "https://cdn.example/v.m3u8",
                Some("https://cdn.example/bad-audio.m3u8".to_string()),
            )]),
            Err(ErrorCode::SecondManifestEmptyFrame.into()),
            Err(ErrorCode::PageReadFailed.into()),
        ],
        FakeSource::new(4096),
    );
    let state = h.pipeline().process(item(ItemKind::Episode));

    assert_eq!(state, SessionState::Abandoned(AbandonReason::RetryCeiling));
    assert_eq!(*h.muxer.merges.lock().unwrap(), 0);
    assert_eq!(fs::read_dir(h.dir.path()).unwrap().count(), 0);
    let requests = h.negotiator.requests.lock().unwrap().clone();
    // Second negotiation targets the continuation frame.
    assert_eq!(requests[0], (false, false));
    assert_eq!(requests[1], (true, false));
    assert_eq!(requests[2], (false, false));
}

#[test]
fn movie_logs_in_before_negotiating() {
    let mut h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], FakeSource::new(4096));
    h.negotiator = Arc::new(ScriptedNegotiator {
        premium: Some(Mutex::new(vec![false, true].into())),
        ..ScriptedNegotiator::new(vec![Ok(vec![progressive(Quality::P1080)])])
    });
    assert_eq!(h.pipeline().process(item(ItemKind::Movie)), SessionState::Done);
    assert_eq!(*h.negotiator.requests.lock().unwrap(), vec![(false, true)]);
}

#[test]
fn movie_falls_back_when_premium_exhausted() {
    let mut h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], FakeSource::new(4096));
    h.negotiator = Arc::new(ScriptedNegotiator {
        premium: Some(Mutex::new(VecDeque::new())),
        ..ScriptedNegotiator::new(vec![Ok(vec![progressive(Quality::P1080)])])
    });
    assert_eq!(h.pipeline().process(item(ItemKind::Movie)), SessionState::Done);
    assert_eq!(*h.negotiator.requests.lock().unwrap(), vec![(false, false)]);
}

#[test]
fn pool_drains_queue() {
    let h = Harness::new(vec![Ok(vec![progressive(Quality::P1080)])], FakeSource::new(2048));
    let mut items = Vec::new();
    for i in 0..5 {
        let mut it = item(ItemKind::Episode);
        it.id = i;
        it.slug = format!("show-s01e0{}", i);
        items.push(it);
    }
    let host = Arc::new(QueueHost::new(items, h.running.clone()));
    let mut pipeline = h.pipeline();
    pipeline.host = host.clone();

    let summary = run_workers(&pipeline, 3);
    assert_eq!(summary, RunSummary { processed: 5, done: 5, abandoned: 0 });
    assert_eq!(host.finished(), 5);
    assert_eq!(host.remaining(), 0);
    assert_eq!(h.records().len(), 5);
}
