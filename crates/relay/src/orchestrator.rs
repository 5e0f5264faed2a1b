//! All-settled fan-out of upload engine runs.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use blockhaul_engine::{BlockStore, RetryPolicy, UploadEngine};
use blockhaul_protocol::UploadOutcome;
use blockhaul_store::StateStore;

use crate::spool::spool_to_temp;

/// One named source to upload. The name doubles as the remote target,
/// typically the original file name. Names must be unique within a
/// batch; resume state is keyed by name, so two concurrent runs against
/// the same target would corrupt each other.
pub struct UploadRequest<S> {
    pub name: String,
    pub source: S,
}

/// Runs whole batches of uploads, one engine run per file.
pub struct UploadOrchestrator {
    remote: Arc<dyn BlockStore>,
    store: Arc<StateStore>,
    spool_dir: PathBuf,
    chunk_size: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl UploadOrchestrator {
    pub fn new(
        remote: Arc<dyn BlockStore>,
        store: Arc<StateStore>,
        spool_dir: impl Into<PathBuf>,
        chunk_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            remote,
            store,
            spool_dir: spool_dir.into(),
            chunk_size,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops in-flight uploads at the next chunk boundary.
    /// Staged progress stays on disk for a later resume.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads every request concurrently and returns one outcome per
    /// input, in input order.
    ///
    /// Each file runs independently. If one fails, the others continue;
    /// a panicked task is reported as that file's failure, never
    /// propagated to its siblings. A request repeating an earlier name
    /// is never started: only the first occurrence uploads, the rest
    /// settle as failures.
    pub async fn process_all<S>(&self, requests: Vec<UploadRequest<S>>) -> Vec<UploadOutcome>
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        info!(files = requests.len(), "starting upload batch");

        let mut seen = HashSet::with_capacity(requests.len());
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let name = request.name.clone();
            if !seen.insert(name.clone()) {
                warn!(target_name = %name, "duplicate target name in batch, skipping");
                handles.push((name, None));
                continue;
            }
            let remote = self.remote.clone();
            let store = self.store.clone();
            let spool_dir = self.spool_dir.clone();
            let chunk_size = self.chunk_size;
            let retry = self.retry;
            let cancel = self.cancel.clone();
            handles.push((
                name,
                Some(tokio::spawn(async move {
                    process_one(request, remote, store, spool_dir, chunk_size, retry, cancel)
                        .await
                })),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let outcome = match handle {
                None => UploadOutcome::Failed {
                    name,
                    error: "duplicate target name in batch".into(),
                },
                Some(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(target_name = %name, error = %e, "upload task aborted");
                        UploadOutcome::Failed {
                            name,
                            error: format!("upload task aborted: {e}"),
                        }
                    }
                },
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        info!(
            files = outcomes.len(),
            failed, "upload batch settled"
        );
        outcomes
    }
}

async fn process_one<S>(
    request: UploadRequest<S>,
    remote: Arc<dyn BlockStore>,
    store: Arc<StateStore>,
    spool_dir: PathBuf,
    chunk_size: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> UploadOutcome
where
    S: AsyncRead + Send + Unpin + 'static,
{
    let UploadRequest { name, mut source } = request;
    let started = Instant::now();

    // Buffer the source to disk first so a slow producer never holds a
    // remote session open. The TempPath guard removes the buffer on every
    // exit path, including cancellation dropping the spool mid-read.
    let spooled = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return UploadOutcome::Failed {
                name,
                error: "upload cancelled".into(),
            };
        }
        result = spool_to_temp(&mut source, &spool_dir) => result,
    };
    let (buffer, bytes) = match spooled {
        Ok(spooled) => spooled,
        Err(e) => {
            error!(target_name = %name, error = %e, "failed to buffer source");
            return UploadOutcome::Failed {
                name,
                error: format!("failed to buffer source: {e}"),
            };
        }
    };
    info!(target_name = %name, bytes, "source buffered, starting upload");

    let engine = UploadEngine::new(remote, store, chunk_size, retry);
    match engine.run(&buffer, &name, &cancel).await {
        Ok(stats) => {
            let elapsed_secs = started.elapsed().as_secs_f64();
            info!(
                target_name = %name,
                total_bytes = stats.total_bytes,
                chunks = stats.chunks_staged,
                resumed_bytes = stats.resumed_bytes,
                elapsed_secs,
                "upload completed"
            );
            UploadOutcome::Completed { name, elapsed_secs }
        }
        Err(e) => {
            error!(target_name = %name, error = %e, "upload failed");
            UploadOutcome::Failed {
                name,
                error: e.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::future::Future;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    use tempfile::TempDir;
    use tokio::io::ReadBuf;

    use blockhaul_engine::RemoteError;

    /// Remote that records staged blocks and commits. Failures are
    /// injected per target so concurrent siblings stay deterministic.
    struct MockRemote {
        staged: Mutex<Vec<(String, String, Vec<u8>)>>,
        commits: Mutex<Vec<(String, Vec<String>)>>,
        fail_targets: Mutex<HashSet<String>>,
    }

    impl MockRemote {
        fn new() -> Self {
            Self {
                staged: Mutex::new(Vec::new()),
                commits: Mutex::new(Vec::new()),
                fail_targets: Mutex::new(HashSet::new()),
            }
        }

        fn fail_target(&self, target: &str) {
            self.fail_targets.lock().unwrap().insert(target.to_string());
        }

        fn staged_sizes(&self, target: &str) -> Vec<usize> {
            self.staged
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _, _)| t == target)
                .map(|(_, _, data)| data.len())
                .collect()
        }

        /// Reassembles a target's bytes in committed block order.
        fn assembled(&self, target: &str) -> Vec<u8> {
            let commits = self.commits.lock().unwrap();
            let (_, ids) = commits
                .iter()
                .find(|(t, _)| t == target)
                .expect("target was never committed");
            let staged = self.staged.lock().unwrap();
            let mut out = Vec::new();
            for id in ids {
                let (_, _, data) = staged
                    .iter()
                    .find(|(t, i, _)| t == target && i == id)
                    .expect("committed id was never staged");
                out.extend_from_slice(data);
            }
            out
        }

        fn committed(&self, target: &str) -> Option<Vec<String>> {
            self.commits
                .lock()
                .unwrap()
                .iter()
                .find(|(t, _)| t == target)
                .map(|(_, ids)| ids.clone())
        }
    }

    impl BlockStore for MockRemote {
        fn stage_block(
            &self,
            target: &str,
            block_id: &str,
            data: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send + '_>> {
            let target = target.to_string();
            let block_id = block_id.to_string();
            Box::pin(async move {
                if self.fail_targets.lock().unwrap().contains(&target) {
                    return Err(RemoteError::Rejected("injected failure".into()));
                }
                self.staged.lock().unwrap().push((target, block_id, data));
                Ok(())
            })
        }

        fn commit_block_list(
            &self,
            target: &str,
            block_ids: &[String],
        ) -> Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send + '_>> {
            let target = target.to_string();
            let block_ids = block_ids.to_vec();
            Box::pin(async move {
                self.commits.lock().unwrap().push((target, block_ids));
                Ok(())
            })
        }
    }

    /// Source that fails on the first read.
    struct BrokenSource;

    impl AsyncRead for BrokenSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "source disconnected",
            )))
        }
    }

    struct Fixture {
        remote: Arc<MockRemote>,
        store: Arc<StateStore>,
        spool_dir: TempDir,
        _state_dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let state_dir = TempDir::new().unwrap();
        let spool_dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::open(state_dir.path()).await.unwrap());
        Fixture {
            remote: Arc::new(MockRemote::new()),
            store,
            spool_dir,
            _state_dir: state_dir,
        }
    }

    impl Fixture {
        fn orchestrator(&self, chunk_size: usize) -> UploadOrchestrator {
            UploadOrchestrator::new(
                self.remote.clone(),
                self.store.clone(),
                self.spool_dir.path(),
                chunk_size,
                RetryPolicy::immediate(0),
            )
        }

        fn spool_entries(&self) -> usize {
            std::fs::read_dir(self.spool_dir.path()).unwrap().count()
        }
    }

    fn request(name: &str, content: &[u8]) -> UploadRequest<Cursor<Vec<u8>>> {
        UploadRequest {
            name: name.to_string(),
            source: Cursor::new(content.to_vec()),
        }
    }

    #[tokio::test]
    async fn batch_reports_one_outcome_per_file_in_input_order() {
        let fx = fixture().await;
        let orchestrator = fx.orchestrator(64);

        let outcomes = orchestrator
            .process_all(vec![
                request("a.bin", b"alpha alpha alpha"),
                request("b.bin", b"bravo"),
                request("c.bin", b"charlie charlie"),
            ])
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes.iter().map(|o| o.name()).collect::<Vec<_>>(),
            vec!["a.bin", "b.bin", "c.bin"]
        );
        assert!(outcomes.iter().all(|o| !o.is_failed()));
        assert_eq!(fx.remote.assembled("a.bin"), b"alpha alpha alpha");
        assert_eq!(fx.remote.assembled("b.bin"), b"bravo");
        assert_eq!(fx.remote.assembled("c.bin"), b"charlie charlie");
    }

    #[tokio::test]
    async fn one_failing_file_does_not_abort_its_siblings() {
        let fx = fixture().await;
        fx.remote.fail_target("bad.bin");
        let orchestrator = fx.orchestrator(64);

        let outcomes = orchestrator
            .process_all(vec![
                request("good-1.bin", b"first file"),
                request("bad.bin", b"doomed file"),
                request("good-2.bin", b"third file"),
            ])
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_failed());
        assert!(outcomes[1].is_failed());
        assert!(!outcomes[2].is_failed());
        assert_eq!(outcomes[1].name(), "bad.bin");
        assert_eq!(fx.remote.assembled("good-1.bin"), b"first file");
        assert_eq!(fx.remote.assembled("good-2.bin"), b"third file");
        assert!(fx.remote.committed("bad.bin").is_none());
    }

    #[tokio::test]
    async fn duplicate_target_names_fail_instead_of_racing() {
        let fx = fixture().await;
        let orchestrator = fx.orchestrator(64);

        let outcomes = orchestrator
            .process_all(vec![
                request("a.bin", b"solo file"),
                request("dup.bin", b"first occurrence wins"),
                request("dup.bin", b"second occurrence must not run"),
            ])
            .await;

        // One outcome per input, in input order; only the repeat fails.
        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_failed());
        assert!(!outcomes[1].is_failed());
        assert_eq!(outcomes[2].name(), "dup.bin");
        match &outcomes[2] {
            UploadOutcome::Failed { error, .. } => {
                assert!(error.contains("duplicate"), "got: {error}");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        // The repeat never reached the remote: one staged block, the
        // first occurrence's bytes.
        assert_eq!(fx.remote.staged_sizes("dup.bin"), vec![21]);
        assert_eq!(fx.remote.assembled("dup.bin"), b"first occurrence wins");
    }

    #[tokio::test]
    async fn empty_batch_settles_with_no_outcomes() {
        let fx = fixture().await;
        let orchestrator = fx.orchestrator(64);

        let outcomes = orchestrator
            .process_all(Vec::<UploadRequest<Cursor<Vec<u8>>>>::new())
            .await;

        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn unreadable_source_becomes_a_failed_outcome() {
        let fx = fixture().await;
        let orchestrator = fx.orchestrator(64);

        let requests: Vec<UploadRequest<Box<dyn AsyncRead + Send + Unpin>>> = vec![
            UploadRequest {
                name: "broken.bin".to_string(),
                source: Box::new(BrokenSource),
            },
            UploadRequest {
                name: "fine.bin".to_string(),
                source: Box::new(Cursor::new(b"still works".to_vec())),
            },
        ];
        let outcomes = orchestrator.process_all(requests).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_failed());
        match &outcomes[0] {
            UploadOutcome::Failed { error, .. } => {
                assert!(error.contains("failed to buffer source"), "got: {error}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!outcomes[1].is_failed());
        assert_eq!(fx.remote.assembled("fine.bin"), b"still works");
    }

    #[tokio::test]
    async fn temp_buffers_are_removed_after_the_batch() {
        let fx = fixture().await;
        fx.remote.fail_target("bad.bin");
        let orchestrator = fx.orchestrator(64);

        let outcomes = orchestrator
            .process_all(vec![
                request("ok.bin", b"kept nowhere"),
                request("bad.bin", b"fails remotely"),
            ])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(fx.spool_entries(), 0);
    }

    #[tokio::test]
    async fn cancelled_batch_fails_every_file_and_leaves_no_buffers() {
        let fx = fixture().await;
        let orchestrator = fx.orchestrator(64);
        orchestrator.cancel_token().cancel();

        let outcomes = orchestrator
            .process_all(vec![
                request("a.bin", b"never sent"),
                request("b.bin", b"never sent either"),
            ])
            .await;

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            match outcome {
                UploadOutcome::Failed { error, .. } => {
                    assert!(error.contains("cancelled"), "got: {error}");
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }
        assert_eq!(fx.spool_entries(), 0);
        assert!(fx.remote.committed("a.bin").is_none());
    }

    #[tokio::test]
    async fn mebibyte_scale_batch_round_trips() {
        // 2.5 MiB source with 1 MiB chunks: spools across three read
        // windows and stages 1 MiB + 1 MiB + 0.5 MiB.
        let fx = fixture().await;
        let orchestrator = fx.orchestrator(1024 * 1024);
        let content: Vec<u8> = (0..(2 * 1024 * 1024 + 512 * 1024))
            .map(|i| (i % 253) as u8)
            .collect();

        let outcomes = orchestrator
            .process_all(vec![UploadRequest {
                name: "large.bin".to_string(),
                source: Cursor::new(content.clone()),
            }])
            .await;

        assert!(!outcomes[0].is_failed());
        assert_eq!(
            fx.remote.staged_sizes("large.bin"),
            vec![1024 * 1024, 1024 * 1024, 512 * 1024]
        );
        assert_eq!(fx.remote.assembled("large.bin"), content);
        assert!(fx.store.load("large.bin").await.unwrap().is_none());
        assert_eq!(fx.spool_entries(), 0);
    }

    #[tokio::test]
    async fn multi_chunk_file_is_reassembled_in_order() {
        let fx = fixture().await;
        let orchestrator = fx.orchestrator(100);
        let content: Vec<u8> = (0..250u32).map(|i| (i % 256) as u8).collect();

        let outcomes = orchestrator
            .process_all(vec![UploadRequest {
                name: "split.bin".to_string(),
                source: Cursor::new(content.clone()),
            }])
            .await;

        assert!(!outcomes[0].is_failed());
        assert_eq!(fx.remote.staged_sizes("split.bin"), vec![100, 100, 50]);
        assert_eq!(fx.remote.committed("split.bin").unwrap().len(), 3);
        assert_eq!(fx.remote.assembled("split.bin"), content);
        assert!(fx.store.load("split.bin").await.unwrap().is_none());
    }
}
