//! Move presentation queue.
//!
//! Moves are applied to the rules engine immediately; this pipeline replays
//! them visually, strictly in commit order, one at a time. The renderer sits
//! behind the [`BoardView`] trait; this module decides *what* to show and
//! *when*, never how.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::AppliedMove;
use crate::types::{Color, PieceType, Square};

/// Rendering collaborator. Implementations mutate the visual scene; the
/// animated transition is the only awaited call.
#[async_trait]
pub trait BoardView: Send + Sync {
    /// Run the timed visual transition of a piece between two squares.
    async fn animate_move(&self, from: Square, to: Square);

    /// Remove the piece on a square and park it in the capture tray.
    fn capture_piece(&self, square: Square);

    /// Instantly relocate a piece (the rook shift of a castle).
    fn relocate_piece(&self, from: Square, to: Square);

    /// Swap the piece on a square for its promotion target.
    fn promote_piece(&self, square: Square, color: Color, piece: PieceType);

    /// Rebuild the whole scene from a position string.
    fn resync(&self, fen: &str);
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<AppliedMove>,
    animating: bool,
}

struct PipelineInner {
    view: Arc<dyn BoardView>,
    state: Mutex<QueueState>,
    /// Position to resync to once the in-flight animation finishes.
    pending_sync: Mutex<Option<String>>,
    /// Skip the next full resync request; the queue already covers it.
    suppress_next: AtomicBool,
    wake: Notify,
    shutdown: CancellationToken,
}

/// FIFO queue of applied moves awaiting presentation, drained by an owned
/// worker task. At most one entry animates at any moment.
pub struct AnimationPipeline {
    inner: Arc<PipelineInner>,
    worker: JoinHandle<()>,
}

impl AnimationPipeline {
    /// Create the pipeline and spawn its drain worker.
    #[must_use]
    pub fn new(view: Arc<dyn BoardView>) -> Self {
        let inner = Arc::new(PipelineInner {
            view,
            state: Mutex::new(QueueState::default()),
            pending_sync: Mutex::new(None),
            suppress_next: AtomicBool::new(false),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        });
        let worker = tokio::spawn(drain_loop(Arc::clone(&inner)));
        Self { inner, worker }
    }

    /// Enqueue a committed move for presentation.
    pub fn submit(&self, mv: AppliedMove) {
        self.inner.state.lock().expect("queue lock").entries.push_back(mv);
        self.inner.wake.notify_one();
    }

    /// Drop every queued entry along with any deferred or suppressed sync.
    /// The entry animating right now still finishes.
    pub fn clear(&self) {
        self.inner.state.lock().expect("queue lock").entries.clear();
        self.inner.pending_sync.lock().expect("sync lock").take();
        self.inner.suppress_next.store(false, Ordering::SeqCst);
    }

    /// Mark the next position-change notification as already covered by a
    /// queued animation.
    pub fn suppress_next_resync(&self) {
        self.inner.suppress_next.store(true, Ordering::SeqCst);
    }

    /// Undo a suppression that turned out not to be needed (the move was
    /// rejected before reaching the queue).
    pub fn clear_suppression(&self) {
        self.inner.suppress_next.store(false, Ordering::SeqCst);
    }

    /// React to an engine position change.
    ///
    /// Suppressed changes are skipped once. While an animation is in flight
    /// or entries are queued, the resync is deferred (latest position wins)
    /// and applied after the current animation completes, never interleaved.
    pub fn on_position_changed(&self, fen: &str) {
        if self.inner.suppress_next.swap(false, Ordering::SeqCst) {
            return;
        }
        let busy = {
            let state = self.inner.state.lock().expect("queue lock");
            state.animating || !state.entries.is_empty()
        };
        if busy {
            *self.inner.pending_sync.lock().expect("sync lock") = Some(fen.to_string());
            return;
        }
        self.inner.view.resync(fen);
    }

    /// Whether an entry is animating right now.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.inner.state.lock().expect("queue lock").animating
    }

    /// Number of entries waiting behind the in-flight one.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.state.lock().expect("queue lock").entries.len()
    }

    /// Stop the drain worker. Queued entries are discarded.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    /// Wait until every queued entry has been presented.
    pub async fn idle(&self) {
        loop {
            {
                let state = self.inner.state.lock().expect("queue lock");
                if !state.animating && state.entries.is_empty() {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }
}

impl Drop for AnimationPipeline {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
        self.worker.abort();
    }
}

async fn drain_loop(inner: Arc<PipelineInner>) {
    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => return,
            () = inner.wake.notified() => {}
        }
        loop {
            // Pop and flag under one lock so observers never see an empty,
            // idle queue while an entry is about to animate.
            let next = {
                let mut state = inner.state.lock().expect("queue lock");
                match state.entries.pop_front() {
                    Some(mv) => {
                        state.animating = true;
                        Some(mv)
                    }
                    None => None,
                }
            };
            let Some(mv) = next else { break };

            tokio::select! {
                () = inner.shutdown.cancelled() => return,
                () = present(&inner, &mv) => {}
            }

            inner.state.lock().expect("queue lock").animating = false;
            let deferred = inner.pending_sync.lock().expect("sync lock").take();
            if let Some(fen) = deferred {
                tracing::debug!(%fen, "applying deferred board resync");
                inner.view.resync(&fen);
            }
        }
    }
}

/// Present one move: captures clear before the transition, promotion and the
/// castle rook shift land after it.
async fn present(inner: &PipelineInner, mv: &AppliedMove) {
    if mv.is_en_passant {
        // The captured pawn sits on the destination file at the origin rank,
        // not on the destination square.
        if let Some(victim) = Square::at(mv.to.file(), mv.from.rank()) {
            inner.view.capture_piece(victim);
        }
    } else if mv.capture.is_some() {
        inner.view.capture_piece(mv.to);
    }

    inner.view.animate_move(mv.from, mv.to).await;

    if let Some(piece) = mv.promotion {
        inner.view.promote_piece(mv.to, mv.color, piece);
    }
    if let Some(side) = mv.castle {
        inner
            .view
            .relocate_piece(side.rook_from(mv.color), side.rook_to(mv.color));
    }
}
