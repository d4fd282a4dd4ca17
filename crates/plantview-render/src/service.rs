//! Asynchronous render service
//!
//! Wraps a [`RenderBridge`] so the caller never blocks on the engine.
//!
//! # Dispatch
//!
//! ```text
//!  submit(#1) ──┐
//!  submit(#2) ──┼─► classify ─► lane (one at a time) ─► cache ─► spawn_blocking(bridge)
//!  submit(#3) ──┘                   │                                 │
//!                    superseded before start: skipped      late result: discarded
//! ```
//!
//! Every submission gets a monotonically increasing id. A request whose id
//! is older than the newest submission never reaches the engine if it has
//! not started yet, and its result is discarded if it has. Supersession
//! only decides what is thrown away.
//!
//! The time limit runs from the moment the engine is free, not from
//! submission. A call that exceeds it is cancelled through the bridge, and
//! the engine stays reserved until that call has actually returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex};

use crate::cache::{cache_key, RenderCache, DEFAULT_CACHE_CAPACITY};
use crate::detect;
use crate::error::{RenderError, Result};
use crate::renderer::{RenderBridge, RenderedDiagram};
use crate::types::{OutputFormat, QualityOptions, RenderRequest};

/// Identifier of one submission, increasing in submission order
pub type RequestId = u64;

/// Default limit for a single engine call
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// What a submission produced
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// The engine produced an image
    Success(RenderedDiagram),
    /// The engine rejected the input, timed out, or is unavailable
    Failure(RenderError),
    /// The text does not look like PlantUML; the engine was not called
    Unrecognized,
    /// A newer submission replaced this one
    Superseded,
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The rendered diagram, if any
    pub fn diagram(&self) -> Option<&RenderedDiagram> {
        match self {
            Self::Success(diagram) => Some(diagram),
            _ => None,
        }
    }

    /// The failure diagnostic, if any
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Failure(err) => Some(err.diagnostic()),
            _ => None,
        }
    }
}

/// Tunables for [`RenderService`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceOptions {
    /// Limit for one engine call; `None` waits forever
    pub timeout: Option<Duration>,
    /// Number of renders kept in the cache; zero disables it
    pub cache_capacity: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_RENDER_TIMEOUT),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Handle to a submitted render
///
/// Resolves exactly once. Dropping it does not stop the render.
#[derive(Debug)]
pub struct PendingRender {
    id: RequestId,
    rx: oneshot::Receiver<RenderOutcome>,
}

impl PendingRender {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the outcome
    pub async fn wait(self) -> RenderOutcome {
        self.rx.await.unwrap_or(RenderOutcome::Superseded)
    }

    /// Poll without blocking, for callers driving their own event loop
    ///
    /// Returns `None` while the render is still running. Stop polling after
    /// the first `Some`.
    pub fn try_take(&mut self) -> Option<RenderOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(RenderOutcome::Superseded),
        }
    }
}

/// Asynchronous render service
///
/// Cheap to clone; clones share the bridge, cache and ordering state.
///
/// # Example
///
/// ```ignore
/// let service = RenderService::current(bridge, ServiceOptions::default());
/// service.initialize().await?;
///
/// let pending = service.submit(RenderRequest::new("Alice -> Bob: hi", OutputFormat::Png));
/// match pending.wait().await {
///     RenderOutcome::Success(diagram) => println!("{} bytes", diagram.len()),
///     other => println!("{:?}", other),
/// }
/// ```
#[derive(Clone)]
pub struct RenderService {
    inner: Arc<Inner>,
    handle: Handle,
}

struct Inner {
    bridge: Arc<dyn RenderBridge>,
    cache: RenderCache,
    timeout: Option<Duration>,
    /// Id of the newest submission
    latest: AtomicU64,
    /// Keeps preview renders one at a time
    lane: Mutex<()>,
    /// Held for the whole engine call, including one abandoned on timeout
    engine: Arc<Mutex<()>>,
}

impl RenderService {
    /// Create a service that spawns onto `handle`
    pub fn new(bridge: Arc<dyn RenderBridge>, options: ServiceOptions, handle: Handle) -> Self {
        log::debug!(
            "Render service using {} (timeout {:?}, cache {})",
            bridge.name(),
            options.timeout,
            options.cache_capacity
        );
        Self {
            inner: Arc::new(Inner {
                bridge,
                cache: RenderCache::new(options.cache_capacity),
                timeout: options.timeout,
                latest: AtomicU64::new(0),
                lane: Mutex::new(()),
                engine: Arc::new(Mutex::new(())),
            }),
            handle,
        }
    }

    /// Create a service on the current Tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current(bridge: Arc<dyn RenderBridge>, options: ServiceOptions) -> Self {
        Self::new(bridge, options, Handle::current())
    }

    /// Name of the underlying bridge
    pub fn bridge_name(&self) -> &'static str {
        self.inner.bridge.name()
    }

    /// Start the engine on the blocking pool
    ///
    /// A `RuntimeUnavailable` error here is final for the process.
    pub async fn initialize(&self) -> Result<()> {
        let bridge = Arc::clone(&self.inner.bridge);
        self.handle
            .spawn_blocking(move || bridge.initialize())
            .await
            .map_err(|e| RenderError::RuntimeUnavailable(format!("startup task failed: {}", e)))?
    }

    /// Submit a preview render
    ///
    /// Supersedes every earlier submission. Never blocks.
    pub fn submit(&self, request: RenderRequest) -> PendingRender {
        let id = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();

        if !detect::looks_like_plantuml(&request.source) {
            log::debug!("Render #{} skipped: text does not look like PlantUML", id);
            let _ = tx.send(RenderOutcome::Unrecognized);
            return PendingRender { id, rx };
        }

        let inner = Arc::clone(&self.inner);
        self.handle.spawn(async move {
            let outcome = inner.dispatch(id, request).await;
            // The receiver may be gone; nothing to do then
            let _ = tx.send(outcome);
        });

        PendingRender { id, rx }
    }

    /// Render without taking part in supersession
    ///
    /// Used for exports that must not be discarded by a concurrent preview.
    pub async fn render_now(&self, request: RenderRequest) -> RenderOutcome {
        if !detect::looks_like_plantuml(&request.source) {
            return RenderOutcome::Unrecognized;
        }
        self.inner.execute(request).await
    }

    /// Id of the newest submission (0 before the first)
    pub fn latest_request(&self) -> RequestId {
        self.inner.latest.load(Ordering::SeqCst)
    }

    /// Whether `id` has been replaced by a newer submission
    pub fn is_superseded(&self, id: RequestId) -> bool {
        self.inner.is_stale(id)
    }

    /// Number of cached renders
    pub fn cached(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }
}

impl Inner {
    fn is_stale(&self, id: RequestId) -> bool {
        id < self.latest.load(Ordering::SeqCst)
    }

    async fn dispatch(&self, id: RequestId, request: RenderRequest) -> RenderOutcome {
        let _lane = self.lane.lock().await;

        if self.is_stale(id) {
            log::debug!("Render #{} superseded before start", id);
            return RenderOutcome::Superseded;
        }

        let outcome = self.execute(request).await;

        if self.is_stale(id) {
            log::debug!("Render #{} finished after being superseded; result dropped", id);
            return RenderOutcome::Superseded;
        }
        outcome
    }

    async fn execute(&self, request: RenderRequest) -> RenderOutcome {
        let source = detect::normalize(&request.source);
        let quality = request.quality.for_format(request.format);
        let key = cache_key(&source, request.format, &quality);

        if let Some(hit) = self.cache.get(&key) {
            log::debug!("Render cache hit ({} bytes)", hit.len());
            return RenderOutcome::Success(hit);
        }

        match self.call_bridge(source, request.format, quality).await {
            Ok(data) => {
                let diagram = RenderedDiagram::new(data, request.format, key.clone(), self.bridge.name());
                self.cache.insert(key, diagram.clone());
                RenderOutcome::Success(diagram)
            }
            Err(err) => {
                log::warn!("Render failed: {}", err);
                RenderOutcome::Failure(err)
            }
        }
    }

    async fn call_bridge(
        &self,
        source: String,
        format: OutputFormat,
        quality: QualityOptions,
    ) -> Result<Vec<u8>> {
        // Wait for an abandoned call to finish before the clock starts
        let reserved = Arc::clone(&self.engine).lock_owned().await;
        let bridge = Arc::clone(&self.bridge);
        let task = tokio::task::spawn_blocking(move || {
            let _reserved = reserved;
            bridge.render(&source, format, &quality)
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    log::warn!("Engine call exceeded {:?}; cancelling it", limit);
                    self.bridge.cancel();
                    return Err(RenderError::Timeout(limit));
                }
            },
            None => task.await,
        };

        joined.map_err(|e| RenderError::Render(format!("render task failed: {}", e)))?
    }
}
