//! One opened document
//!
//! A handle owns the engine's native document behind a mutex and feeds every
//! operation on it through a FIFO queue drained by a single task. The drain
//! task waits for each job to finish before starting the next, so critical
//! sections run strictly in submission order. Jobs execute on the shared
//! worker pool; the mutex is only ever taken on a worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::error::{DocumentError, DocumentResult};
use super::geometry::GeometryCache;
use super::types::{PageSize, SessionId};
use crate::engine::NativeDocument;
use crate::render::pool::WorkerPool;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct DocumentHandle {
    id: SessionId,
    page_count: usize,
    native: Mutex<Option<Box<dyn NativeDocument>>>,
    geometry: GeometryCache,
    closed: AtomicBool,
    queue: mpsc::UnboundedSender<Job>,
}

impl DocumentHandle {
    /// Wrap a loaded document and start its queue. Must be called from
    /// within a tokio runtime.
    pub(crate) fn spawn(
        id: SessionId,
        native: Box<dyn NativeDocument>,
        page_count: usize,
        viewport_width: Option<f64>,
        pool: WorkerPool,
    ) -> Arc<Self> {
        let (queue, jobs) = mpsc::unbounded_channel();
        tokio::spawn(drain(id.clone(), jobs, pool));

        Arc::new(Self {
            id,
            page_count,
            native: Mutex::new(Some(native)),
            geometry: GeometryCache::new(viewport_width),
            closed: AtomicBool::new(false),
            queue,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn geometry(&self) -> &GeometryCache {
        &self.geometry
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check a 1-based page index and return the 0-based one
    pub fn page_index(&self, page: usize) -> DocumentResult<usize> {
        if page == 0 || page > self.page_count {
            return Err(DocumentError::PageIndexOutOfRange {
                index: page,
                page_count: self.page_count,
            });
        }
        Ok(page - 1)
    }

    /// Queue `op` behind every operation already submitted for this document
    /// and wait for its outcome. `op` runs on a worker thread with the
    /// document lock held; if the handle was closed before `op` got the lock
    /// the result is `DocumentNotFound`.
    pub async fn submit<F, R>(self: &Arc<Self>, op: F) -> DocumentResult<R>
    where
        F: FnOnce(&dyn NativeDocument, &GeometryCache) -> DocumentResult<R> + Send + 'static,
        R: Send + 'static,
    {
        if self.is_closed() {
            return Err(DocumentError::not_found(&self.id));
        }

        let (tx, rx) = oneshot::channel();
        let handle = Arc::clone(self);
        let job: Job = Box::new(move || {
            let outcome = handle.with_native(op);
            // the caller may have stopped waiting
            let _ = tx.send(outcome);
        });

        self.queue
            .send(job)
            .map_err(|_| DocumentError::not_found(&self.id))?;

        rx.await.map_err(|_| {
            DocumentError::RenderError(format!(
                "worker for document {} stopped before completing the request",
                self.id
            ))
        })?
    }

    /// Displayed size of every page. The first call reads every page from
    /// the engine under the document lock; later calls are served from the
    /// cache.
    pub async fn page_sizes(self: &Arc<Self>) -> DocumentResult<Vec<PageSize>> {
        if self.is_closed() {
            return Err(DocumentError::not_found(&self.id));
        }
        if let Some(sizes) = self.geometry.page_sizes() {
            return Ok(sizes);
        }

        let page_count = self.page_count;
        self.submit(move |doc, geometry| {
            if !geometry.is_populated() {
                let mut sizes = Vec::with_capacity(page_count);
                for index in 0..page_count {
                    let page = doc.page(index).map_err(DocumentError::from_render)?;
                    sizes.push(page.size().map_err(DocumentError::from_render)?);
                }
                geometry.fill(sizes);
                tracing::debug!(pages = page_count, "Populated page geometry");
            }
            Ok(geometry.page_sizes().unwrap_or_default())
        })
        .await
    }

    /// Wait until every operation queued so far has run
    pub(crate) async fn settle(self: &Arc<Self>) {
        // a closed handle has nothing left to run
        let _ = self.submit(|_, _| Ok(())).await;
    }

    /// Mark closed and release the native document. Blocks until any
    /// critical section in progress has finished; run it on a worker thread.
    pub(crate) fn release(&self) -> bool {
        self.closed.store(true, Ordering::Release);
        let native = self.native.lock().take();
        native.is_some()
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn with_native<F, R>(&self, op: F) -> DocumentResult<R>
    where
        F: FnOnce(&dyn NativeDocument, &GeometryCache) -> DocumentResult<R>,
    {
        let guard = self.native.lock();
        if self.is_closed() {
            return Err(DocumentError::not_found(&self.id));
        }
        let Some(doc) = guard.as_deref() else {
            return Err(DocumentError::not_found(&self.id));
        };
        op(doc, &self.geometry)
    }
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("id", &self.id)
            .field("page_count", &self.page_count)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn drain(id: SessionId, mut jobs: mpsc::UnboundedReceiver<Job>, pool: WorkerPool) {
    while let Some(job) = jobs.recv().await {
        if let Err(e) = pool.run(job).await {
            tracing::error!(session_id = %id, "Document job failed: {}", e);
        }
    }
    tracing::debug!(session_id = %id, "Document queue drained");
}
