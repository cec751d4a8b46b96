//! Session registry
//!
//! Maps session identifiers to open documents and owns their lifecycle.
//! Loading and teardown run on the worker pool; the map itself is only held
//! for inserts, removals and lookups.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::{DocumentError, DocumentResult};
use super::handle::DocumentHandle;
use super::types::{SessionId, SessionSummary};
use crate::engine::{DocumentSource, InputKind, NativeDocument, PasswordSupport, RenderEngine};
use crate::render::pool::WorkerPool;

/// Registry settings
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Viewport width applied to newly opened sessions
    pub viewport_width: Option<f64>,
    /// Directory for staged documents; system temp dir when unset
    pub staging_dir: Option<PathBuf>,
}

#[derive(Clone)]
pub struct DocumentRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    engine: Arc<dyn RenderEngine>,
    pool: WorkerPool,
    options: RegistryOptions,
    sessions: RwLock<HashMap<SessionId, Arc<DocumentHandle>>>,
}

impl DocumentRegistry {
    pub fn new(engine: Arc<dyn RenderEngine>, pool: WorkerPool, options: RegistryOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                engine,
                pool,
                options,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.inner.engine.name()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Load `bytes` as a new session and return its page count
    pub async fn open(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        password: Option<String>,
    ) -> DocumentResult<usize> {
        if session_id.is_empty() {
            return Err(DocumentError::LoadError("session id must not be empty".into()));
        }
        if self.contains(session_id) {
            return Err(DocumentError::AlreadyOpen(session_id.to_string()));
        }

        let (native, page_count) = self.load(bytes, password).await?;

        let handle = {
            let mut sessions = self.inner.sessions.write();
            if sessions.contains_key(session_id) {
                // lost a race with another open of the same id
                drop(sessions);
                drop(native);
                return Err(DocumentError::AlreadyOpen(session_id.to_string()));
            }
            let handle = DocumentHandle::spawn(
                session_id.to_string(),
                native,
                page_count,
                self.inner.options.viewport_width,
                self.inner.pool.clone(),
            );
            sessions.insert(session_id.to_string(), Arc::clone(&handle));
            handle
        };

        tracing::info!(session_id = %handle.id(), pages = page_count, "Opened document");
        Ok(page_count)
    }

    /// Close a session. Returns whether it was open.
    pub async fn close(&self, session_id: &str) -> bool {
        let removed = self.inner.sessions.write().remove(session_id);
        match removed {
            Some(handle) => {
                self.teardown(handle).await;
                tracing::info!(session_id = %session_id, "Closed document");
                true
            }
            None => {
                tracing::debug!(session_id = %session_id, "Close requested for unknown session");
                false
            }
        }
    }

    pub fn lookup(&self, session_id: &str) -> DocumentResult<Arc<DocumentHandle>> {
        self.inner
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| DocumentError::not_found(session_id))
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.read().contains_key(session_id)
    }

    /// Replace the content of an open session. The new document gets a fresh
    /// geometry cache and keeps the session's viewport. Work already queued on
    /// the old document runs to completion against it before it is released.
    /// On failure the session is left untouched.
    pub async fn reload(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        password: Option<String>,
    ) -> DocumentResult<usize> {
        let current = self.lookup(session_id)?;
        let (native, page_count) = self.load(bytes, password).await?;

        let old = {
            let mut sessions = self.inner.sessions.write();
            let unchanged = sessions
                .get(session_id)
                .is_some_and(|existing| Arc::ptr_eq(existing, &current));
            if !unchanged {
                // closed or replaced while loading
                drop(sessions);
                drop(native);
                return Err(DocumentError::not_found(session_id));
            }
            let handle = DocumentHandle::spawn(
                session_id.to_string(),
                native,
                page_count,
                current.geometry().viewport_width(),
                self.inner.pool.clone(),
            );
            sessions.insert(session_id.to_string(), handle)
        };

        if let Some(old) = old {
            old.settle().await;
            self.teardown(old).await;
        }

        tracing::info!(session_id = %session_id, pages = page_count, "Reloaded document");
        Ok(page_count)
    }

    /// Set or clear the viewport width used to fit one session's pages
    pub fn set_viewport(&self, session_id: &str, width: Option<f64>) -> DocumentResult<()> {
        if let Some(w) = width {
            if !w.is_finite() || w <= 0.0 {
                return Err(DocumentError::RenderError(format!(
                    "viewport width must be positive, got {}",
                    w
                )));
            }
        }
        let handle = self.lookup(session_id)?;
        handle.geometry().set_viewport_width(width);
        tracing::debug!(session_id = %session_id, viewport = ?width, "Viewport updated");
        Ok(())
    }

    /// Open sessions, ordered by id
    pub fn sessions(&self) -> Vec<SessionSummary> {
        let mut list: Vec<SessionSummary> = self
            .inner
            .sessions
            .read()
            .values()
            .map(|h| SessionSummary {
                id: h.id().to_string(),
                page_count: h.page_count(),
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.read().is_empty()
    }

    /// Close every session
    pub async fn close_all(&self) -> usize {
        let handles: Vec<_> = self.inner.sessions.write().drain().map(|(_, h)| h).collect();
        let count = handles.len();
        futures::future::join_all(handles.into_iter().map(|h| self.teardown(h))).await;
        if count > 0 {
            tracing::info!("Closed {} document(s)", count);
        }
        count
    }

    async fn teardown(&self, handle: Arc<DocumentHandle>) {
        handle.mark_closed();
        let releasing = Arc::clone(&handle);
        if let Err(e) = self.inner.pool.run(move || releasing.release()).await {
            tracing::error!(session_id = %handle.id(), "Failed to release document: {}", e);
        }
    }

    async fn load(
        &self,
        bytes: Vec<u8>,
        password: Option<String>,
    ) -> DocumentResult<(Box<dyn NativeDocument>, usize)> {
        let engine = Arc::clone(&self.inner.engine);
        let staging_dir = self.inner.options.staging_dir.clone();

        self.inner
            .pool
            .run(move || {
                load_native(
                    engine.as_ref(),
                    staging_dir.as_deref(),
                    &bytes,
                    password.as_deref(),
                )
            })
            .await
            .map_err(|e| DocumentError::LoadError(e.to_string()))?
    }
}

fn load_native(
    engine: &dyn RenderEngine,
    staging_dir: Option<&Path>,
    bytes: &[u8],
    password: Option<&str>,
) -> DocumentResult<(Box<dyn NativeDocument>, usize)> {
    let capabilities = engine.capabilities();

    let mut doc = match capabilities.input {
        InputKind::Memory => engine.load(DocumentSource::Bytes(bytes)),
        InputKind::File => {
            let staged = stage(bytes, staging_dir)?;
            // the staged file is deleted when `staged` drops, after the load
            engine.load(DocumentSource::Path(staged.path()))
        }
    }
    .map_err(DocumentError::from_load)?;

    if doc.needs_password().map_err(DocumentError::from_load)? {
        let Some(password) = password else {
            return Err(DocumentError::PasswordError(
                "document is encrypted and no password was supplied".into(),
            ));
        };
        if capabilities.password == PasswordSupport::Unsupported {
            return Err(DocumentError::PasswordError(format!(
                "the {} engine cannot open encrypted documents",
                engine.name()
            )));
        }
        if !doc.authenticate(password).map_err(DocumentError::from_load)? {
            return Err(DocumentError::PasswordError("incorrect password".into()));
        }
    }

    let page_count = doc.page_count().map_err(DocumentError::from_load)?;
    Ok((doc, page_count))
}

fn stage(bytes: &[u8], staging_dir: Option<&Path>) -> DocumentResult<tempfile::NamedTempFile> {
    use std::io::Write;

    let staging_error = |e: std::io::Error| DocumentError::LoadError(format!("staging failed: {}", e));

    let mut builder = tempfile::Builder::new();
    builder.prefix("folio-").suffix(".pdf");
    let mut file = match staging_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(staging_error)?;

    file.write_all(bytes).map_err(staging_error)?;
    file.flush().map_err(staging_error)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::synthetic::{synthetic_pdf, SyntheticEngine};

    fn registry_with(engine: SyntheticEngine) -> DocumentRegistry {
        DocumentRegistry::new(Arc::new(engine), WorkerPool::new(4), RegistryOptions::default())
    }

    fn doc(tag: &str, pages: usize) -> Vec<u8> {
        synthetic_pdf(tag, &vec![(612.0, 792.0); pages], None)
    }

    #[tokio::test]
    async fn test_open_returns_page_count() {
        let registry = registry_with(SyntheticEngine::new());
        assert_eq!(registry.open("a", doc("a", 3), None).await.unwrap(), 3);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("a").unwrap().page_count(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_open_is_rejected() {
        let engine = SyntheticEngine::new();
        let probe = engine.probe();
        let registry = registry_with(engine);

        registry.open("a", doc("a", 1), None).await.unwrap();
        let err = registry.open("a", doc("a", 2), None).await.unwrap_err();
        assert!(matches!(err, DocumentError::AlreadyOpen(_)));
        assert_eq!(registry.lookup("a").unwrap().page_count(), 1);
        assert_eq!(probe.live_documents(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_opens_have_one_winner() {
        let engine = SyntheticEngine::new();
        let probe = engine.probe();
        let registry = registry_with(engine);

        let attempts = (0..8).map(|_| {
            let registry = registry.clone();
            async move { registry.open("same", doc("same", 2), None).await }
        });
        let results = futures::future::join_all(attempts).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, DocumentError::AlreadyOpen(_))));
        assert_eq!(probe.live_documents(), 1);
    }

    #[tokio::test]
    async fn test_malformed_bytes_are_load_error() {
        let registry = registry_with(SyntheticEngine::new());
        let err = registry.open("bad", b"garbage".to_vec(), None).await.unwrap_err();
        assert!(matches!(err, DocumentError::LoadError(_)));
        assert!(registry.is_empty());

        let err = registry.open("", doc("x", 1), None).await.unwrap_err();
        assert!(matches!(err, DocumentError::LoadError(_)));
    }

    #[tokio::test]
    async fn test_password_handling() {
        let registry = registry_with(SyntheticEngine::new());
        let locked = synthetic_pdf("locked", &[(100.0, 100.0); 4], Some("s3cret"));

        let err = registry.open("p", locked.clone(), None).await.unwrap_err();
        assert!(matches!(err, DocumentError::PasswordError(_)));

        let err = registry
            .open("p", locked.clone(), Some("wrong".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::PasswordError(_)));
        assert!(!registry.contains("p"));

        let count = registry.open("p", locked, Some("s3cret".into())).await.unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_password_ignored_for_plain_document() {
        let registry = registry_with(SyntheticEngine::new());
        let count = registry.open("plain", doc("plain", 2), Some("unused".into())).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_engine_without_password_support() {
        let registry =
            registry_with(SyntheticEngine::new().with_password_support(PasswordSupport::Unsupported));
        let locked = synthetic_pdf("locked", &[(100.0, 100.0)], Some("pw"));

        let err = registry.open("p", locked, Some("pw".into())).await.unwrap_err();
        assert!(matches!(err, DocumentError::PasswordError(ref msg) if msg.contains("synthetic")));

        // unencrypted documents still open
        assert_eq!(registry.open("q", doc("q", 1), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_input_stages_and_cleans_up() {
        let staging = tempfile::tempdir().unwrap();
        let engine = SyntheticEngine::new().with_input(InputKind::File);
        let probe = engine.probe();
        let registry = DocumentRegistry::new(
            Arc::new(engine),
            WorkerPool::new(2),
            RegistryOptions {
                viewport_width: None,
                staging_dir: Some(staging.path().to_path_buf()),
            },
        );

        assert_eq!(registry.open("f", doc("f", 5), None).await.unwrap(), 5);
        assert_eq!(probe.file_loads(), 1);
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_releases() {
        let engine = SyntheticEngine::new();
        let probe = engine.probe();
        let registry = registry_with(engine);

        registry.open("c", doc("c", 1), None).await.unwrap();
        assert!(registry.close("c").await);
        assert!(!registry.close("c").await);
        assert!(!registry.close("never-opened").await);
        assert_eq!(probe.live_documents(), 0);
        assert!(matches!(
            registry.lookup("c"),
            Err(DocumentError::DocumentNotFound(_))
        ));

        // the id can be reused once closed
        assert_eq!(registry.open("c", doc("c", 2), None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reload_swaps_document() {
        let engine = SyntheticEngine::new();
        let probe = engine.probe();
        let registry = registry_with(engine);

        registry.open("r", doc("r", 1), None).await.unwrap();
        registry.set_viewport("r", Some(306.0)).unwrap();
        let before = registry.lookup("r").unwrap();
        assert_eq!(before.page_sizes().await.unwrap().len(), 1);

        let count = registry.reload("r", doc("r", 3), None).await.unwrap();
        assert_eq!(count, 3);
        assert!(before.is_closed());
        assert_eq!(probe.live_documents(), 1);

        let after = registry.lookup("r").unwrap();
        assert!(!after.geometry().is_populated());
        assert_eq!(after.geometry().viewport_width(), Some(306.0));
        assert_eq!(after.page_sizes().await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reload_finishes_work_queued_on_old_document() {
        let engine = SyntheticEngine::new();
        let probe = engine.probe();
        let registry = registry_with(engine);
        registry.open("r", doc("r", 1), None).await.unwrap();
        let before = registry.lookup("r").unwrap();

        let h = Arc::clone(&before);
        let running = tokio::spawn(async move {
            h.submit(|_, _| {
                std::thread::sleep(std::time::Duration::from_millis(150));
                Ok(1)
            })
            .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let h = Arc::clone(&before);
        let queued = tokio::spawn(async move {
            h.submit(|doc, _| doc.page_count().map_err(DocumentError::from_render))
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(registry.reload("r", doc("r", 3), None).await.unwrap(), 3);

        assert_eq!(running.await.unwrap().unwrap(), 1);
        // served by the document that was open when it was queued
        assert_eq!(queued.await.unwrap().unwrap(), 1);
        assert!(before.is_closed());
        assert_eq!(registry.lookup("r").unwrap().page_count(), 3);
        assert_eq!(probe.live_documents(), 1);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_session() {
        let registry = registry_with(SyntheticEngine::new());
        registry.open("r", doc("r", 2), None).await.unwrap();

        let err = registry.reload("r", b"junk".to_vec(), None).await.unwrap_err();
        assert!(matches!(err, DocumentError::LoadError(_)));
        assert_eq!(registry.lookup("r").unwrap().page_count(), 2);

        let err = registry.reload("missing", doc("m", 1), None).await.unwrap_err();
        assert!(matches!(err, DocumentError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_set_viewport_validation() {
        let registry = registry_with(SyntheticEngine::new());
        assert!(matches!(
            registry.set_viewport("nope", Some(100.0)),
            Err(DocumentError::DocumentNotFound(_))
        ));

        registry.open("v", doc("v", 1), None).await.unwrap();
        assert!(registry.set_viewport("v", Some(0.0)).is_err());
        assert!(registry.set_viewport("v", Some(f64::NAN)).is_err());
        assert!(registry.set_viewport("v", None).is_ok());
    }

    #[tokio::test]
    async fn test_sessions_and_close_all() {
        let engine = SyntheticEngine::new();
        let probe = engine.probe();
        let registry = registry_with(engine);

        registry.open("b", doc("b", 2), None).await.unwrap();
        registry.open("a", doc("a", 1), None).await.unwrap();

        let ids: Vec<_> = registry.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert_eq!(registry.close_all().await, 2);
        assert!(registry.is_empty());
        assert_eq!(probe.live_documents(), 0);
    }
}
