//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::document::{DocumentRegistry, RegistryOptions};
use crate::engine::RenderEngine;
use crate::render::{RenderDispatcher, RenderOptions, WorkerPool};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    dispatcher: RenderDispatcher,
}

impl AppState {
    /// Create the registry and dispatcher around `engine`
    pub fn new(config: Config, engine: Arc<dyn RenderEngine>) -> Self {
        let pool = WorkerPool::new(config.render.workers);
        let registry = DocumentRegistry::new(
            engine,
            pool,
            RegistryOptions {
                viewport_width: config.render.viewport_width,
                staging_dir: config.render.staging_dir.clone(),
            },
        );
        let dispatcher = RenderDispatcher::new(
            registry,
            RenderOptions {
                page_fit: config.render.page_fit,
                preview_scale_floor: config.render.preview_scale_floor,
                max_pixels: config.render.max_render_pixels,
            },
        );

        tracing::info!(
            engine = dispatcher.registry().engine_name(),
            workers = dispatcher.registry().pool().size(),
            "Render engine ready"
        );

        Self {
            inner: Arc::new(AppStateInner { config, dispatcher }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the session registry
    pub fn registry(&self) -> &DocumentRegistry {
        self.inner.dispatcher.registry()
    }

    /// Get the render dispatcher
    pub fn dispatcher(&self) -> &RenderDispatcher {
        &self.inner.dispatcher
    }

    /// Close every open session
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.registry().close_all().await;
    }
}
