//! Configuration management for Folio Server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::engine::InputKind;
use crate::render::pool::available_workers;
use crate::render::PageFit;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted document upload
    pub max_document_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub workers: usize,
    pub viewport_width: Option<f64>,
    pub preview_scale_floor: f64,
    pub page_fit: PageFit,
    pub max_render_pixels: u64,
    pub staging_dir: Option<PathBuf>,
    pub engine_input: InputKind,
}

#[derive(Debug, Error)]
#[error("invalid value for {key}: {value:?} ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                max_document_bytes: 512 * 1024 * 1024,
            },
            render: RenderConfig {
                workers: available_workers(),
                viewport_width: None,
                preview_scale_floor: 1.75,
                page_fit: PageFit::Stretch,
                max_render_pixels: 64 * 1024 * 1024,
                staging_dir: None,
                engine_input: InputKind::Memory,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let viewport_width = parse_opt::<f64>(&lookup, "VIEWPORT_WIDTH")?;
        if let Some(w) = viewport_width {
            if !w.is_finite() || w <= 0.0 {
                return Err(ConfigError {
                    key: "VIEWPORT_WIDTH",
                    value: w.to_string(),
                    reason: "must be positive".into(),
                });
            }
        }

        let preview_scale_floor = parse_opt::<f64>(&lookup, "PREVIEW_SCALE_FLOOR")?
            .unwrap_or(defaults.render.preview_scale_floor);
        if !preview_scale_floor.is_finite() || preview_scale_floor <= 0.0 {
            return Err(ConfigError {
                key: "PREVIEW_SCALE_FLOOR",
                value: preview_scale_floor.to_string(),
                reason: "must be positive".into(),
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_opt(&lookup, "SERVER_PORT")?.unwrap_or(defaults.server.port),
                max_document_bytes: parse_opt(&lookup, "MAX_DOCUMENT_BYTES")?
                    .unwrap_or(defaults.server.max_document_bytes),
            },
            render: RenderConfig {
                workers: parse_opt::<usize>(&lookup, "RENDER_WORKERS")?
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.render.workers),
                viewport_width,
                preview_scale_floor,
                page_fit: parse_opt(&lookup, "PAGE_FIT")?.unwrap_or(defaults.render.page_fit),
                max_render_pixels: parse_opt(&lookup, "MAX_RENDER_PIXELS")?
                    .unwrap_or(defaults.render.max_render_pixels),
                staging_dir: lookup("STAGING_DIR").map(PathBuf::from),
                engine_input: parse_opt(&lookup, "ENGINE_INPUT")?
                    .unwrap_or(defaults.render.engine_input),
            },
        })
    }
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
