//! Deterministic in-process engine for tests
//!
//! Documents are small text files:
//!
//! ```text
//! %SYNTHETIC-PDF
//! tag invoice
//! password hunter2
//! page 612 792
//! page 300 400 broken
//! ```
//!
//! Each page paints a solid colour derived from the document tag and the page
//! index over exactly the area it covers, so tests can tell sessions and
//! pages apart pixel by pixel. A shared [`Probe`] records what the engine did,
//! including any two rasterizations of the same document that overlapped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kurbo::{Affine, Point};
use parking_lot::Mutex;

use super::{
    DocumentSource, EngineCapabilities, EngineError, InputKind, NativeDocument, NativePage,
    PasswordSupport, RenderEngine,
};
use crate::document::{PageSize, PixelBuffer};

const HEADER: &str = "%SYNTHETIC-PDF";

/// Build a synthetic document
pub fn synthetic_pdf(tag: &str, pages: &[(f64, f64)], password: Option<&str>) -> Vec<u8> {
    let mut out = format!("{}\ntag {}\n", HEADER, tag);
    if let Some(password) = password {
        out.push_str(&format!("password {}\n", password));
    }
    for (width, height) in pages {
        out.push_str(&format!("page {} {}\n", width, height));
    }
    out.into_bytes()
}

/// Colour painted by page `index` (0-based) of the document tagged `tag`
pub fn page_color(tag: &str, index: usize) -> [u8; 4] {
    // FNV-1a
    let mut hash: u32 = 0x811c_9dc5;
    for byte in tag.bytes().chain((index as u32).to_le_bytes()) {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    let [r, g, b, _] = hash.to_le_bytes();
    // keep clear of white so painted pixels are always distinguishable
    [r % 200, g % 200, b % 200, 255]
}

/// Observations shared between an engine and every document it loaded
#[derive(Default)]
pub struct Probe {
    active: Mutex<HashMap<String, usize>>,
    overlaps: AtomicUsize,
    raster_log: Mutex<Vec<(String, usize)>>,
    size_queries: AtomicUsize,
    loads: AtomicUsize,
    file_loads: AtomicUsize,
    live: AtomicUsize,
}

impl Probe {
    /// Rasterizations that started while another on the same document ran
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// `(tag, page index)` of every completed rasterization, in order
    pub fn raster_log(&self) -> Vec<(String, usize)> {
        self.raster_log.lock().clone()
    }

    /// Pages rasterized for one document, in order
    pub fn pages_rasterized(&self, tag: &str) -> Vec<usize> {
        self.raster_log
            .lock()
            .iter()
            .filter(|(t, _)| t == tag)
            .map(|(_, page)| *page)
            .collect()
    }

    pub fn size_queries(&self) -> usize {
        self.size_queries.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn file_loads(&self) -> usize {
        self.file_loads.load(Ordering::SeqCst)
    }

    /// Documents loaded and not yet dropped
    pub fn live_documents(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn enter(&self, tag: &str) {
        let mut active = self.active.lock();
        let count = active.entry(tag.to_string()).or_insert(0);
        if *count > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        *count += 1;
    }

    fn exit(&self, tag: &str, page: usize) {
        if let Some(count) = self.active.lock().get_mut(tag) {
            *count -= 1;
        }
        self.raster_log.lock().push((tag.to_string(), page));
    }
}

pub struct SyntheticEngine {
    capabilities: EngineCapabilities,
    raster_delay: Duration,
    probe: Arc<Probe>,
}

impl Default for SyntheticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticEngine {
    pub fn new() -> Self {
        Self {
            capabilities: EngineCapabilities {
                password: PasswordSupport::Supported,
                input: InputKind::Memory,
            },
            raster_delay: Duration::ZERO,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn with_password_support(mut self, password: PasswordSupport) -> Self {
        self.capabilities.password = password;
        self
    }

    pub fn with_input(mut self, input: InputKind) -> Self {
        self.capabilities.input = input;
        self
    }

    /// Hold every rasterization for `delay`, widening race windows
    pub fn with_raster_delay(mut self, delay: Duration) -> Self {
        self.raster_delay = delay;
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }
}

impl RenderEngine for SyntheticEngine {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.capabilities
    }

    fn load(&self, source: DocumentSource<'_>) -> Result<Box<dyn NativeDocument>, EngineError> {
        let text = match source {
            DocumentSource::Bytes(data) => decode(data)?,
            DocumentSource::Path(path) => {
                self.probe.file_loads.fetch_add(1, Ordering::SeqCst);
                read_file(path)?
            }
        };

        let mut doc = parse(&text)?;
        doc.raster_delay = self.raster_delay;
        doc.probe = Arc::clone(&self.probe);

        self.probe.loads.fetch_add(1, Ordering::SeqCst);
        self.probe.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(doc))
    }
}

fn decode(data: &[u8]) -> Result<String, EngineError> {
    String::from_utf8(data.to_vec()).map_err(|_| EngineError::Load("not a synthetic document".into()))
}

fn read_file(path: &Path) -> Result<String, EngineError> {
    let data = std::fs::read(path)
        .map_err(|e| EngineError::Load(format!("{}: {}", path.display(), e)))?;
    decode(&data)
}

struct SyntheticPage {
    size: PageSize,
    broken: bool,
}

struct SyntheticDocument {
    tag: String,
    password: Option<String>,
    unlocked: bool,
    pages: Vec<SyntheticPage>,
    raster_delay: Duration,
    probe: Arc<Probe>,
}

fn parse(text: &str) -> Result<SyntheticDocument, EngineError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.next() != Some(HEADER) {
        return Err(EngineError::Load("missing synthetic header".into()));
    }

    let mut doc = SyntheticDocument {
        tag: String::new(),
        password: None,
        unlocked: false,
        pages: Vec::new(),
        raster_delay: Duration::ZERO,
        probe: Arc::new(Probe::default()),
    };

    for line in lines {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("tag") => doc.tag = parts.collect::<Vec<_>>().join(" "),
            Some("password") => doc.password = parts.next().map(str::to_string),
            Some("page") => {
                let mut dimension = || -> Result<f64, EngineError> {
                    parts
                        .next()
                        .and_then(|v| v.parse::<f64>().ok())
                        .filter(|v| v.is_finite() && *v > 0.0)
                        .ok_or_else(|| EngineError::Load(format!("bad page line: {}", line)))
                };
                let size = PageSize::new(dimension()?, dimension()?);
                let broken = parts.next() == Some("broken");
                doc.pages.push(SyntheticPage { size, broken });
            }
            _ => return Err(EngineError::Load(format!("unknown directive: {}", line))),
        }
    }

    Ok(doc)
}

impl SyntheticDocument {
    fn locked(&self) -> bool {
        self.password.is_some() && !self.unlocked
    }
}

impl Drop for SyntheticDocument {
    fn drop(&mut self) {
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl NativeDocument for SyntheticDocument {
    fn needs_password(&self) -> Result<bool, EngineError> {
        Ok(self.password.is_some())
    }

    fn authenticate(&mut self, password: &str) -> Result<bool, EngineError> {
        let ok = self.password.as_deref().map_or(true, |expected| expected == password);
        self.unlocked |= ok;
        Ok(ok)
    }

    fn page_count(&self) -> Result<usize, EngineError> {
        if self.locked() {
            return Err(EngineError::PasswordRequired);
        }
        Ok(self.pages.len())
    }

    fn page(&self, index: usize) -> Result<Box<dyn NativePage + '_>, EngineError> {
        if self.locked() {
            return Err(EngineError::PasswordRequired);
        }
        if index >= self.pages.len() {
            return Err(EngineError::Page(index, "no such page".into()));
        }
        Ok(Box::new(SyntheticPageRef { doc: self, index }))
    }
}

struct SyntheticPageRef<'a> {
    doc: &'a SyntheticDocument,
    index: usize,
}

impl NativePage for SyntheticPageRef<'_> {
    fn size(&self) -> Result<PageSize, EngineError> {
        self.doc.probe.size_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.doc.pages[self.index].size)
    }

    fn rasterize(&self, transform: Affine, target: &mut PixelBuffer) -> Result<(), EngineError> {
        let page = &self.doc.pages[self.index];
        let probe = &self.doc.probe;

        probe.enter(&self.doc.tag);
        if !self.doc.raster_delay.is_zero() {
            std::thread::sleep(self.doc.raster_delay);
        }

        let result = if page.broken {
            Err(EngineError::Raster(format!("page {} is damaged", self.index)))
        } else {
            paint(page.size, page_color(&self.doc.tag, self.index), transform, target);
            Ok(())
        };

        probe.exit(&self.doc.tag, self.index);
        result
    }
}

/// Fill every target pixel whose centre maps inside the page
fn paint(size: PageSize, color: [u8; 4], transform: Affine, target: &mut PixelBuffer) {
    let inverse = transform.inverse();
    for y in 0..target.height() {
        for x in 0..target.width() {
            let p = inverse * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            if p.x >= 0.0 && p.x < size.width && p.y >= 0.0 && p.y < size.height {
                target.set_pixel(x, y, color);
            }
        }
    }
}
