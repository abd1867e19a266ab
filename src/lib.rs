pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod query;
pub mod storage;

use crate::cache::{CacheBackend, MemoryCache, ResultCache};
use crate::catalog::selection::ColumnSelection;
use crate::config::BrowserConfig;
use crate::error::{BrowseError, BrowseResult};
use crate::export::{ExportMode, ExportRows, XlsxSheetWriter, write_delimited, write_spreadsheet};
use crate::query::bounds::{Bounds, live_column_bounds};
use crate::query::executor::QueryExecutor;
use crate::query::request::GridRequest;
use crate::query::response::{ColumnDescriptor, GridResponse};
use crate::storage::Storage;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::info;

pub use crate::cache::Fingerprint;
pub use crate::catalog::{ColumnKind, Payload, Value};
pub use crate::storage::MemoryStorage;

/// What the boundary should answer a grid request with.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowseOutcome {
    /// `export_mode` without `export_post`: the client is handed the URL to post to.
    ExportLink { url: String },
    /// `export_mode` with `export_post`: the caller streams the export.
    Export(ExportMode),
    Page(GridResponse),
}

/// Export bytes produced on a blocking worker, delivered through a bounded channel.
pub struct ExportStream {
    pub file_name: String,
    pub content_type: &'static str,
    pub chunks: mpsc::Receiver<BrowseResult<Vec<u8>>>,
}

/// `Write` adapter that forwards fixed-size chunks into the export channel.
/// Blocks while the channel is full.
struct ChannelWriter {
    tx: mpsc::Sender<BrowseResult<Vec<u8>>>,
    buffer: Vec<u8>,
    chunk_bytes: usize,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<BrowseResult<Vec<u8>>>, chunk_bytes: usize) -> Self {
        let chunk_bytes = chunk_bytes.max(1);
        Self {
            tx,
            buffer: Vec::with_capacity(chunk_bytes),
            chunk_bytes,
        }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_bytes));
        self.tx.blocking_send(Ok(chunk)).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "export consumer went away")
        })
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= self.chunk_bytes {
            self.send_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}

/// Server-side data browser over a storage engine and a result cache.
pub struct LexiconBrowser<S: Storage, B: CacheBackend = MemoryCache> {
    storage: S,
    cache: ResultCache<B>,
    config: BrowserConfig,
}

impl<S: Storage> LexiconBrowser<S, MemoryCache> {
    pub fn new(storage: S, config: BrowserConfig) -> Self {
        let cache = MemoryCache::new(config.cache_capacity);
        Self::with_cache_backend(storage, cache, config)
    }
}

impl<S: Storage, B: CacheBackend> LexiconBrowser<S, B> {
    pub fn with_cache_backend(storage: S, backend: B, config: BrowserConfig) -> Self {
        info!(
            default_dataset = ?config.default_dataset,
            default_columns = config.default_columns.len(),
            page_threshold = config.page_threshold,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            "lexicon browser ready"
        );
        Self {
            storage,
            cache: ResultCache::new(backend),
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache<B> {
        &self.cache
    }

    /// Resolves `references`, falling back to the configured default columns.
    pub fn resolve(&self, references: &[String]) -> BrowseResult<ColumnSelection> {
        let references = if references.is_empty() {
            self.config.default_columns.as_slice()
        } else {
            references
        };
        ColumnSelection::resolve(&self.storage, references)
    }

    pub fn query(
        &self,
        references: &[String],
        request: &GridRequest,
    ) -> BrowseResult<GridResponse> {
        let selection = self.resolve(references)?;
        QueryExecutor::new(&self.storage, &self.cache, &self.config).execute(&selection, request)
    }

    /// Drops the cached counts, ids and bounds of one filter combination.
    ///
    /// Entries cached without expiry are only refreshed through this hook, so callers
    /// that load more records into a selection's datasets invalidate it afterwards.
    pub fn invalidate(&self, references: &[String], request: &GridRequest) -> BrowseResult<()> {
        let selection = self.resolve(references)?;
        let executor = QueryExecutor::new(&self.storage, &self.cache, &self.config);
        let prepared = executor.prepare(&selection, request)?;
        self.cache.invalidate(&prepared.fingerprint);
        self.cache.invalidate(&executor.bounds_fingerprint(&prepared));
        info!(
            fingerprint = prepared.fingerprint.as_str(),
            columns = selection.references().len(),
            "cache entries invalidated"
        );
        Ok(())
    }

    /// Dispatches a grid request: export handshake, export, or a JSON page.
    pub fn handle(
        &self,
        references: &[String],
        request: &GridRequest,
        request_uri: &str,
    ) -> BrowseResult<BrowseOutcome> {
        if let Some(raw) = request.export_mode.as_deref() {
            let mode = ExportMode::parse(raw)?;
            if !request.export_post {
                return Ok(BrowseOutcome::ExportLink {
                    url: request_uri.to_string(),
                });
            }
            return Ok(BrowseOutcome::Export(mode));
        }
        Ok(BrowseOutcome::Page(self.query(references, request)?))
    }

    /// Writes the whole filtered, sorted result to `out`. Returns the data row count.
    pub fn export_to<W: Write>(
        &self,
        references: &[String],
        request: &GridRequest,
        mode: ExportMode,
        out: W,
    ) -> BrowseResult<u64> {
        let started = Instant::now();
        let selection = self.resolve(references)?;
        let executor = QueryExecutor::new(&self.storage, &self.cache, &self.config);
        let prepared = executor.prepare(&selection, request)?;
        let ids = executor.ordered_ids(&prepared)?;
        let rows = ExportRows::new(&prepared.engine, ids, self.config.export_fetch_rows);
        let header = selection.header();
        let written = match mode.delimiter() {
            Some(delimiter) => write_delimited(delimiter, &header, rows, out)?,
            None => {
                let sheet = XlsxSheetWriter::new(&self.config.export_basename)?;
                write_spreadsheet(sheet, &header, rows, out)?
            }
        };
        info!(
            mode = %mode,
            rows = written,
            elapsed_us = started.elapsed().as_micros() as u64,
            "export written"
        );
        Ok(written)
    }

    /// Live min/max of one numeric column over its whole dataset.
    pub fn column_bounds(&self, reference: &str) -> BrowseResult<Bounds> {
        let selection = ColumnSelection::resolve(&self.storage, &[reference.to_string()])?;
        let (Some(group), Some(column)) = (selection.group_at(1), selection.column_at(1)) else {
            return Err(BrowseError::column_not_found(reference));
        };
        if !column.kind.is_numeric() {
            return Err(BrowseError::invalid(format!(
                "column '{reference}' holds text and has no bounds"
            )));
        }
        live_column_bounds(&self.storage, &group.dataset, column)
    }

    /// Header metadata of the resolved columns, in grid order.
    pub fn describe_columns(&self, references: &[String]) -> BrowseResult<Vec<ColumnDescriptor>> {
        let selection = self.resolve(references)?;
        let mut descriptors = Vec::with_capacity(selection.columns().len());
        for (idx, reference) in selection.references().iter().enumerate() {
            let position = idx + 1;
            if let (Some(group), Some(column)) =
                (selection.group_at(position), selection.column_at(position))
            {
                descriptors.push(ColumnDescriptor::new(reference, &group.dataset, column));
            }
        }
        Ok(descriptors)
    }
}

impl<S, B> LexiconBrowser<S, B>
where
    S: Storage + 'static,
    B: CacheBackend + 'static,
{
    /// Streams an export from a blocking worker. The channel capacity bounds how far
    /// the producer runs ahead of the consumer. Must be called within a Tokio runtime.
    pub fn export_stream(
        self: &Arc<Self>,
        references: Vec<String>,
        request: GridRequest,
        mode: ExportMode,
    ) -> BrowseResult<ExportStream> {
        // Surface request errors before any byte is produced.
        let selection = self.resolve(&references)?;
        QueryExecutor::new(&self.storage, &self.cache, &self.config)
            .prepare(&selection, &request)?;

        let (tx, rx) = mpsc::channel(self.config.export_channel_capacity.max(1));
        let browser = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let writer = ChannelWriter::new(tx.clone(), browser.config.export_chunk_bytes);
            if let Err(err) = browser.export_to(&references, &request, mode, writer) {
                let _ = tx.blocking_send(Err(err));
            }
        });
        Ok(ExportStream {
            file_name: mode.file_name(&self.config.export_basename),
            content_type: mode.content_type(),
            chunks: rx,
        })
    }
}
