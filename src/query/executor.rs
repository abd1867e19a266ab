use crate::cache::{CacheBackend, CachedFacts, EntryLifetime, Fact, Fingerprint, ResultCache};
use crate::catalog::schema::RecordId;
use crate::catalog::selection::ColumnSelection;
use crate::config::BrowserConfig;
use crate::error::BrowseResult;
use crate::query::bounds::{BoundsMap, aggregate_bounds};
use crate::query::builder::PredicateBuilder;
use crate::query::join::JoinEngine;
use crate::query::operators::top_k;
use crate::query::pager::PagePlan;
use crate::query::plan::QueryShape;
use crate::query::request::{GridRequest, PageLength};
use crate::query::response::GridResponse;
use crate::storage::Storage;
use std::time::Instant;
use tracing::info;

/// A request bound to its join engine and cache identity.
pub struct PreparedQuery<'a, S: Storage + ?Sized> {
    pub engine: JoinEngine<'a, S>,
    pub shape: QueryShape,
    pub fingerprint: Fingerprint,
    pub lifetime: EntryLifetime,
}

/// Request-to-result pipeline.
pub struct QueryExecutor<'a, S: Storage + ?Sized, B: CacheBackend> {
    storage: &'a S,
    cache: &'a ResultCache<B>,
    config: &'a BrowserConfig,
}

impl<'a, S: Storage + ?Sized, B: CacheBackend> QueryExecutor<'a, S, B> {
    pub fn new(storage: &'a S, cache: &'a ResultCache<B>, config: &'a BrowserConfig) -> Self {
        Self {
            storage,
            cache,
            config,
        }
    }

    fn is_default_selection(&self, selection: &ColumnSelection) -> bool {
        selection.references() == self.config.default_columns.as_slice()
    }

    fn lifetime(&self, selection: &ColumnSelection, filtered: bool) -> EntryLifetime {
        if !filtered && self.is_default_selection(selection) {
            EntryLifetime::Indefinite
        } else {
            EntryLifetime::Expiring(self.config.cache_ttl)
        }
    }

    pub fn prepare(
        &self,
        selection: &'a ColumnSelection,
        request: &GridRequest,
    ) -> BrowseResult<PreparedQuery<'a, S>> {
        let shape = PredicateBuilder::new(selection).build(request)?;
        let engine = JoinEngine::new(
            self.storage,
            selection,
            self.config.default_dataset.as_deref(),
        );
        let fingerprint = Fingerprint::compute(
            &selection.canonical_dataset_ids(),
            engine.canonical().dataset.id,
            &shape.predicates,
        );
        let lifetime = self.lifetime(selection, !shape.predicates.is_empty());
        Ok(PreparedQuery {
            engine,
            shape,
            fingerprint,
            lifetime,
        })
    }

    pub fn facts(&self, prepared: &PreparedQuery<'a, S>) -> BrowseResult<CachedFacts> {
        let engine = &prepared.engine;
        self.cache.facts(
            &prepared.fingerprint,
            !prepared.shape.predicates.is_empty(),
            prepared.lifetime,
            || engine.filtered_ids(&prepared.shape.predicates),
            || engine.unfiltered_count(),
        )
    }

    /// Cache identity of the bounds map: the column set over the unfiltered join.
    pub fn bounds_fingerprint(&self, prepared: &PreparedQuery<'a, S>) -> Fingerprint {
        let selection = prepared.engine.selection();
        Fingerprint::for_columns(
            &selection.canonical_dataset_ids(),
            prepared.engine.canonical().dataset.id,
            selection.references(),
        )
    }

    /// Bounds of the selection's numeric columns.
    ///
    /// A single dataset reads the column statistics refreshed on every load, so its
    /// bounds are never cached. Joined selections are memoized per column set.
    pub fn bounds(&self, prepared: &PreparedQuery<'a, S>) -> BrowseResult<BoundsMap> {
        let selection = prepared.engine.selection();
        if !selection.is_multi_dataset() {
            return aggregate_bounds(&prepared.engine);
        }
        self.cache.memoize(
            &self.bounds_fingerprint(prepared),
            Fact::Bounds,
            self.lifetime(selection, false),
            || aggregate_bounds(&prepared.engine),
        )
    }

    /// One grid page with counts and column bounds.
    pub fn execute(
        &self,
        selection: &'a ColumnSelection,
        request: &GridRequest,
    ) -> BrowseResult<GridResponse> {
        let started = Instant::now();
        let prepared = self.prepare(selection, request)?;
        let facts = self.facts(&prepared)?;

        let end = match request
            .length
            .unwrap_or(PageLength::Limit(self.config.default_page_length))
        {
            PageLength::All => None,
            PageLength::Limit(n) => Some(request.start.saturating_add(n)),
        };
        let plan = PagePlan::new(
            request.start,
            end,
            facts.filtered_ids.len(),
            self.config.page_threshold,
        );
        let page = if plan.is_empty() {
            Vec::new()
        } else {
            let keys = prepared
                .engine
                .sort_keys(&facts.filtered_ids, &prepared.shape.sort)?;
            plan.select(keys, prepared.shape.sort.direction)
        };
        let rows = prepared.engine.rows(&page)?;
        let bounds = self.bounds(&prepared)?;

        info!(
            datasets = selection.groups().len(),
            predicates = prepared.shape.predicates.len(),
            total = facts.full_count,
            filtered = facts.filtered_count,
            returned = rows.len(),
            mode = ?plan.mode,
            cached = facts.from_cache,
            elapsed_us = started.elapsed().as_micros() as u64,
            "grid query executed"
        );
        Ok(GridResponse::new(
            facts.full_count,
            facts.filtered_count,
            rows,
            bounds,
        ))
    }

    /// Every filtered record id in sort order, ignoring the page window.
    pub fn ordered_ids(&self, prepared: &PreparedQuery<'a, S>) -> BrowseResult<Vec<RecordId>> {
        let facts = self.facts(prepared)?;
        let total = facts.filtered_ids.len();
        let keys = prepared
            .engine
            .sort_keys(&facts.filtered_ids, &prepared.shape.sort)?;
        Ok(top_k(keys, prepared.shape.sort.direction, total)
            .into_iter()
            .map(|k| k.id)
            .collect())
    }
}
