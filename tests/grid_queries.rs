use lexigrid::cache::CacheBackend;
use lexigrid::catalog::schema::{
    Column, ColumnId, Dataset, DatasetId, NewColumn, NewDataset, RecordId,
};
use lexigrid::config::BrowserConfig;
use lexigrid::error::{BrowseError, BrowseResult};
use lexigrid::query::plan::Direction;
use lexigrid::query::request::{GridRequest, PageLength};
use lexigrid::storage::{ProjectedRecord, Storage};
use lexigrid::{BrowseOutcome, ColumnKind, LexiconBrowser, MemoryStorage, Payload, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn refs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn lexique(words: usize) -> MemoryStorage {
    let storage = MemoryStorage::new();
    let lex = storage
        .create_dataset(NewDataset::new("Lexique383"))
        .expect("dataset");
    storage
        .declare_column(lex, NewColumn::text("cgram"))
        .expect("cgram");
    storage
        .declare_column(lex, NewColumn::float("freq"))
        .expect("freq");
    storage
        .declare_column(lex, NewColumn::integer("nblettres"))
        .expect("nblettres");
    storage
        .load_records(
            lex,
            (0..words).map(|i| {
                (
                    format!("w{i}"),
                    Payload::new()
                        .with("cgram", if i % 2 == 0 { "NOM" } else { "VER" })
                        .with("freq", i as f64 * 0.5)
                        .with("nblettres", (i % 7) as i64),
                )
            }),
        )
        .expect("load lexique");
    storage
}

/// Lexique383 `w0..w9`, Voisins `w0..w7` (plus a second `w3`), Manulex `w2..w9`.
fn three_datasets() -> MemoryStorage {
    let storage = lexique(10);
    let vois = storage
        .create_dataset(NewDataset::new("Voisins"))
        .expect("voisins");
    storage
        .declare_column(vois, NewColumn::integer("NbVoisOrth"))
        .expect("NbVoisOrth");
    storage
        .load_records(
            vois,
            (0..8)
                .map(|i| {
                    (
                        format!("w{i}"),
                        Payload::new().with("NbVoisOrth", i as i64 * 10),
                    )
                })
                .chain(std::iter::once((
                    "w3".to_string(),
                    Payload::new().with("NbVoisOrth", 999_i64),
                ))),
        )
        .expect("load voisins");
    let manulex = storage
        .create_dataset(NewDataset::new("Manulex"))
        .expect("manulex");
    storage
        .declare_column(manulex, NewColumn::float("CP_F"))
        .expect("CP_F");
    storage
        .load_records(
            manulex,
            (2..10).map(|i| {
                (
                    format!("w{i}"),
                    Payload::new().with("CP_F", 100.0 - i as f64),
                )
            }),
        )
        .expect("load manulex");
    storage
}

fn keys(rows: &[Vec<Value>]) -> Vec<String> {
    rows.iter().map(|row| row[0].display_text()).collect()
}

#[test]
fn unfiltered_single_dataset_reports_declared_counts() {
    let browser = LexiconBrowser::new(lexique(25), BrowserConfig::default());
    let columns = refs(&["Lexique383__cgram", "Lexique383__nblettres"]);
    let response = browser
        .query(&columns, &GridRequest::new())
        .expect("query");
    assert_eq!(response.total_records, "25");
    assert_eq!(response.total_display_records, "25");
    assert_eq!(response.rows.len(), 10);
    assert!(response.rows.iter().all(|row| row.len() == 3));
}

#[test]
fn page_length_is_clamped_to_remaining_rows() {
    let browser = LexiconBrowser::new(lexique(25), BrowserConfig::default());
    let columns = refs(&["Lexique383__cgram"]);
    for (start, length, expected) in [(0, 10, 10), (20, 10, 5), (25, 10, 0), (40, 5, 0)] {
        let request = GridRequest::new().with_window(start, PageLength::Limit(length));
        let response = browser.query(&columns, &request).expect("query");
        assert_eq!(response.rows.len(), expected, "start {start} length {length}");
    }
    let all = GridRequest::new().with_window(3, PageLength::All);
    assert_eq!(browser.query(&columns, &all).expect("all").rows.len(), 22);
}

#[test]
fn global_search_takes_precedence_over_column_searches() {
    let browser = LexiconBrowser::new(lexique(25), BrowserConfig::default());
    let columns = refs(&["Lexique383__cgram", "Lexique383__nblettres"]);
    let request = GridRequest::new()
        .with_global_search("VER")
        .with_column_search(1, "no match anywhere")
        .with_window(0, PageLength::All);
    let response = browser.query(&columns, &request).expect("query");
    assert_eq!(response.displayed(), 12);
    assert!(
        response
            .rows
            .iter()
            .all(|row| row[1] == Value::from("VER"))
    );
}

#[test]
fn unsearchable_columns_are_skipped_by_global_search() {
    let browser = LexiconBrowser::new(lexique(25), BrowserConfig::default());
    let columns = refs(&["Lexique383__cgram"]);
    let request = GridRequest::new()
        .with_global_search("ver")
        .with_searchable(1, false);
    let response = browser.query(&columns, &request).expect("query");
    assert_eq!(response.displayed(), 0);
    assert_eq!(response.total(), 25);
}

#[test]
fn float_range_is_inclusive_on_both_ends() {
    let browser = LexiconBrowser::new(lexique(25), BrowserConfig::default());
    let columns = refs(&["Lexique383__freq"]);
    let request = GridRequest::new()
        .with_range(1, "1.0", "2.0")
        .with_order(1, Direction::Asc)
        .with_window(0, PageLength::All);
    let response = browser.query(&columns, &request).expect("query");
    let freqs: Vec<Value> = response.rows.iter().map(|row| row[1].clone()).collect();
    assert_eq!(
        freqs,
        vec![
            Value::Float(1.0),
            Value::Float(1.5),
            Value::Float(2.0)
        ]
    );
    assert!(!freqs.contains(&Value::Float(2.5)));
}

#[test]
fn malformed_requests_are_client_errors() {
    let browser = LexiconBrowser::new(lexique(5), BrowserConfig::default());
    let columns = refs(&["Lexique383__freq", "Lexique383__cgram"]);
    for request in [
        GridRequest::new().with_range(1, "3", "1"),
        GridRequest::new().with_range(1, "low", "2"),
        GridRequest::new().with_range(2, "a", "b"),
        GridRequest::new().with_order(9, Direction::Asc),
    ] {
        let err = browser.query(&columns, &request).expect_err("rejected");
        assert!(err.is_client_error(), "{err}");
    }
    let err = browser
        .query(&refs(&["Missing__freq"]), &GridRequest::new())
        .expect_err("unknown dataset");
    assert_eq!(err.code_str(), "dataset_not_found");
}

#[test]
fn three_dataset_join_keeps_keys_present_everywhere() {
    let config = BrowserConfig::default().with_default_dataset("Lexique383");
    let browser = LexiconBrowser::new(three_datasets(), config);
    let columns = refs(&[
        "Lexique383__cgram",
        "Voisins__NbVoisOrth",
        "Manulex__CP_F",
    ]);
    let request = GridRequest::new().with_window(0, PageLength::All);
    let response = browser.query(&columns, &request).expect("query");
    assert_eq!(response.total(), 6);
    assert_eq!(response.displayed(), 6);
    assert_eq!(keys(&response.rows), vec!["w2", "w3", "w4", "w5", "w6", "w7"]);
    assert_eq!(
        response.rows[1],
        vec![
            Value::from("w3"),
            Value::from("VER"),
            Value::Integer(30),
            Value::Float(97.0)
        ]
    );

    let bounds = &response.min_max_dict["Voisins__NbVoisOrth"];
    assert_eq!(bounds.min, Value::Integer(20));
    assert_eq!(bounds.max, Value::Integer(70));
    assert!(!response.min_max_dict.contains_key("Lexique383__cgram"));
}

#[test]
fn join_filters_combine_with_and_or_or() {
    let config = BrowserConfig::default().with_default_dataset("Lexique383");
    let browser = LexiconBrowser::new(three_datasets(), config);
    let columns = refs(&[
        "Lexique383__cgram",
        "Voisins__NbVoisOrth",
        "Manulex__CP_F",
    ]);

    let ranged = GridRequest::new()
        .with_range(2, "30", "50")
        .with_window(0, PageLength::All);
    let response = browser.query(&columns, &ranged).expect("range");
    assert_eq!(keys(&response.rows), vec!["w3", "w4", "w5"]);
    assert_eq!(response.total(), 6);

    let both = ranged.clone().with_column_search(1, "nom");
    let response = browser.query(&columns, &both).expect("and");
    assert_eq!(keys(&response.rows), vec!["w4"]);

    let global = GridRequest::new()
        .with_global_search("ver")
        .with_order(3, Direction::Desc)
        .with_window(0, PageLength::All);
    let response = browser.query(&columns, &global).expect("or");
    assert_eq!(keys(&response.rows), vec!["w3", "w5", "w7"]);
}

#[test]
fn join_result_does_not_depend_on_reference_order() {
    let config = BrowserConfig::default().with_default_dataset("Lexique383");
    let browser = LexiconBrowser::new(three_datasets(), config);
    let forward = refs(&["Lexique383__cgram", "Manulex__CP_F"]);
    let backward = refs(&["Manulex__CP_F", "Lexique383__cgram"]);
    let request = GridRequest::new().with_window(0, PageLength::All);
    let a = browser.query(&forward, &request).expect("forward");
    let b = browser.query(&backward, &request).expect("backward");
    assert_eq!(a.total(), 8);
    assert_eq!(keys(&a.rows), keys(&b.rows));
    assert_eq!(a.rows[0][2], b.rows[0][1]);
}

#[test]
fn tail_pages_match_a_forward_scan() {
    const ROWS: usize = 40_010;
    let reverse = LexiconBrowser::new(lexique(ROWS), BrowserConfig::default());
    let forward = LexiconBrowser::new(
        lexique(ROWS),
        BrowserConfig::default().with_page_threshold(1_000_000),
    );
    let columns = refs(&["Lexique383__nblettres", "Lexique383__cgram"]);
    for (start, direction) in [
        (40_000, Direction::Asc),
        (40_000, Direction::Desc),
        (ROWS - 5, Direction::Desc),
        (39_995, Direction::Desc),
    ] {
        let request = GridRequest::new()
            .with_order(1, direction)
            .with_window(start, PageLength::Limit(10));
        let tail = reverse.query(&columns, &request).expect("reverse");
        let head = forward.query(&columns, &request).expect("forward");
        assert_eq!(tail.rows.len(), (ROWS - start).min(10));
        assert_eq!(tail.rows, head.rows, "start {start} {direction:?}");
    }
}

#[test]
fn repeated_queries_are_idempotent() {
    let browser = LexiconBrowser::new(lexique(30), BrowserConfig::default());
    let columns = refs(&["Lexique383__cgram", "Lexique383__freq"]);
    let request = GridRequest::new()
        .with_column_search(1, "nom")
        .with_order(2, Direction::Desc);
    let first = browser.query(&columns, &request).expect("first");
    assert!(!browser.cache().backend().is_empty());
    let second = browser.query(&columns, &request).expect("second");
    assert_eq!(first, second);
}

struct FailingBackend;

impl CacheBackend for FailingBackend {
    fn get(&self, _key: &str) -> BrowseResult<Option<Vec<u8>>> {
        Err(BrowseError::unavailable("cache offline"))
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> BrowseResult<()> {
        Err(BrowseError::unavailable("cache offline"))
    }

    fn remove(&self, _key: &str) -> BrowseResult<()> {
        Err(BrowseError::unavailable("cache offline"))
    }
}

#[test]
fn cache_outage_degrades_to_recomputation() {
    let cached = LexiconBrowser::new(lexique(30), BrowserConfig::default());
    let uncached =
        LexiconBrowser::with_cache_backend(lexique(30), FailingBackend, BrowserConfig::default());
    let columns = refs(&["Lexique383__cgram", "Lexique383__freq"]);
    let request = GridRequest::new().with_range(2, "2", "9");
    let expected = cached.query(&columns, &request).expect("cached");
    let actual = uncached.query(&columns, &request).expect("uncached");
    assert_eq!(expected, actual);
}

#[test]
fn export_requests_are_dispatched_before_querying() {
    let browser = LexiconBrowser::new(lexique(5), BrowserConfig::default());
    let columns = refs(&["Lexique383__cgram"]);
    let uri = "/browse?export_mode=csv";

    let outcome = browser
        .handle(&columns, &GridRequest::new().with_export("csv", false), uri)
        .expect("link");
    assert_eq!(
        outcome,
        BrowseOutcome::ExportLink {
            url: uri.to_string()
        }
    );

    let outcome = browser
        .handle(&columns, &GridRequest::new().with_export("Excel", true), uri)
        .expect("export");
    assert!(matches!(outcome, BrowseOutcome::Export(mode) if mode.extension() == "xlsx"));

    let err = browser
        .handle(&columns, &GridRequest::new().with_export("pdf", true), uri)
        .expect_err("unknown mode");
    assert_eq!(err.code_str(), "invalid_argument");

    let outcome = browser
        .handle(&columns, &GridRequest::new(), uri)
        .expect("page");
    assert!(matches!(outcome, BrowseOutcome::Page(page) if page.total() == 5));
}

#[test]
fn empty_selection_falls_back_to_default_columns() {
    let config =
        BrowserConfig::default().with_default_columns(["Lexique383__cgram", "Lexique383__freq"]);
    let browser = LexiconBrowser::new(lexique(4), config);
    let descriptors = browser.describe_columns(&[]).expect("describe");
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[1].reference, "Lexique383__freq");
    assert_eq!(descriptors[1].dataset, "Lexique383");
    assert_eq!(descriptors[1].kind, ColumnKind::Float);
    let page = browser.query(&[], &GridRequest::new()).expect("query");
    assert_eq!(page.rows[0].len(), 3);

    let bare = LexiconBrowser::new(lexique(4), BrowserConfig::default());
    let err = bare.query(&[], &GridRequest::new()).expect_err("no columns");
    assert_eq!(err.code_str(), "invalid_argument");
}

#[test]
fn column_bounds_cover_the_whole_dataset() {
    let browser = LexiconBrowser::new(three_datasets(), BrowserConfig::default());
    let bounds = browser
        .column_bounds("Voisins__NbVoisOrth")
        .expect("bounds");
    assert_eq!(bounds.min, Value::Integer(0));
    assert_eq!(bounds.max, Value::Integer(999));
    let err = browser
        .column_bounds("Lexique383__cgram")
        .expect_err("text column");
    assert!(err.is_client_error());
}

/// Counts full scans of one dataset.
struct ScanCounting {
    inner: MemoryStorage,
    watched: DatasetId,
    scans: AtomicUsize,
}

impl ScanCounting {
    fn new(inner: MemoryStorage, watched: &str) -> Self {
        let watched = inner
            .dataset_by_code(watched)
            .expect("lookup")
            .expect("watched dataset")
            .id;
        Self {
            inner,
            watched,
            scans: AtomicUsize::new(0),
        }
    }

    fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

impl Storage for ScanCounting {
    fn dataset(&self, id: DatasetId) -> BrowseResult<Option<Dataset>> {
        self.inner.dataset(id)
    }

    fn dataset_by_code(&self, code: &str) -> BrowseResult<Option<Dataset>> {
        self.inner.dataset_by_code(code)
    }

    fn column(&self, dataset: DatasetId, id: ColumnId) -> BrowseResult<Option<Column>> {
        self.inner.column(dataset, id)
    }

    fn column_by_code(&self, dataset: DatasetId, code: &str) -> BrowseResult<Option<Column>> {
        self.inner.column_by_code(dataset, code)
    }

    fn project(&self, dataset: DatasetId, codes: &[&str]) -> BrowseResult<Vec<ProjectedRecord>> {
        if dataset == self.watched {
            self.scans.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.project(dataset, codes)
    }

    fn project_ids(
        &self,
        dataset: DatasetId,
        ids: &[RecordId],
        codes: &[&str],
    ) -> BrowseResult<Vec<ProjectedRecord>> {
        self.inner.project_ids(dataset, ids, codes)
    }

    fn first_by_key(
        &self,
        dataset: DatasetId,
        key: &str,
        codes: &[&str],
    ) -> BrowseResult<Option<ProjectedRecord>> {
        self.inner.first_by_key(dataset, key, codes)
    }
}

#[test]
fn cold_unfiltered_join_scans_the_canonical_dataset_once() {
    let storage = ScanCounting::new(three_datasets(), "Lexique383");
    let config = BrowserConfig::default().with_default_dataset("Lexique383");
    let browser = LexiconBrowser::new(storage, config);
    let columns = refs(&["Lexique383__nblettres", "Voisins__NbVoisOrth"]);
    let request = GridRequest::new().with_window(0, PageLength::Limit(2));

    let page = browser.query(&columns, &request).expect("cold query");
    assert_eq!(page.total(), 8);
    assert_eq!(page.displayed(), 8);
    assert_eq!(page.rows.len(), 2);
    assert_eq!(browser.storage().scans(), 1);

    let again = browser.query(&columns, &request).expect("warm query");
    assert_eq!(again, page);
    assert_eq!(browser.storage().scans(), 1);
}

#[test]
fn invalidate_refreshes_indefinitely_cached_counts() {
    let config =
        BrowserConfig::default().with_default_columns(["Lexique383__cgram", "Lexique383__freq"]);
    let browser = LexiconBrowser::new(lexique(4), config);
    let request = GridRequest::new();
    assert_eq!(browser.query(&[], &request).expect("first").total(), 4);

    let lex = browser
        .storage()
        .dataset_by_code("Lexique383")
        .expect("lookup")
        .expect("dataset")
        .id;
    browser
        .storage()
        .load_records(
            lex,
            (4..6).map(|i| (format!("w{i}"), Payload::new().with("cgram", "ADJ"))),
        )
        .expect("load more");

    let stale = browser.query(&[], &request).expect("stale");
    assert_eq!(stale.total(), 4);
    assert_eq!(stale.displayed(), 4);

    browser.invalidate(&[], &request).expect("invalidate");
    let fresh = browser.query(&[], &request).expect("fresh");
    assert_eq!(fresh.total(), 6);
    assert_eq!(fresh.displayed(), 6);
}

#[test]
fn single_dataset_bounds_follow_new_loads() {
    let browser = LexiconBrowser::new(lexique(7), BrowserConfig::default());
    let columns = refs(&["Lexique383__cgram", "Lexique383__nblettres"]);
    let request = GridRequest::new();
    let before = browser.query(&columns, &request).expect("before");
    assert_eq!(
        before.min_max_dict["Lexique383__nblettres"].max,
        Value::Integer(6)
    );

    let lex = browser
        .storage()
        .dataset_by_code("Lexique383")
        .expect("lookup")
        .expect("dataset")
        .id;
    browser
        .storage()
        .load_records(
            lex,
            [("anticonstitutionnellement", Payload::new().with("nblettres", 25_i64))],
        )
        .expect("load more");

    let after = browser.query(&columns, &request).expect("after");
    assert_eq!(
        after.min_max_dict["Lexique383__nblettres"].max,
        Value::Integer(25)
    );
}
