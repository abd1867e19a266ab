use std::time::Duration;

/// Rows from the end of the result set within which tail pages are read in reverse.
pub const PAGE_THRESHOLD: usize = 20_000;

/// Lifetime of every non-default result cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

const OPENLEXICON_DEFAULT_DATASET: &str = "Lexique383";
const OPENLEXICON_DEFAULT_COLUMNS: [&str; 10] = [
    "phon",
    "lemme",
    "cgram",
    "freqlemfilms2",
    "freqfilms2",
    "nblettres",
    "puorth",
    "puphon",
    "nbsyll",
    "cgramortho",
];

/// Runtime configuration for a browser instance.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Dataset code preferred as canonical when it is part of a multi-dataset selection.
    pub default_dataset: Option<String>,
    /// Column references served when a request names none.
    pub default_columns: Vec<String>,
    pub page_threshold: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub default_page_length: usize,
    pub export_basename: String,
    pub export_chunk_bytes: usize,
    pub export_channel_capacity: usize,
    /// Ordered ids fetched per storage round-trip while exporting.
    pub export_fetch_rows: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            default_dataset: None,
            default_columns: Vec::new(),
            page_threshold: PAGE_THRESHOLD,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: 4096,
            default_page_length: 10,
            export_basename: "OpenLexicon".to_string(),
            export_chunk_bytes: 64 * 1024,
            export_channel_capacity: 8,
            export_fetch_rows: 512,
        }
    }
}

impl BrowserConfig {
    /// Profile matching the public lexicon site: Lexique383 as reference dataset and
    /// its usual columns plus the orthographic neighbour count.
    pub fn openlexicon() -> Self {
        let mut default_columns: Vec<String> = OPENLEXICON_DEFAULT_COLUMNS
            .iter()
            .map(|code| format!("{OPENLEXICON_DEFAULT_DATASET}__{code}"))
            .collect();
        default_columns.push("Voisins__NbVoisOrth".to_string());
        Self {
            default_dataset: Some(OPENLEXICON_DEFAULT_DATASET.to_string()),
            default_columns,
            ..Self::default()
        }
    }

    pub fn with_default_dataset(mut self, code: impl Into<String>) -> Self {
        self.default_dataset = Some(code.into());
        self
    }

    pub fn with_default_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page_threshold(mut self, threshold: usize) -> Self {
        self.page_threshold = threshold.max(1);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}
