//! The rebuildable, searchable in-memory catalog index.

use crate::catalog::{fetch_catalog, parse_listing};
use crate::error::CatalogError;
use crate::fetch::DocumentFetcher;
use crate::types::{CatalogSource, IndexedFile, MuleConfig};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

/// Summary of one index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Sources whose listing was fetched and parsed.
    pub sources_indexed: usize,
    /// Sources skipped because their channel is excluded.
    pub sources_excluded: usize,
    /// Sources whose listing could not be fetched.
    pub sources_failed: usize,
    pub files: usize,
    pub elapsed: Duration,
}

/// One complete generation of the index. Never mutated after publication.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub generation: u64,
    pub built_at: SystemTime,
    pub files: Vec<IndexedFile>,
    pub stats: RebuildStats,
}

/// Whitespace-separated search tokens that must appear in order.
///
/// Matching is case-sensitive and allows arbitrary text between tokens, so
/// `"foo bar"` matches `"foo.the.bar.mkv"` but not `"bar.foo.mkv"`.
#[derive(Debug, Clone)]
pub struct SearchPattern {
    tokens: Vec<String>,
}

impl SearchPattern {
    pub fn new(term: &str) -> Self {
        Self {
            tokens: term.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        let mut rest = file_name;
        for token in &self.tokens {
            match rest.find(token.as_str()) {
                Some(at) => rest = &rest[at + token.len()..],
                None => return false,
            }
        }
        true
    }
}

/// Searchable catalog of every file advertised by the configured sources.
///
/// The index is built lazily by the first search, or eagerly by
/// [`CatalogIndex::refresh`]. Each rebuild publishes a whole new
/// [`IndexSnapshot`]; searches hold on to the snapshot they started with.
pub struct CatalogIndex {
    fetcher: Arc<dyn DocumentFetcher>,
    catalog_url: String,
    excluded_channels: HashSet<String>,
    max_concurrent_fetches: usize,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    // Serialises refreshes and lazy bootstraps.
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
}

impl CatalogIndex {
    pub fn new(config: &MuleConfig, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self {
            fetcher,
            catalog_url: config.catalog_url.clone(),
            excluded_channels: config.excluded_channels.clone(),
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Fetches and parses the aggregator document.
    pub async fn fetch_catalog(&self) -> Result<Vec<CatalogSource>, CatalogError> {
        fetch_catalog(self.fetcher.as_ref(), &self.catalog_url).await
    }

    /// Rebuilds the index from `sources` and publishes it.
    ///
    /// Listings are fetched in parallel. A source that fails is logged and
    /// left out; it never aborts the rebuild of the others. Rebuilds and
    /// refreshes run one at a time, so generations are published in order.
    pub async fn rebuild_index(&self, sources: Vec<CatalogSource>) -> RebuildStats {
        let _guard = self.refresh_lock.lock().await;
        self.rebuild_locked(sources).await
    }

    // Caller holds `refresh_lock`.
    async fn rebuild_locked(&self, sources: Vec<CatalogSource>) -> RebuildStats {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let mut stats = RebuildStats::default();

        let mut tasks = Vec::new();
        for source in sources {
            if self.excluded_channels.contains(&source.channel_name) {
                debug!("Skipping excluded channel {}", source.channel_name);
                stats.sources_excluded += 1;
                continue;
            }

            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                let result = fetcher.fetch(&source.listing_url).await;
                (source, result)
            }));
        }

        let mut files = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((source, Ok(content))) => {
                    let parsed = parse_listing(&source, &content);
                    debug!(
                        "Indexed {} file(s) from {} ({})",
                        parsed.len(),
                        source.channel_name,
                        source.network
                    );
                    files.extend(parsed);
                    stats.sources_indexed += 1;
                }
                Ok((source, Err(e))) => {
                    warn!(
                        "Failed to retrieve listing for {} ({}): {}",
                        source.channel_name, source.listing_url, e
                    );
                    stats.sources_failed += 1;
                }
                Err(e) => {
                    error!("{}", CatalogError::TaskFailed(e.to_string()));
                    stats.sources_failed += 1;
                }
            }
        }

        stats.files = files.len();
        stats.elapsed = started.elapsed();

        let snapshot = Arc::new(IndexSnapshot {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            built_at: SystemTime::now(),
            files,
            stats,
        });
        info!(
            "Index generation {} built: {} file(s) from {} source(s), {} failed, {} excluded in {}",
            snapshot.generation,
            stats.files,
            stats.sources_indexed,
            stats.sources_failed,
            stats.sources_excluded,
            humantime::format_duration(Duration::from_millis(stats.elapsed.as_millis() as u64))
        );
        *self.snapshot.write().await = Some(snapshot);

        stats
    }

    /// Fetches the catalog and rebuilds the index from it.
    ///
    /// A failure to fetch the aggregator document is returned and leaves the
    /// current index in place.
    pub async fn refresh(&self) -> Result<RebuildStats, CatalogError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<RebuildStats, CatalogError> {
        let sources = self.fetch_catalog().await?;
        Ok(self.rebuild_locked(sources).await)
    }

    /// Returns every indexed file whose name contains the tokens of `term`
    /// in order. An empty term returns the whole index.
    ///
    /// Builds the index first if it has never been built.
    pub async fn search(&self, term: &str) -> Result<Vec<IndexedFile>, CatalogError> {
        let snapshot = self.current_or_bootstrap().await?;
        let pattern = SearchPattern::new(term);
        let results: Vec<IndexedFile> = snapshot
            .files
            .iter()
            .filter(|file| pattern.matches(&file.file.file_name))
            .cloned()
            .collect();
        debug!(
            "Search for '{}' matched {} file(s) in generation {}",
            term,
            results.len(),
            snapshot.generation
        );
        Ok(results)
    }

    /// The published snapshot, if any rebuild has completed.
    pub async fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().await.clone()
    }

    /// Stats of the published snapshot.
    pub async fn stats(&self) -> Option<RebuildStats> {
        self.snapshot().await.map(|snapshot| snapshot.stats)
    }

    async fn current_or_bootstrap(&self) -> Result<Arc<IndexSnapshot>, CatalogError> {
        if let Some(snapshot) = self.snapshot().await {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have finished the bootstrap while we waited.
        if let Some(snapshot) = self.snapshot().await {
            return Ok(snapshot);
        }
        info!("No index yet, building it before searching");
        self.refresh_locked().await?;
        self.snapshot().await.ok_or_else(|| {
            CatalogError::TaskFailed("index missing after rebuild".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFetcher;

    const CATALOG_URL: &str = "http://catalog/xdcc.ini";
    const CATALOG: &str = "[foo]\n\
                           0=foo*irc.foo.biz*http://foo.org/\n\
                           1=#a-b-c*http://a-b-c/list*1 Mix*public\n\
                           2=#Pierpaolo*http://pierpaolo/list*1 Mix*public\n\
                           3=#broken*http://broken/list*1 Mix*public\n";

    fn fetcher() -> FakeFetcher {
        FakeFetcher::new()
            .with(CATALOG_URL, CATALOG)
            .with(
                "http://a-b-c/list",
                "#1   AeC|1P|01 1.9G Foo-Fuugther.part01.rar\n\
                 #2   AeC|1P|01 1.9G Foo-Fuugther.part02.rar\n\
                 garbage",
            )
            .with(
                "http://pierpaolo/list",
                "#1 Pier 700M foo and bar.mkv\n#2 Pier 700M bar then foo.mkv",
            )
    }

    fn index_with(fetcher: Arc<FakeFetcher>, excluded: &[&str]) -> CatalogIndex {
        let config = MuleConfig {
            catalog_url: CATALOG_URL.to_string(),
            excluded_channels: excluded.iter().map(|c| c.to_string()).collect(),
            ..MuleConfig::default()
        };
        CatalogIndex::new(&config, fetcher)
    }

    #[test]
    fn test_search_pattern_requires_tokens_in_order() {
        let pattern = SearchPattern::new("  foo   bar ");
        assert!(pattern.matches("foo and bar.mkv"));
        assert!(pattern.matches("foobar"));
        assert!(!pattern.matches("bar then foo.mkv"));
        assert!(!pattern.matches("Foo and Bar.mkv"));
        assert!(SearchPattern::new("").matches("anything"));
    }

    #[tokio::test]
    async fn test_empty_search_returns_every_parsed_line() {
        let fetcher = Arc::new(fetcher());
        let index = index_with(fetcher.clone(), &[]);

        let stats = index.refresh().await.unwrap();
        assert_eq!(stats.sources_indexed, 2);
        assert_eq!(stats.sources_failed, 1);
        assert_eq!(stats.files, 4);

        let files = index.search("").await.unwrap();
        assert_eq!(files.len(), 4);
        assert!(files.iter().all(|f| f.id == f.file.key()));
        assert!(files.iter().all(|f| f.file.network == "irc.foo.biz"));
    }

    #[tokio::test]
    async fn test_search_matches_tokens_in_order() {
        let index = index_with(Arc::new(fetcher()), &[]);
        index.refresh().await.unwrap();

        let files = index.search("foo bar").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file.file_name, "foo and bar.mkv");
        assert_eq!(files[0].file.channel_name, "#Pierpaolo");
    }

    #[tokio::test]
    async fn test_excluded_channel_is_never_fetched() {
        let fetcher = Arc::new(fetcher());
        let index = index_with(fetcher.clone(), &["#a-b-c"]);

        let stats = index.refresh().await.unwrap();
        assert_eq!(stats.sources_excluded, 1);
        assert_eq!(fetcher.request_count("http://a-b-c/list"), 0);
        assert_eq!(fetcher.request_count("http://pierpaolo/list"), 1);
        assert!(index
            .search("")
            .await
            .unwrap()
            .iter()
            .all(|f| f.file.channel_name != "#a-b-c"));
    }

    #[tokio::test]
    async fn test_concurrent_rebuilds_publish_in_order() {
        let fetcher = Arc::new(fetcher());
        let index = index_with(fetcher.clone(), &[]);
        let source = |channel: &str, url: &str| CatalogSource {
            channel_name: channel.to_string(),
            network: "irc.foo.biz".to_string(),
            listing_url: url.to_string(),
        };

        let (first, second) = tokio::join!(
            index.rebuild_index(vec![source("#a-b-c", "http://a-b-c/list")]),
            index.rebuild_index(vec![source("#Pierpaolo", "http://pierpaolo/list")])
        );
        assert_eq!(first.files, 2);
        assert_eq!(second.files, 2);

        let snapshot = index.snapshot().await.unwrap();
        assert_eq!(snapshot.generation, 2);
        assert!(snapshot
            .files
            .iter()
            .all(|f| f.file.channel_name == "#Pierpaolo"));
    }

    #[tokio::test]
    async fn test_search_bootstraps_index_once() {
        let fetcher = Arc::new(fetcher());
        let index = index_with(fetcher.clone(), &[]);
        assert!(index.snapshot().await.is_none());

        let (a, b) = tokio::join!(index.search("Foo"), index.search("bar"));
        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(b.unwrap().len(), 2);
        assert_eq!(fetcher.request_count(CATALOG_URL), 1);
        assert_eq!(index.snapshot().await.unwrap().generation, 1);
    }

    #[tokio::test]
    async fn test_failed_catalog_fetch_is_surfaced() {
        let fetcher = Arc::new(fetcher());
        let index = index_with(fetcher.clone(), &[]);
        index.refresh().await.unwrap();

        let broken = CatalogIndex::new(
            &MuleConfig {
                catalog_url: "http://nowhere/".to_string(),
                ..MuleConfig::default()
            },
            fetcher.clone(),
        );
        assert!(broken.refresh().await.is_err());
        assert!(broken.search("foo").await.is_err());
        assert!(broken.snapshot().await.is_none());

        let stats = index.refresh().await.unwrap();
        assert_eq!(stats.files, 4);
        assert_eq!(index.snapshot().await.unwrap().generation, 2);
    }
}
