//! Catalog document fetching and parsing.
//!
//! The aggregator document is INI-like:
//!
//! ```text
//! [network-section]
//! 0=label*irc.example.net*http://example.net/
//! 1=#chan*http://example.net/list.txt*1 Mix*public
//! ```
//!
//! A `0=` line switches the current network; every other entry names a
//! channel and the URL of its listing. Listings carry one pack per line:
//! `#1  BotName  1.9G  Some File.part01.rar`.

use crate::error::CatalogError;
use crate::fetch::DocumentFetcher;
use crate::types::{CatalogSource, FileDescriptor, IndexedFile};
use tracing::info;

/// Minimum tokens on a listing line: number, bot, size and at least one name token.
const COLUMNS_PER_FILE: usize = 4;

/// Prefix of the line that selects the network for following entries.
const NETWORK_LINE_PREFIX: &str = "0=";

/// Downloads and parses the aggregator document.
///
/// # Arguments
///
/// * `fetcher` - Document fetcher to use
/// * `catalog_url` - URL of the aggregator document
///
/// # Returns
///
/// The advertised sources in document order, or the fetch error.
pub async fn fetch_catalog(
    fetcher: &dyn DocumentFetcher,
    catalog_url: &str,
) -> Result<Vec<CatalogSource>, CatalogError> {
    info!("Retrieving catalog from {}", catalog_url);
    let content = fetcher.fetch(catalog_url).await?;
    let sources = parse_catalog(&content);
    info!("Catalog lists {} source(s)", sources.len());
    Ok(sources)
}

/// Parses the aggregator document into catalog sources.
///
/// Section headers, blank lines and entries without a listing URL are skipped.
pub fn parse_catalog(content: &str) -> Vec<CatalogSource> {
    let mut sources = Vec::new();
    let mut network = String::new();

    for line in content.lines() {
        if line.starts_with(NETWORK_LINE_PREFIX) {
            network = line.split('*').nth(1).unwrap_or_default().to_string();
            continue;
        }
        if line.trim().is_empty() || line.starts_with('[') {
            continue;
        }

        let Some((_, entry)) = line.split_once('=') else {
            continue;
        };
        let mut fields = entry.split('*');
        if let (Some(channel_name), Some(listing_url)) = (fields.next(), fields.next()) {
            sources.push(CatalogSource {
                channel_name: channel_name.to_string(),
                network: network.clone(),
                listing_url: listing_url.to_string(),
            });
        }
    }

    sources
}

/// Parses one source's listing document into index rows.
///
/// Lines with fewer than four whitespace-separated tokens are dropped; the
/// file name is every token after the size, joined by single spaces.
pub fn parse_listing(source: &CatalogSource, content: &str) -> Vec<IndexedFile> {
    content
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < COLUMNS_PER_FILE {
                return None;
            }
            Some(IndexedFile::from(FileDescriptor {
                network: source.network.clone(),
                channel_name: source.channel_name.clone(),
                bot_name: tokens[1].to_string(),
                file_number: tokens[0].to_string(),
                file_name: tokens[3..].join(" "),
                file_size: tokens[2].to_string(),
            }))
        })
        .collect()
}
