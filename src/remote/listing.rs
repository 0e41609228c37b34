//! Directory listing parser
//!
//! Listing pages are plain HTML (`<A HREF="/pub/time.series/pr/pr.txt">`).
//! Only anchors are inspected; everything else on the page is ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::config::{LinkBase, SourceConfig};
use crate::error::{MirrorError, Result};
use crate::types::{RemoteFileEntry, RemoteListing};

static HREF_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
    )
    .unwrap()
});

/// Every href in `html`, in document order, entity-decoded and trimmed
pub fn extract_hrefs(html: &str) -> Vec<String> {
    HREF_PATTERN
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| decode_entities(m.as_str().trim()))
        .collect()
}

/// Hrefs that point at files rather than directories or sort links
pub fn is_file_href(href: &str) -> bool {
    !href.is_empty() && !href.ends_with('/') && !href.starts_with('?')
}

/// Final path segment of an href, ignoring query and fragment
pub fn filename_of(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Base URL hrefs are resolved against
///
/// `SiteRoot` keeps any path of the configured root URL, so a relative href
/// lands under it and an absolute-path href replaces it.
pub fn resolution_base(config: &SourceConfig) -> Result<Url> {
    let raw = match config.link_base {
        LinkBase::ListingPage => config.listing_url(),
        LinkBase::SiteRoot => format!("{}/", config.root_url.trim_end_matches('/')),
    };
    Url::parse(&raw).map_err(|e| MirrorError::Config(format!("invalid base URL {}: {}", raw, e)))
}

/// Parse a listing page into `filename -> absolute URL`
pub fn parse_listing(html: &str, base: &Url) -> RemoteListing {
    let mut listing = RemoteListing::new();

    for href in extract_hrefs(html) {
        if !is_file_href(&href) {
            continue;
        }
        let Some(filename) = filename_of(&href) else {
            continue;
        };

        let url = match base.join(&href) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Skipping unresolvable href {:?}: {}", href, e);
                continue;
            }
        };

        listing.insert(RemoteFileEntry {
            filename: filename.to_string(),
            url: url.to_string(),
        });
    }

    listing
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
