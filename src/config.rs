//! Runtime configuration
//!
//! Every setting has an environment fallback so the binaries can run from a
//! docker-compose file without flags.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

/// Bucket used when a trigger does not name one
pub const DEFAULT_BUCKET: &str = "data";

/// Prefix the population JSON is stored under
pub const POPULATION_PREFIX: &str = "population";

/// Object name of the population JSON inside [`POPULATION_PREFIX`]
pub const POPULATION_OBJECT_NAME: &str = "honolulu_population_data.json";

pub const DEFAULT_ROOT_URL: &str = "http://bls-app:5000";
pub const DEFAULT_LISTING_PATH: &str = "/pub/time.series/pr/";
pub const DEFAULT_POPULATION_URL: &str = "https://honolulu-api.datausa.io/tesseract/data.jsonrecords?cube=acs_yg_total_population_1&drilldowns=Year%2CNation&locale=en&measures=Population";

/// Object store connection settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Custom endpoint (MinIO, R2). `None` means AWS.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Upper bound for every store call
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// How listing hrefs are turned into absolute URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkBase {
    /// Resolve against the scheme+host root
    #[default]
    SiteRoot,
    /// Resolve against the listing page URL
    ListingPage,
}

impl FromStr for LinkBase {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "site-root" => Ok(LinkBase::SiteRoot),
            "listing-page" => Ok(LinkBase::ListingPage),
            other => Err(MirrorError::Config(format!(
                "unknown link base '{}' (expected site-root or listing-page)",
                other
            ))),
        }
    }
}

/// Where remote files and the population API live
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub root_url: String,
    pub listing_path: String,
    pub link_base: LinkBase,
    pub listing_timeout: Duration,
    pub file_timeout: Duration,
    pub population_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root_url: DEFAULT_ROOT_URL.to_string(),
            listing_path: DEFAULT_LISTING_PATH.to_string(),
            link_base: LinkBase::SiteRoot,
            listing_timeout: Duration::from_secs(30),
            file_timeout: Duration::from_secs(60),
            population_url: DEFAULT_POPULATION_URL.to_string(),
        }
    }
}

impl SourceConfig {
    /// Absolute URL of the listing page, always with a trailing slash
    pub fn listing_url(&self) -> String {
        format!(
            "{}/{}",
            self.root_url.trim_end_matches('/'),
            self.listing_path.trim_matches('/')
        ) + "/"
    }

    /// Object-store prefix mirroring the listing path (`pub/time.series/pr/`)
    pub fn store_prefix(&self) -> String {
        let trimmed = self.listing_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        }
    }
}

/// Tuning for a sync pass
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Maximum in-flight transfers
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

/// Object store flags shared by the binaries
#[derive(clap::Args, Debug, Clone)]
pub struct StoreArgs {
    /// Custom S3 endpoint (MinIO)
    #[arg(long, env = "MINIO_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Store region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub access_key_id: Option<String>,

    /// Secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Per-call store timeout in seconds
    #[arg(long, env = "MIRRORCAST_STORE_TIMEOUT_SECS", default_value = "30")]
    pub store_timeout_secs: u64,
}

impl StoreArgs {
    pub fn to_config(&self) -> StoreConfig {
        StoreConfig {
            endpoint: self.endpoint.clone().filter(|e| !e.is_empty()),
            region: self.region.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            operation_timeout: Duration::from_secs(self.store_timeout_secs),
        }
    }
}

/// Remote source flags shared by the binaries
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Root URL of the file server
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_ROOT_URL)]
    pub root_url: String,

    /// Path of the directory listing
    #[arg(long, env = "MIRRORCAST_LISTING_PATH", default_value = DEFAULT_LISTING_PATH)]
    pub listing_path: String,

    /// Resolve listing links against the site root or the listing page
    #[arg(long, env = "MIRRORCAST_LINK_BASE", default_value = "site-root")]
    pub link_base: LinkBase,

    /// Population API URL
    #[arg(long, env = "MIRRORCAST_POPULATION_URL", default_value = DEFAULT_POPULATION_URL)]
    pub population_url: String,

    /// Listing fetch timeout in seconds
    #[arg(long, env = "MIRRORCAST_LISTING_TIMEOUT_SECS", default_value = "30")]
    pub listing_timeout_secs: u64,

    /// File download timeout in seconds
    #[arg(long, env = "MIRRORCAST_FILE_TIMEOUT_SECS", default_value = "60")]
    pub file_timeout_secs: u64,

    /// Maximum concurrent transfers during a sync
    #[arg(long, env = "MIRRORCAST_SYNC_CONCURRENCY", default_value = "8")]
    pub concurrency: usize,
}

impl SourceArgs {
    pub fn to_config(&self) -> SourceConfig {
        SourceConfig {
            root_url: self.root_url.clone(),
            listing_path: self.listing_path.clone(),
            link_base: self.link_base,
            listing_timeout: Duration::from_secs(self.listing_timeout_secs),
            file_timeout: Duration::from_secs(self.file_timeout_secs),
            population_url: self.population_url.clone(),
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.concurrency,
        }
    }
}
