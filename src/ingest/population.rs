//! Population API pull

use crate::config::POPULATION_OBJECT_NAME;
use crate::error::Result;
use crate::remote::RemoteSource;
use crate::storage::ObjectStore;

/// Key the population JSON is stored under
pub fn population_key(prefix: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        POPULATION_OBJECT_NAME.to_string()
    } else {
        format!("{}/{}", prefix, POPULATION_OBJECT_NAME)
    }
}

/// Fetch the population API response and store it as JSON
///
/// The body must parse as JSON; an HTML error page served with a 200 is
/// rejected instead of being staged. Returns the written key.
pub async fn pull_population(
    remote: &dyn RemoteSource,
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    url: &str,
) -> Result<String> {
    let body = remote.fetch_file(url).await?;
    let document: serde_json::Value = serde_json::from_slice(&body)?;

    let key = population_key(prefix);
    store
        .put(
            bucket,
            &key,
            serde_json::to_vec(&document)?,
            Some("application/json"),
        )
        .await?;

    tracing::info!("Stored population data at s3://{}/{}", bucket, key);
    Ok(key)
}
