use qdrant_client::{config::QdrantConfig, Qdrant};
use std::time::Duration;

use super::vector_db::VectorDBError;

/// Qdrant serves REST on 6333 and gRPC on 6334; the client speaks gRPC.
pub fn grpc_url(url: &str) -> String {
    // Keep the scheme so TLS endpoints stay on https
    let (scheme, host) = match url.split_once("://") {
        Some((scheme, host)) => (scheme, host),
        None => ("http", url),
    };
    let host = host.trim_end_matches('/');

    match host.strip_suffix(":6333") {
        Some(base) => format!("{}://{}:6334", scheme, base),
        None => format!("{}://{}", scheme, host),
    }
}

pub async fn create_qdrant_client(url: &str) -> Result<Qdrant, VectorDBError> {
    let url_with_scheme = grpc_url(url);
    log::info!("Attempting to connect to Qdrant with URL: {}", url_with_scheme);

    let mut config = QdrantConfig::from_url(&url_with_scheme);
    config.timeout = Duration::from_secs(30);
    config.connect_timeout = Duration::from_secs(10);
    if let Ok(api_key) = std::env::var("QDRANT_API_KEY") {
        config.api_key = Some(api_key);
    }

    let client = Qdrant::new(config).map_err(|e| VectorDBError::Connection(e.to_string()))?;

    // Test the connection
    match client.list_collections().await {
        Ok(_) => {
            log::info!("Successfully connected to Qdrant");
            Ok(client)
        }
        Err(e) => {
            log::error!("Connection test failed: {}", e);
            Err(VectorDBError::Connection(format!(
                "Failed to connect to Qdrant: {}",
                e
            )))
        }
    }
}
