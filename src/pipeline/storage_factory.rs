use crate::Config;
use crate::storage::limiter::RequestLimiter;
use crate::storage::s3::S3StorageFactory;
use crate::storage::{Storage, StoragePair};

pub async fn create_storage_pair(config: &Config) -> StoragePair {
    let source = S3StorageFactory::create(&config.source_client_config).await;
    let target = S3StorageFactory::create(&config.target_client_config).await;

    StoragePair { source, target }
}

/// Each endpoint gets its own `max_pool_connections` request budget, shared by every worker
/// and every part upload against that endpoint.
pub fn limit_storage_pair(
    source: Storage,
    target: Storage,
    max_pool_connections: usize,
) -> StoragePair {
    StoragePair {
        source: RequestLimiter::boxed_new(source, max_pool_connections),
        target: RequestLimiter::boxed_new(target, max_pool_connections),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::args::parse_from_args;
    use crate::storage::memory::MemoryStorage;

    #[tokio::test]
    async fn create_s3_storage_pair() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--source-access-key",
            "source_access_key",
            "--source-secret-access-key",
            "source_secret_access_key",
            "--target-access-key",
            "target_access_key",
            "--target-secret-access-key",
            "target_secret_access_key",
            "--source-region",
            "us-east-1",
            "--target-region",
            "us-west-2",
        ];
        let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();

        let StoragePair { source, target } = create_storage_pair(&config).await;
        let _ = limit_storage_pair(source, target, config.max_pool_connections);
    }

    #[tokio::test]
    async fn limited_pair_keeps_endpoints_apart() {
        init_dummy_tracing_subscriber();

        let source = MemoryStorage::new();
        source.insert_bucket("bucket1");
        let target = MemoryStorage::new();

        let StoragePair { source: limited_source, target: limited_target } =
            limit_storage_pair(source.boxed(), target.boxed(), 1);

        assert!(limited_source.bucket_exists("bucket1").await.unwrap());
        assert!(!limited_target.bucket_exists("bucket1").await.unwrap());
        assert_eq!(source.request_count(), 1);
        assert_eq!(target.request_count(), 1);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
