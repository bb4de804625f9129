//! Integration tests for keeper-cache

use keeper_cache::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    id: u64,
    name: String,
}

fn manager_with_dir(dir: &std::path::Path) -> CacheManager {
    let config = CacheConfig::new()
        .with_default("disk")
        .with_store("disk", StoreConfig::file(dir).with_prefix("app:"))
        .with_store("hot", StoreConfig::memory().with_prefix("hot:"));
    CacheManager::new(config)
}

#[test]
fn test_config_from_toml() {
    let config = CacheConfig::from_toml_str(
        r#"
        default = "hot"

        [stores.hot]
        type = "memory"
        prefix = "hot:"
        expire = 300

        [stores.disk]
        path = "/var/cache/keeper"
        tag_prefix = "t:"

        [stores.sessions]
        type = "redis"
        url = "redis://localhost:6379/2"
        lock_ttl = 30
        "#,
    )
    .unwrap();

    assert_eq!(config.default.as_deref(), Some("hot"));
    assert_eq!(config.store("hot").unwrap().expire, 300);
    assert_eq!(config.store("disk").unwrap().kind, "file");
    assert_eq!(config.store("disk").unwrap().tag_prefix, "t:");
    assert_eq!(config.store("sessions").unwrap().lock_ttl, 30);
}

#[test]
fn test_cache_error_display() {
    let err = CacheError::Type("only sequence-valued caches can be appended to".to_string());
    assert!(err.to_string().contains("sequence-valued"));
}

#[tokio::test]
async fn test_file_store_typed_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_dir(dir.path());

    let profile = Profile {
        id: 7,
        name: "Ada".to_string(),
    };
    manager.set("profile:7", &profile, None).await.unwrap();

    assert_eq!(
        manager.get::<Profile>("profile:7").await.unwrap(),
        Some(profile)
    );

    let driver = manager.resolve(None).unwrap();
    let handler = driver.handler_as::<FileHandler>().unwrap();
    assert!(handler.entry_path("app:profile:7").exists());
}

#[tokio::test]
async fn test_file_store_tag_invalidation() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_dir(dir.path());

    let tags = manager.tag("t").unwrap();
    tags.set("a", &1, None).await.unwrap();
    tags.set("b", &2, None).await.unwrap();

    tags.clear().await.unwrap();

    let driver = manager.resolve(None).unwrap();
    assert!(!manager.has("a").await.unwrap());
    assert!(!manager.has("b").await.unwrap());
    assert!(!driver.has(&driver.tag_key("t")).await.unwrap());
}

#[tokio::test]
async fn test_file_store_remember() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_dir(dir.path());

    assert_eq!(manager.remember("k", 42, None).await.unwrap(), 42);
    assert_eq!(manager.remember("k", 99, None).await.unwrap(), 42);
    assert!(!manager.has("k_lock").await.unwrap());
}

#[tokio::test]
async fn test_file_store_list_append() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_dir(dir.path());

    for item in ["a", "b", "a", "c"] {
        manager.push("recent", item).await.unwrap();
    }

    assert_eq!(
        manager.get::<Vec<String>>("recent").await.unwrap(),
        Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    );
}

#[tokio::test]
async fn test_file_store_huge_expire() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_dir(dir.path());

    manager
        .set("n", &7, Some(Expire::Seconds(1_000_000_000_001)))
        .await
        .unwrap();
    manager
        .set("greeting", "hello", Some(Expire::Seconds(i64::MAX)))
        .await
        .unwrap();

    assert_eq!(manager.get_value("n", Value::Null).await.unwrap(), Value::from(7));
    assert_eq!(
        manager.get::<String>("greeting").await.unwrap().as_deref(),
        Some("hello")
    );
}

#[tokio::test]
async fn test_named_stores_share_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with_dir(dir.path());

    let disk = manager.store("disk").unwrap();
    let hot = manager.store("hot").unwrap();
    disk.set("k", "disk", None).await.unwrap();
    hot.set("k", "hot", None).await.unwrap();

    assert_eq!(disk.get::<String>("k").await.unwrap().as_deref(), Some("disk"));
    assert_eq!(hot.get::<String>("k").await.unwrap().as_deref(), Some("hot"));
    assert!(Arc::ptr_eq(&hot, &manager.store("hot").unwrap()));
}

#[tokio::test]
async fn test_concurrent_remember_across_tasks() {
    let manager = Arc::new(CacheManager::new(
        CacheConfig::new()
            .with_default("hot")
            .with_store("hot", StoreConfig::memory()),
    ));

    let tasks: Vec<_> = (0..4u64)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move {
                let driver = manager.resolve(None).unwrap();
                driver
                    .remember_with(
                        "shared",
                        move || async move {
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok(i)
                        },
                        None,
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<u64> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let stored: u64 = manager.get("shared").await.unwrap().unwrap();
    assert!(results.iter().all(|r| *r < 4));
    assert!(stored < 4);
    assert!(!manager.has("shared_lock").await.unwrap());
}

// Note: These tests require a Redis server
// Run with: cargo test -- --ignored

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore]
async fn test_redis_store_roundtrip() {
    let manager = CacheManager::new(
        CacheConfig::new()
            .with_default("redis")
            .with_store("redis", StoreConfig::redis("redis://localhost:6379").with_prefix("keeper-test:")),
    );

    manager.set("key", "value", Some(Expire::from(60u64))).await.unwrap();
    assert_eq!(
        manager.get::<String>("key").await.unwrap().as_deref(),
        Some("value")
    );

    let driver = manager.resolve(None).unwrap();
    assert_eq!(driver.inc("counter", 2).await.unwrap(), 2);
    assert_eq!(driver.dec("counter", 1).await.unwrap(), 1);

    manager
        .delete_multiple(["key", "counter"])
        .await
        .unwrap();
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore]
async fn test_redis_tag_invalidation() {
    let manager = CacheManager::new(
        CacheConfig::new()
            .with_default("redis")
            .with_store("redis", StoreConfig::redis("redis://localhost:6379").with_prefix("keeper-tags:")),
    );

    let tags = manager.tag(["users", "active"]).unwrap();
    tags.set("user:1", "alice", None).await.unwrap();
    tags.set("user:2", "bob", None).await.unwrap();

    tags.clear().await.unwrap();
    assert!(!manager.has("user:1").await.unwrap());
    assert!(!manager.has("user:2").await.unwrap());
}
