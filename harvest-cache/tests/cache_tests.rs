use harvest_cache::{cache_key, CacheSweeper, ResponseCache};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::Arc, thread, time::Duration};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    title: String,
    price: f64,
}

fn product(title: &str, price: f64) -> Product {
    Product {
        title: title.to_string(),
        price,
    }
}

#[test]
fn test_ttl_expiry_counts_miss_and_cleanup() {
    let cache = ResponseCache::new(100, Duration::from_secs(3600));
    cache.set_with_ttl("k", product("phone", 10.0), Duration::from_millis(10));

    assert_eq!(cache.get("k"), Some(product("phone", 10.0)));

    thread::sleep(Duration::from_millis(40));

    assert_eq!(cache.get("k"), None);
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expired_cleanups, 1);
}

#[test]
fn test_lru_scenario() {
    let cache = ResponseCache::new(2, Duration::from_secs(3600));
    cache.set("a", product("a", 1.0));
    cache.set("b", product("b", 2.0));
    cache.get("a");
    cache.set("c", product("c", 3.0));

    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.size, 2);
    assert!(cache.get("b").is_none());
    assert!(cache.get("a").is_some());
    assert!(cache.get("c").is_some());
}

#[test]
fn test_derived_keys_hit_the_same_entry() {
    let cache = ResponseCache::new(10, Duration::from_secs(3600));
    let key = cache_key(
        "scrape_product",
        &["https://example.com/item/1", "https://aff.example/1"],
        &json!({"platform": "amazon", "page": 1}),
    )
    .unwrap();
    cache.set(&key, product("item", 99.9));

    let same_key = cache_key(
        "scrape_product",
        &["https://example.com/item/1", "https://aff.example/1"],
        &json!({"page": 1, "platform": "amazon"}),
    )
    .unwrap();
    assert_eq!(cache.get(&same_key), Some(product("item", 99.9)));
}

#[test]
fn test_concurrent_access_respects_capacity() {
    let cache = Arc::new(ResponseCache::new(16, Duration::from_secs(3600)));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("{worker}-{i}");
                    cache.set(&key, i);
                    cache.get(&key);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.size, 16);
    assert_eq!(stats.evictions, 8 * 200 - 16);
}

#[tokio::test]
async fn test_sweeper_shutdown() {
    let cache: Arc<ResponseCache<u32>> = Arc::new(ResponseCache::default());
    let sweeper = CacheSweeper::spawn(cache.clone(), Duration::from_millis(10));
    cache.set_with_ttl("gone", 1, Duration::from_millis(1));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.is_empty());

    sweeper.shutdown().await;
}
