use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use exile_hud::cache::{JsonCache, LoadOptions, Loader};
use filetime::FileTime;
use serde_json::{json, Value};
use serial_test::serial;

fn write_json(dir: &tempfile::TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn bump_mtime(path: &std::path::Path) {
    let meta = fs::metadata(path).unwrap();
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime.unix_seconds() + 5, 0)).unwrap();
}

fn counting_loader(counter: Arc<AtomicUsize>, delay: Duration) -> Loader {
    Arc::new(move |text: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        serde_json::from_str(text).map_err(anyhow::Error::from)
    })
}

#[test]
fn fetch_parses_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "mods.json", &json!({"prefix": ["fiery"]}));
    let cache = JsonCache::new();

    let reads = Arc::new(AtomicUsize::new(0));
    let options = LoadOptions::with_loader(counting_loader(Arc::clone(&reads), Duration::ZERO));

    let first = cache.fetch(&path, &options).unwrap();
    assert_eq!(first["prefix"][0], "fiery");

    // same mtime: served from memory, loader untouched
    let second = cache.fetch(&path, &options).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[test]
fn mtime_change_invalidates_and_new_content_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "bases.json", &json!({"version": 1}));
    let cache = JsonCache::new();

    let reads = Arc::new(AtomicUsize::new(0));
    let options = LoadOptions::with_loader(counting_loader(Arc::clone(&reads), Duration::ZERO));

    assert_eq!(cache.fetch(&path, &options).unwrap()["version"], 1);

    fs::write(&path, serde_json::to_string(&json!({"version": 2})).unwrap()).unwrap();
    bump_mtime(&path);

    assert_eq!(cache.fetch(&path, &options).unwrap()["version"], 2);
    assert_eq!(reads.load(Ordering::SeqCst), 2);

    // unchanged mtime afterwards: no third read
    assert_eq!(cache.fetch(&path, &options).unwrap()["version"], 2);
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

#[test]
fn force_reloads_even_with_unchanged_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "gems.json", &json!([1, 2, 3]));
    let cache = JsonCache::new();

    let reads = Arc::new(AtomicUsize::new(0));
    let counted = LoadOptions::with_loader(counting_loader(Arc::clone(&reads), Duration::ZERO));
    cache.fetch(&path, &counted).unwrap();

    let mut forced = counted.clone();
    forced.force = true;
    cache.fetch(&path, &forced).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

#[test]
#[serial]
fn concurrent_fetches_of_one_path_read_the_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "uniques.json", &json!({"items": []}));
    let cache = Arc::new(JsonCache::new());

    let reads = Arc::new(AtomicUsize::new(0));
    let options = LoadOptions::with_loader(counting_loader(
        Arc::clone(&reads),
        Duration::from_millis(200),
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        let path = path.clone();
        let options = options.clone();
        handles.push(thread::spawn(move || {
            cache.fetch(&path, &options).map(|v| (*v).clone())
        }));
    }
    for handle in handles {
        let value = handle.join().unwrap().unwrap();
        assert_eq!(value, json!({"items": []}));
    }
    assert_eq!(reads.load(Ordering::SeqCst), 1, "one physical read+parse");
}

#[test]
fn owned_fetches_are_isolated_from_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "maps.json", &json!({"tier": 1}));
    let cache = JsonCache::new();

    let mut owned = cache.fetch_owned(&path, &LoadOptions::default()).unwrap();
    owned["tier"] = json!(16);
    owned["injected"] = json!(true);

    let fresh = cache.fetch(&path, &LoadOptions::default()).unwrap();
    assert_eq!(fresh["tier"], 1);
    assert!(fresh.get("injected").is_none());
}

#[test]
fn parse_failure_carries_the_path_and_is_retryable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    let cache = JsonCache::new();

    let err = cache.fetch(&path, &LoadOptions::default()).unwrap_err();
    assert!(
        format!("{err:#}").contains("broken.json"),
        "error should name the file: {err:#}"
    );

    // a failed load leaves no entry and no stuck in-flight slot
    fs::write(&path, "{\"fixed\": true}").unwrap();
    let value = cache.fetch(&path, &LoadOptions::default()).unwrap();
    assert_eq!(value["fixed"], true);
}

#[test]
fn vanished_file_is_a_miss_not_a_stale_hit() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "league.json", &json!({"name": "Standard"}));
    let cache = JsonCache::new();

    cache.fetch(&path, &LoadOptions::default()).unwrap();
    fs::remove_file(&path).unwrap();

    // stale entry must not be served; the reload surfaces the miss
    let err = cache.fetch(&path, &LoadOptions::default()).unwrap_err();
    assert!(format!("{err:#}").contains("league.json"));
    assert!(cache.is_empty(), "stale entry must be dropped");
}

#[test]
fn prime_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "stats.json", &json!({}));
    let other = write_json(&dir, "monsters.json", &json!({}));
    let cache = JsonCache::new();

    cache.prime(&path).unwrap();
    cache.prime(&other).unwrap();
    assert_eq!(cache.len(), 2);

    cache.clear(Some(&path));
    assert_eq!(cache.len(), 1);
    cache.clear(None);
    assert!(cache.is_empty());
}

#[test]
fn custom_loader_output_is_what_gets_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_json(&dir, "tree.json", &json!({"nodes": [1, 2]}));
    let cache = JsonCache::new();

    let loader: Loader = Arc::new(|text| {
        let parsed: Value = serde_json::from_str(text)?;
        Ok(json!({ "node_count": parsed["nodes"].as_array().map(Vec::len).unwrap_or(0) }))
    });
    let value = cache
        .fetch(&path, &LoadOptions::with_loader(loader))
        .unwrap();
    assert_eq!(value["node_count"], 2);

    // cached shape, not the raw file, on the next hit
    let again = cache.fetch(&path, &LoadOptions::default()).unwrap();
    assert_eq!(again["node_count"], 2);
}
