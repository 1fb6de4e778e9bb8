use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::SystemTime;

use anyhow::{anyhow, Context};
use serde_json::Value;

/// Pluggable parse step for [`JsonCache::fetch`]; the default is plain
/// `serde_json::from_str`.
pub type Loader = Arc<dyn Fn(&str) -> anyhow::Result<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Discard any cached entry for the path before loading.
    pub force: bool,
    pub loader: Option<Loader>,
}

impl LoadOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            loader: None,
        }
    }

    pub fn with_loader(loader: Loader) -> Self {
        Self {
            force: false,
            loader: Some(loader),
        }
    }
}

struct CacheEntry {
    data: Arc<Value>,
    mtime: SystemTime,
}

type LoadResult = Result<Arc<Value>, Arc<anyhow::Error>>;

struct LoadSlot {
    result: Mutex<Option<LoadResult>>,
    ready: Condvar,
}

impl LoadSlot {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, result: LoadResult) {
        *self.result.lock().unwrap() = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> LoadResult {
        let mut guard = self.result.lock().unwrap();
        while guard.is_none() {
            guard = self.ready.wait(guard).unwrap();
        }
        guard.as_ref().cloned().unwrap_or_else(|| {
            // unreachable: the loop above only exits once Some
            Err(Arc::new(anyhow!("load slot abandoned")))
        })
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<PathBuf, CacheEntry>,
    in_flight: HashMap<PathBuf, Arc<LoadSlot>>,
}

enum FetchPlan {
    Hit(Arc<Value>),
    Wait(Arc<LoadSlot>),
    Load(Arc<LoadSlot>),
}

/// File-backed JSON cache keyed by path.
///
/// A cached entry is served only while a fresh stat of the file reports
/// the same modification time it was loaded with. Concurrent fetches of
/// one path coalesce onto a single physical read+parse; unrelated paths
/// load independently.
#[derive(Default)]
pub struct JsonCache {
    state: Mutex<CacheState>,
}

impl JsonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the parsed contents of `path` as a shared, immutable view.
    pub fn fetch(&self, path: &Path, options: &LoadOptions) -> anyhow::Result<Arc<Value>> {
        let plan = self.plan_fetch(path, options)?;
        match plan {
            FetchPlan::Hit(value) => Ok(value),
            FetchPlan::Wait(slot) => {
                slot.wait().map_err(|e| anyhow!("{e:#}"))
            }
            FetchPlan::Load(slot) => self.run_load(path, options, &slot),
        }
    }

    /// Fetch a deep copy the caller may mutate freely; later fetches and
    /// other callers are unaffected by those mutations.
    pub fn fetch_owned(&self, path: &Path, options: &LoadOptions) -> anyhow::Result<Value> {
        self.fetch(path, options).map(|shared| (*shared).clone())
    }

    /// Populate the cache for `path`, discarding the value.
    pub fn prime(&self, path: &Path) -> anyhow::Result<()> {
        self.fetch(path, &LoadOptions::default()).map(|_| ())
    }

    /// Drop one entry, or every entry when `path` is `None`. In-flight
    /// loads are not cancelled.
    pub fn clear(&self, path: Option<&Path>) {
        let mut state = self.state.lock().unwrap();
        match path {
            Some(path) => {
                state.entries.remove(path);
            }
            None => state.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().entries.is_empty()
    }

    fn plan_fetch(&self, path: &Path, options: &LoadOptions) -> anyhow::Result<FetchPlan> {
        let mut state = self.state.lock().unwrap();

        if options.force {
            state.entries.remove(path);
        } else if let Some(entry) = state.entries.get(path) {
            match fs::metadata(path) {
                Ok(meta) => {
                    let mtime = meta
                        .modified()
                        .with_context(|| format!("stat {}", path.display()))?;
                    if mtime == entry.mtime {
                        return Ok(FetchPlan::Hit(Arc::clone(&entry.data)));
                    }
                    // mtime moved; fall through and reload
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // file vanished: a stale entry must not outlive it,
                    // and the reload below surfaces the real error
                    state.entries.remove(path);
                }
                Err(e) => {
                    return Err(anyhow::Error::from(e)
                        .context(format!("stat {}", path.display())));
                }
            }
        }

        if let Some(slot) = state.in_flight.get(path) {
            return Ok(FetchPlan::Wait(Arc::clone(slot)));
        }
        let slot = Arc::new(LoadSlot::new());
        state.in_flight.insert(path.to_path_buf(), Arc::clone(&slot));
        Ok(FetchPlan::Load(slot))
    }

    fn run_load(
        &self,
        path: &Path,
        options: &LoadOptions,
        slot: &LoadSlot,
    ) -> anyhow::Result<Arc<Value>> {
        let loaded = load_file(path, options);

        let result: LoadResult = match loaded {
            Ok((data, mtime)) => {
                let mut state = self.state.lock().unwrap();
                state.entries.insert(
                    path.to_path_buf(),
                    CacheEntry {
                        data: Arc::clone(&data),
                        mtime,
                    },
                );
                state.in_flight.remove(path);
                Ok(data)
            }
            Err(e) => {
                let mut state = self.state.lock().unwrap();
                state.in_flight.remove(path);
                Err(Arc::new(e))
            }
        };

        slot.publish(result.clone());
        result.map_err(|e| anyhow!("{e:#}"))
    }
}

fn load_file(path: &Path, options: &LoadOptions) -> anyhow::Result<(Arc<Value>, SystemTime)> {
    let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    let mtime = meta
        .modified()
        .with_context(|| format!("stat {}", path.display()))?;
    let text =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value = match &options.loader {
        Some(loader) => loader(&text),
        None => serde_json::from_str(&text).map_err(anyhow::Error::from),
    }
    .with_context(|| format!("parse {}", path.display()))?;
    Ok((Arc::new(value), mtime))
}
