use std::collections::BTreeMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::ArtifactStore;
use troupe_core::types::{insert_lines, slice_lines, LineRange};

/// In-memory artifact store with the same line semantics as the
/// directory-backed one.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `(name, content)` pairs.
    pub fn with_docs<'a>(docs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = docs
            .into_iter()
            .map(|(n, c)| (n.to_string(), c.to_string()))
            .collect();
        Self { docs: Mutex::new(map) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.docs
            .lock()
            .map_err(|_| TroupeError::Io(std::io::Error::other("memory store poisoned")))
    }

    fn missing(name: &str) -> TroupeError {
        TroupeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{name}: no such document"),
        ))
    }
}

impl ArtifactStore for MemoryStore {
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        let names = self.lock().map(|d| d.keys().cloned().collect());
        Box::pin(async move { names })
    }

    fn read(&self, name: &str, range: LineRange) -> BoxFuture<'_, Result<String>> {
        let result = self.lock().and_then(|d| {
            d.get(name)
                .map(|c| slice_lines(c, range))
                .ok_or_else(|| Self::missing(name))
        });
        Box::pin(async move { result })
    }

    fn write(&self, name: &str, content: &str) -> BoxFuture<'_, Result<()>> {
        let result = self.lock().map(|mut d| {
            d.insert(name.to_string(), content.to_string());
        });
        Box::pin(async move { result })
    }

    fn edit(&self, name: &str, inserts: BTreeMap<usize, String>) -> BoxFuture<'_, Result<()>> {
        let result = self.lock().and_then(|mut d| {
            let current = d.get(name).ok_or_else(|| Self::missing(name))?;
            let edited = insert_lines(name, current, inserts)?;
            d.insert(name.to_string(), edited);
            Ok(())
        });
        Box::pin(async move { result })
    }
}
