use crate::transport::script::loader::{HttpScriptLoader, ScriptLoader};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Global function slot a loaded script calls with its payload. Single shot.
pub type JsonpCallback = Box<dyn FnOnce(Value) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptId(u64);

/// A script element in the document head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptElement {
    pub id: ScriptId,
    pub src: String,
}

/// The part of a document JSONP needs: a head that holds script elements, and a global
/// scope the loaded scripts call into.
///
/// Appending a script hands it to the document's [`ScriptLoader`], which loads it in the
/// background.
pub struct ScriptDocument {
    head: Mutex<Vec<ScriptElement>>,
    globals: Mutex<HashMap<String, JsonpCallback>>,
    loader: Arc<dyn ScriptLoader>,
    next_id: AtomicU64,
}

impl Default for ScriptDocument {
    fn default() -> Self {
        Self::new(Arc::new(HttpScriptLoader::new()))
    }
}

impl std::fmt::Debug for ScriptDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptDocument")
            .field("head", &*lock(&self.head))
            .field("globals", &self.global_names())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptDocument {
    pub fn new(loader: Arc<dyn ScriptLoader>) -> Self {
        Self {
            head: Mutex::new(Vec::new()),
            globals: Mutex::new(HashMap::new()),
            loader,
            next_id: AtomicU64::new(1),
        }
    }

    /// Installs (or replaces) the global named `name`.
    pub fn install_global(&self, name: impl Into<String>, callback: JsonpCallback) {
        lock(&self.globals).insert(name.into(), callback);
    }

    /// Removes the global named `name`. Returns `false` if there was none.
    pub fn delete_global(&self, name: &str) -> bool {
        lock(&self.globals).remove(name).is_some()
    }

    pub fn has_global(&self, name: &str) -> bool {
        lock(&self.globals).contains_key(name)
    }

    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.globals).keys().cloned().collect();
        names.sort();
        names
    }

    /// Calls the global named `name` with `payload`, the way an evaluated script would.
    ///
    /// The slot is consumed. Returns `false` when no such global is installed (anymore).
    pub fn call_global(&self, name: &str, payload: Value) -> bool {
        // take it out first, the callback may touch the globals itself
        let callback = lock(&self.globals).remove(name);
        match callback {
            Some(callback) => {
                callback(payload);
                true
            }
            None => {
                debug!("script called missing global {name}");
                false
            }
        }
    }

    /// Appends a script element to the head and starts loading it.
    pub fn append_script(self: &Arc<Self>, src: impl Into<String>) -> ScriptId {
        let element = ScriptElement {
            id: ScriptId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            src: src.into(),
        };
        lock(&self.head).push(element.clone());

        let id = element.id;
        self.loader.load(element, Arc::clone(self));
        id
    }

    /// Removes a script element from the head. Returns `false` if it was not there.
    pub fn remove_script(&self, id: ScriptId) -> bool {
        let mut head = lock(&self.head);
        let before = head.len();
        head.retain(|script| script.id != id);
        head.len() != before
    }

    /// Script elements currently in the head, in insertion order.
    pub fn head(&self) -> Vec<ScriptElement> {
        lock(&self.head).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::script::loader::StaticScriptLoader;
    use serde_json::json;

    #[test]
    fn globals_are_called_once() {
        let document = ScriptDocument::new(Arc::new(StaticScriptLoader::new(json!(null)).silent()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        document.install_global("cb", Box::new(move |v| sink.lock().unwrap().push(v)));

        assert!(document.has_global("cb"));
        assert!(document.call_global("cb", json!(1)));
        assert!(!document.call_global("cb", json!(2)));
        assert!(!document.has_global("cb"));
        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
    }

    #[test]
    fn scripts_are_added_and_removed() {
        let loader = StaticScriptLoader::new(json!(null)).silent();
        let document = Arc::new(ScriptDocument::new(Arc::new(loader.clone())));

        let first = document.append_script("/a.js");
        let second = document.append_script("/b.js");
        assert_ne!(first, second);
        assert_eq!(loader.loaded(), vec!["/a.js".to_string(), "/b.js".to_string()]);

        assert!(document.remove_script(first));
        assert!(!document.remove_script(first));
        let head = document.head();
        assert_eq!(head.len(), 1);
        assert_eq!(head[0].src, "/b.js");
    }
}
