//! Completion-callback forms of the async operations.
//!
//! The async methods are the only implementation; these helpers spawn them and
//! deliver the outcome to a callback instead of returning a future.

use std::future::Future;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::store::DocumentStore;

/// Drive `future` on the current Tokio runtime and hand its outcome to `callback`.
///
/// # Panics
/// Panics if called outside a Tokio runtime.
pub fn with_callback<T, Fut, F>(future: Fut, callback: F) -> JoinHandle<()>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    F: FnOnce(Result<T, StoreError>) + Send + 'static,
{
    tokio::spawn(async move { callback(future.await) })
}

/// Callback variants of [`DocumentStore`] operations.
///
/// ```rust,no_run
/// # use botkit_storage_postgres::prelude::*;
/// # async fn demo(storage: Storage) {
/// storage.users().get_with("U1", |result| match result {
///     Ok(user) => println!("found {user}"),
///     Err(err) if err.is_not_found() => println!("new user"),
///     Err(err) => eprintln!("lookup failed: {err}"),
/// });
/// # }
/// ```
pub trait CallbackExt: DocumentStore + Clone + Send + Sync + 'static {
    fn get_with<F>(&self, id: impl Into<String>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Value, StoreError>) + Send + 'static,
    {
        let store = self.clone();
        let id = id.into();
        with_callback(async move { store.get(&id).await }, callback)
    }

    fn save_with<F>(&self, document: Value, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<(), StoreError>) + Send + 'static,
    {
        let store = self.clone();
        with_callback(async move { store.save(&document).await }, callback)
    }

    fn all_with<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Vec<Value>, StoreError>) + Send + 'static,
    {
        let store = self.clone();
        with_callback(async move { store.all().await }, callback)
    }
}

impl<S> CallbackExt for S where S: DocumentStore + Clone + Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::document_id;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    #[derive(Clone, Default)]
    struct MemoryTable {
        rows: Arc<Mutex<HashMap<String, Value>>>,
    }

    #[async_trait]
    impl DocumentStore for MemoryTable {
        async fn get(&self, id: &str) -> Result<Value, StoreError> {
            self.rows
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    table: "memory",
                    id: id.to_string(),
                })
        }

        async fn save(&self, document: &Value) -> Result<(), StoreError> {
            let id = document_id(document)?.to_string();
            self.rows.lock().unwrap().insert(id, document.clone());
            Ok(())
        }

        async fn all(&self) -> Result<Vec<Value>, StoreError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    #[tokio::test]
    async fn callbacks_receive_the_async_outcome() {
        let table = MemoryTable::default();

        let (tx, rx) = oneshot::channel();
        table.save_with(json!({"id": "T1", "name": "Acme"}), move |res| {
            let _ = tx.send(res);
        });
        rx.await.unwrap().unwrap();

        let (tx, rx) = oneshot::channel();
        table.get_with("T1", move |res| {
            let _ = tx.send(res);
        });
        assert_eq!(rx.await.unwrap().unwrap(), json!({"id": "T1", "name": "Acme"}));

        let (tx, rx) = oneshot::channel();
        table.all_with(move |res| {
            let _ = tx.send(res);
        });
        assert_eq!(rx.await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn errors_reach_the_callback_untouched() {
        let table = MemoryTable::default();

        let (tx, rx) = oneshot::channel();
        table.get_with("missing", move |res| {
            let _ = tx.send(res);
        });
        assert!(rx.await.unwrap().unwrap_err().is_not_found());

        let (tx, rx) = oneshot::channel();
        table.save_with(json!({"name": "no id"}), move |res| {
            let _ = tx.send(res);
        });
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidDocument);
    }

    #[tokio::test]
    async fn join_handle_completes_after_the_callback_ran() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        with_callback(async { Ok::<_, StoreError>(7) }, move |res| {
            *sink.lock().unwrap() = res.ok();
        })
        .await
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }
}
