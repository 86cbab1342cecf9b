#![cfg(feature = "test-utils")]

use botkit_storage_postgres::prelude::*;
use botkit_storage_postgres::test_utils::{setup_postgres_embedded, stop_postgres_embedded};
use serde_json::json;
use tokio::sync::oneshot;

#[test]
fn test04_callback_mode_matches_await_mode() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let pg = setup_postgres_embedded()?;
    let config = pg.config_for("botkit_callbacks", Encoding::NativeJson)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let storage = Storage::new(config)?;

        let (tx, rx) = oneshot::channel();
        storage
            .teams()
            .save_with(json!({"id": "T1", "name": "Acme"}), move |res| {
                let _ = tx.send(res);
            });
        rx.await.expect("callback dropped")?;

        let (tx, rx) = oneshot::channel();
        storage.teams().get_with("T1", move |res| {
            let _ = tx.send(res);
        });
        assert_eq!(
            rx.await.expect("callback dropped")?,
            json!({"id": "T1", "name": "Acme"})
        );

        let (tx, rx) = oneshot::channel();
        storage.teams().get_with("T2", move |res| {
            let _ = tx.send(res);
        });
        let err = rx.await.expect("callback dropped").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // The awaited form sees what the callback form wrote, and back.
        storage.teams().save(&json!({"id": "T2", "name": "Globex"})).await?;
        let (tx, rx) = oneshot::channel();
        storage.teams().all_with(move |res| {
            let _ = tx.send(res);
        });
        let mut ids: Vec<String> = rx
            .await
            .expect("callback dropped")?
            .into_iter()
            .filter_map(|doc| doc["id"].as_str().map(str::to_string))
            .collect();
        ids.sort();
        assert_eq!(ids, ["T1", "T2"]);

        let (tx, rx) = oneshot::channel();
        storage.close_with(move |res| {
            let _ = tx.send(res);
        });
        rx.await.expect("callback dropped")?;

        let (tx, rx) = oneshot::channel();
        storage.close_with(move |res| {
            let _ = tx.send(res);
        });
        let err = rx.await.expect("callback dropped").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        Ok::<(), StoreError>(())
    })?;

    stop_postgres_embedded(pg);
    Ok(())
}
