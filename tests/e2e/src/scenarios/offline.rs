//! Offline scenarios: writes made without a reachable relay.

#[cfg(test)]
mod tests {
    use crate::harness::{offline_address, wait_for, RelayHarness};
    use relay_client::{
        Client, ClientConfig, ClientError, GetOptions, HttpTransport, MemoryKv, PutOptions,
    };
    use relay_types::signing_key_from_seed;
    use std::time::Duration;

    const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn local_only_client_reads_its_writes() {
        let client = Client::new(
            signing_key_from_seed(&[1; 32]),
            MemoryKv::new(),
            HttpTransport::new(),
            ClientConfig::new(),
        );

        client.put("/draft", b"local", PutOptions::default()).await.unwrap();
        let value = client.get("/draft", GetOptions::default()).await.unwrap();
        assert_eq!(value.as_deref(), Some(&b"local"[..]));

        let synced = client
            .put(
                "/draft",
                b"again",
                PutOptions {
                    encrypt: false,
                    await_relay_sync: true,
                },
            )
            .await;
        assert!(matches!(synced, Err(ClientError::NoRelay)));
        let value = client.get("/draft", GetOptions::default()).await.unwrap();
        assert_eq!(value.as_deref(), Some(&b"again"[..]));
    }

    #[tokio::test]
    async fn offline_writes_replay_after_restart() {
        let key = signing_key_from_seed(&[1; 32]);
        let store = MemoryKv::new();

        let offline = Client::new(
            key.clone(),
            store.clone(),
            HttpTransport::new(),
            ClientConfig::new().with_relay(offline_address().await.unwrap()),
        );
        offline.put("/first", b"one", PutOptions::default()).await.unwrap();
        offline.put("/second", b"two", PutOptions::default()).await.unwrap();
        offline.put("/first", b"uno", PutOptions::default()).await.unwrap();
        offline.close();

        let harness = RelayHarness::start().await.unwrap();
        let restarted = harness.client_with_store(key, store);
        tokio::time::timeout(SETTLE_TIMEOUT, restarted.settled())
            .await
            .unwrap();
        assert_eq!(restarted.pending_deliveries(), 0);

        let reader = harness.client(signing_key_from_seed(&[2; 32]));
        let first = restarted.create_url("/first").await.unwrap();
        let second = restarted.create_url("/second").await.unwrap();
        assert_eq!(
            reader.get(&first, GetOptions::default()).await.unwrap().as_deref(),
            Some(&b"uno"[..])
        );
        assert_eq!(
            reader.get(&second, GetOptions::default()).await.unwrap().as_deref(),
            Some(&b"two"[..])
        );
    }

    #[tokio::test]
    async fn background_delivery_reaches_relay() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));

        alice.put("/later", b"eventually", PutOptions::default()).await.unwrap();

        let alice = &alice;
        wait_for("background delivery", SETTLE_TIMEOUT, || async move {
            alice.pending_deliveries() == 0
        })
        .await
        .unwrap();

        let stats = harness.relay().stats().await.unwrap();
        assert_eq!(stats.records, 1);
    }
}
