//! Subscription scenarios: readers notified of new writes as they happen.

#[cfg(test)]
mod tests {
    use crate::harness::{wait_for, RelayHarness};
    use relay_client::PutOptions;
    use relay_types::signing_key_from_seed;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_secs(10);

    const SYNC: PutOptions = PutOptions {
        encrypt: false,
        await_relay_sync: true,
    };

    /// Receive until `expected` arrives, skipping earlier values.
    async fn receive_until(rx: &mut mpsc::UnboundedReceiver<Option<Vec<u8>>>, expected: &[u8]) {
        tokio::time::timeout(TIMEOUT, async {
            while let Some(value) = rx.recv().await {
                if value.as_deref() == Some(expected) {
                    return;
                }
            }
            panic!("subscription closed before {:?}", String::from_utf8_lossy(expected));
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn subscriber_receives_each_new_write() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        alice.put("/status", b"v1", SYNC).await.unwrap();
        let url = alice.create_url("/status").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bob
            .subscribe(&url, move |value: Option<Vec<u8>>| {
                let _ = tx.send(value);
            })
            .unwrap();

        // The current record is pushed as soon as the stream opens
        receive_until(&mut rx, b"v1").await;

        alice.put("/status", b"v2", SYNC).await.unwrap();
        receive_until(&mut rx, b"v2").await;

        alice.put("/status", b"v3", SYNC).await.unwrap();
        receive_until(&mut rx, b"v3").await;
    }

    #[tokio::test]
    async fn subscribers_share_one_connection() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        alice.put("/feed", b"first", SYNC).await.unwrap();
        let url = alice.create_url("/feed").await.unwrap();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let _one = bob
            .subscribe(&url, move |value: Option<Vec<u8>>| {
                let _ = tx1.send(value);
            })
            .unwrap();
        let _two = bob
            .subscribe(&url, move |value: Option<Vec<u8>>| {
                let _ = tx2.send(value);
            })
            .unwrap();
        assert_eq!(bob.subscription_count(), 1);

        let relay = harness.relay();
        wait_for("relay listener", TIMEOUT, || async move {
            relay.subscriptions().listeners() == 1
        })
        .await
        .unwrap();

        alice.put("/feed", b"second", SYNC).await.unwrap();
        receive_until(&mut rx1, b"second").await;
        receive_until(&mut rx2, b"second").await;
    }

    #[tokio::test]
    async fn unsubscribe_stops_callbacks() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        alice.put("/ticker", b"0", SYNC).await.unwrap();
        let url = alice.create_url("/ticker").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = bob
            .subscribe(&url, move |value: Option<Vec<u8>>| {
                let _ = tx.send(value);
            })
            .unwrap();
        receive_until(&mut rx, b"0").await;

        sub.unsubscribe();
        assert_eq!(bob.subscription_count(), 0);

        // The callback, and with it the sender, is gone
        let closed = tokio::time::timeout(TIMEOUT, async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn closing_client_ends_subscriptions() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        let url = alice.create_url("/later").await.unwrap();
        let _sub = bob.subscribe(&url, |_: Option<Vec<u8>>| {}).unwrap();
        assert_eq!(bob.subscription_count(), 1);

        bob.close();
        assert_eq!(bob.subscription_count(), 0);
        assert!(bob.subscribe(&url, |_: Option<Vec<u8>>| {}).is_err());
    }
}
