//! Record scenarios: publishing, reading and the relay's acceptance rules.

#[cfg(test)]
mod tests {
    use crate::assertions::{assert_converged, assert_entry, ClientView};
    use crate::harness::RelayHarness;
    use relay_client::{ClientError, DeleteOptions, GetOptions, PutOptions};
    use relay_server::Config;
    use relay_types::{full_path, signing_key_from_seed, AuthorId, Record, RecordOptions};

    const SYNC: PutOptions = PutOptions {
        encrypt: false,
        await_relay_sync: true,
    };

    fn record_at(seed: u8, path: &str, content: &[u8], timestamp: u64) -> (String, Record) {
        let key = signing_key_from_seed(&[seed; 32]);
        let full = full_path(&AuthorId::from_signing_key(&key), path);
        let record = Record::create(
            &key,
            &full,
            content,
            RecordOptions {
                timestamp: Some(timestamp),
                metadata: None,
            },
        )
        .unwrap();
        (full, record)
    }

    #[tokio::test]
    async fn published_entry_is_readable_by_url() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        alice
            .put("/profile.json", br#"{"name":"alice"}"#, SYNC)
            .await
            .unwrap();
        let url = alice.create_url("/profile.json").await.unwrap();
        assert!(url.contains(&format!("?relay={}", harness.address())));

        let value = bob.get(&url, GetOptions::default()).await.unwrap();
        assert_eq!(value.as_deref(), Some(&br#"{"name":"alice"}"#[..]));
    }

    #[tokio::test]
    async fn reader_sees_overwrite_after_skipping_cache() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        alice.put("/foo", b"bar", SYNC).await.unwrap();
        let url = alice.create_url("/foo").await.unwrap();
        assert_eq!(
            bob.get(&url, GetOptions::default()).await.unwrap().as_deref(),
            Some(&b"bar"[..])
        );

        alice.put("/foo", b"baz", SYNC).await.unwrap();
        assert_eq!(
            bob.get(&url, GetOptions { skip_cache: true })
                .await
                .unwrap()
                .as_deref(),
            Some(&b"baz"[..])
        );
        // The fresh read replaced the cached copy
        assert_eq!(
            bob.get(&url, GetOptions::default()).await.unwrap().as_deref(),
            Some(&b"baz"[..])
        );
    }

    #[tokio::test]
    async fn deleted_entry_reads_as_none() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        alice.put("/note.txt", b"hello", SYNC).await.unwrap();
        let url = alice.create_url("/note.txt").await.unwrap();
        assert!(bob.get(&url, GetOptions::default()).await.unwrap().is_some());

        alice
            .delete(
                "/note.txt",
                DeleteOptions {
                    await_relay_sync: true,
                },
            )
            .await
            .unwrap();

        let value = bob
            .get(&url, GetOptions { skip_cache: true })
            .await
            .unwrap();
        assert_eq!(value, None);
        assert_eq!(alice.get("/note.txt", GetOptions::default()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn readers_converge_on_latest_writes() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));

        let paths = ["/a", "/b/c", "/with space", "/ünïcode"];
        for (i, path) in paths.iter().enumerate() {
            alice.put(path, format!("v1-{i}").as_bytes(), SYNC).await.unwrap();
            alice.put(path, format!("v2-{i}").as_bytes(), SYNC).await.unwrap();
        }

        let mut views = Vec::new();
        for seed in 2..5u8 {
            let reader = harness.client(signing_key_from_seed(&[seed; 32]));
            let mut view = ClientView::new(&format!("reader-{seed}"));
            for path in paths {
                let url = alice.create_url(path).await.unwrap();
                view.insert(path, reader.get(&url, GetOptions::default()).await.unwrap());
            }
            views.push(view);
        }

        let converged = assert_converged(&views);
        assert!(converged.passed, "{:?}", converged.failure_details);
        let latest = assert_entry(&views, "/a", Some(&b"v2-0"[..]));
        assert!(latest.passed, "{:?}", latest.failure_details);
    }

    #[tokio::test]
    async fn older_record_conflicts_with_newer() {
        let harness = RelayHarness::start().await.unwrap();
        let (full, newer) = record_at(1, "/foo", b"new", 20_000_000);
        let (_, older) = record_at(1, "/foo", b"old", 10_000_000);

        let accepted = harness.raw_put(&full, &newer, b"new").await.unwrap();
        assert_eq!(accepted.status, 200);

        let conflict = harness.raw_put(&full, &older, b"old").await.unwrap();
        assert_eq!(conflict.status, 409);
        assert_eq!(conflict.record.as_deref(), Some(newer.to_base64()));

        let current = harness.raw_get(&full).await.unwrap();
        assert_eq!(current.status, 200);
        assert_eq!(current.body, b"new");
        assert_eq!(current.record.as_deref(), Some(newer.to_base64()));
    }

    #[tokio::test]
    async fn content_must_match_record_hash() {
        let harness = RelayHarness::start().await.unwrap();
        let (full, record) = record_at(1, "/foo", b"signed", 1_000);

        let response = harness.raw_put(&full, &record, b"tampered").await.unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body, b"Invalid content hash");

        assert_eq!(harness.raw_get(&full).await.unwrap().status, 404);
    }

    #[tokio::test]
    async fn record_must_be_signed_for_its_path() {
        let harness = RelayHarness::start().await.unwrap();
        let (_, record) = record_at(1, "/signed-here", b"x", 1_000);
        let (elsewhere, _) = record_at(1, "/put-there", b"x", 1_000);

        let response = harness.raw_put(&elsewhere, &record, b"x").await.unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body, b"Invalid signature");
    }

    #[tokio::test]
    async fn oversized_content_is_rejected() {
        let mut config = Config::default();
        config.storage.max_content_size = 16;
        let harness = RelayHarness::start_with(config).await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));

        let result = alice.put("/big.bin", &[7u8; 64], SYNC).await;
        assert!(matches!(result, Err(ClientError::Rejected { status: 413 })));

        // The write stays readable locally
        let local = alice.get("/big.bin", GetOptions::default()).await.unwrap();
        assert_eq!(local.as_deref(), Some(&[7u8; 64][..]));
        assert_eq!(alice.pending_deliveries(), 0);
    }

    #[tokio::test]
    async fn unknown_author_is_bad_request() {
        let harness = RelayHarness::start().await.unwrap();

        let response = harness.raw_get("not-a-user/foo").await.unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body, b"Invalid userID");
    }

    #[tokio::test]
    async fn relay_counts_accepted_writes() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));

        alice.put("/one", b"1", SYNC).await.unwrap();
        alice.put("/two", b"2", SYNC).await.unwrap();

        let stats = harness.relay().stats().await.unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.authors, 1);
        assert_eq!(stats.blobs, 2);
    }
}
