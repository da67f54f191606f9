//! Encryption scenarios: entries encrypted by the writer and shared by URL.
//!
//! The relay only ever holds ciphertext; the key travels in the URL
//! fragment.

#[cfg(test)]
mod tests {
    use crate::assertions::assert_no_plaintext_on_disk;
    use crate::harness::RelayHarness;
    use relay_client::{GetOptions, PutOptions};
    use relay_types::{signing_key_from_seed, AuthorId};

    const SECRET: &[u8] = b"meet me at the usual place at noon";

    const ENCRYPTED: PutOptions = PutOptions {
        encrypt: true,
        await_relay_sync: true,
    };

    #[tokio::test]
    async fn encrypted_entry_shared_by_url() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        alice.put("/secret.txt", SECRET, ENCRYPTED).await.unwrap();
        let url = alice.create_url("/secret.txt").await.unwrap();
        assert!(url.contains("#encryptionKey="));

        let value = bob.get(&url, GetOptions::default()).await.unwrap();
        assert_eq!(value.as_deref(), Some(SECRET));

        let scan = assert_no_plaintext_on_disk(harness.storage_dir(), SECRET);
        assert!(scan.passed, "{:?}", scan.failure_details);
    }

    #[tokio::test]
    async fn relay_serves_only_ciphertext() {
        let harness = RelayHarness::start().await.unwrap();
        let key = signing_key_from_seed(&[1; 32]);
        let id = AuthorId::from_signing_key(&key);
        let alice = harness.client(key);

        alice.put("/secret.txt", SECRET, ENCRYPTED).await.unwrap();

        let raw = harness.raw_get(&format!("{id}/secret.txt")).await.unwrap();
        assert_eq!(raw.status, 200);
        assert!(!raw.body.is_empty());
        assert_ne!(raw.body, SECRET);
    }

    #[tokio::test]
    async fn url_without_key_yields_ciphertext() {
        let harness = RelayHarness::start().await.unwrap();
        let alice = harness.client(signing_key_from_seed(&[1; 32]));
        let bob = harness.client(signing_key_from_seed(&[2; 32]));

        alice.put("/secret.txt", SECRET, ENCRYPTED).await.unwrap();
        let url = alice.create_url("/secret.txt").await.unwrap();
        let (without_key, _) = url.split_once('#').unwrap();

        let value = bob.get(without_key, GetOptions::default()).await.unwrap();
        let value = value.unwrap();
        assert_ne!(value, SECRET);
        assert!(value.len() > SECRET.len());
    }

    #[tokio::test]
    async fn owner_reads_own_encrypted_entry_from_relay() {
        let harness = RelayHarness::start().await.unwrap();
        let key = signing_key_from_seed(&[1; 32]);
        let writer = harness.client(key.clone());

        writer.put("/secret.txt", SECRET, ENCRYPTED).await.unwrap();

        // Same key, empty local store: the entry comes from the relay and is
        // decrypted with the derived key.
        let reader = harness.client(key);
        let value = reader
            .get("/secret.txt", GetOptions { skip_cache: true })
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some(SECRET));
    }
}
