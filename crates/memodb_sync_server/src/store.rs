//! Per-account server state.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use memodb_sync_protocol::{AccountKey, EncryptedChangelogEntry};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct Account {
    clients: BTreeSet<String>,
    keys: HashMap<String, AccountKey>,
    /// Entries in receive order; timestamps strictly increase.
    changelog: Vec<EncryptedChangelogEntry>,
    blobs: HashMap<String, Vec<u8>>,
    full_sync: Option<Vec<u8>>,
}

impl Account {
    /// Receive stamps carry microsecond precision, the precision `since`
    /// travels at in query strings.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        match self.changelog.last() {
            Some(last) if last.timestamp >= now => last.timestamp + Duration::microseconds(1),
            _ => now,
        }
    }
}

/// Server storage for all accounts.
///
/// The server only holds ciphertext and opaque blobs. Each entry is
/// restamped with its receive time, which is what `since` queries compare
/// against.
#[derive(Debug, Default)]
pub struct ServerStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl ServerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client_id` with `account`. Returns true if it was new.
    pub fn register_client(&self, account: &str, client_id: &str) -> bool {
        self.accounts
            .write()
            .entry(account.to_string())
            .or_default()
            .clients
            .insert(client_id.to_string())
    }

    /// Returns true if `client_id` is registered with `account`.
    pub fn is_registered(&self, account: &str, client_id: &str) -> bool {
        self.accounts
            .read()
            .get(account)
            .is_some_and(|a| a.clients.contains(client_id))
    }

    /// Stores or replaces a key. Returns the previous key with that name.
    pub fn put_key(&self, account: &str, key: AccountKey) -> Option<AccountKey> {
        self.accounts
            .write()
            .entry(account.to_string())
            .or_default()
            .keys
            .insert(key.name.clone(), key)
    }

    /// Returns the key named `name`.
    pub fn key(&self, account: &str, name: &str) -> Option<AccountKey> {
        self.accounts.read().get(account)?.keys.get(name).cloned()
    }

    /// Appends entries, stamping each with its receive time.
    pub fn append_entries(&self, account: &str, entries: Vec<EncryptedChangelogEntry>) -> usize {
        let mut accounts = self.accounts.write();
        let account = accounts.entry(account.to_string()).or_default();
        let count = entries.len();
        for entry in entries {
            let timestamp = account.next_timestamp();
            account.changelog.push(EncryptedChangelogEntry { timestamp, ..entry });
        }
        count
    }

    /// Entries received strictly after `since`, in receive order.
    pub fn entries_since(
        &self,
        account: &str,
        since: Option<DateTime<Utc>>,
    ) -> Vec<EncryptedChangelogEntry> {
        let accounts = self.accounts.read();
        let Some(account) = accounts.get(account) else {
            return Vec::new();
        };
        let start = match since {
            Some(since) => account.changelog.partition_point(|e| e.timestamp <= since),
            None => 0,
        };
        account.changelog[start..].to_vec()
    }

    /// Stores blob bytes. Returns false if the path was already present.
    ///
    /// Paths are content-addressed, so an existing blob is kept as is.
    pub fn put_blob(&self, account: &str, filepath: &str, data: Vec<u8>) -> bool {
        let mut accounts = self.accounts.write();
        let blobs = &mut accounts.entry(account.to_string()).or_default().blobs;
        if blobs.contains_key(filepath) {
            return false;
        }
        blobs.insert(filepath.to_string(), data);
        true
    }

    /// Returns blob bytes.
    pub fn blob(&self, account: &str, filepath: &str) -> Option<Vec<u8>> {
        self.accounts.read().get(account)?.blobs.get(filepath).cloned()
    }

    /// Replaces the full-sync blob.
    pub fn set_full_sync(&self, account: &str, data: Vec<u8>) {
        self.accounts
            .write()
            .entry(account.to_string())
            .or_default()
            .full_sync = Some(data);
    }

    /// Returns the full-sync blob.
    pub fn full_sync(&self, account: &str) -> Option<Vec<u8>> {
        self.accounts.read().get(account)?.full_sync.clone()
    }

    /// Number of entries stored for `account`.
    pub fn entry_count(&self, account: &str) -> usize {
        self.accounts
            .read()
            .get(account)
            .map_or(0, |a| a.changelog.len())
    }

    /// Number of blobs stored for `account`.
    pub fn blob_count(&self, account: &str) -> usize {
        self.accounts.read().get(account).map_or(0, |a| a.blobs.len())
    }

    /// Number of accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(client: &str) -> EncryptedChangelogEntry {
        EncryptedChangelogEntry {
            sync_client_id: client.into(),
            data: "AAEC".into(),
            timestamp: "2000-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn receive_timestamps_increase() {
        let store = ServerStore::new();
        store.append_entries("ada", (0..50).map(|_| entry("c1")).collect());

        let entries = store.entries_since("ada", None);
        assert_eq!(entries.len(), 50);
        assert!(entries.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(entries[0].timestamp > "2020-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn receive_timestamps_have_microsecond_precision() {
        let store = ServerStore::new();
        store.append_entries("ada", (0..5).map(|_| entry("c1")).collect());

        for e in store.entries_since("ada", None) {
            assert_eq!(e.timestamp.timestamp_subsec_nanos() % 1_000, 0);
        }
    }

    #[test]
    fn entries_since_is_exclusive() {
        let store = ServerStore::new();
        store.append_entries("ada", vec![entry("c1"), entry("c1"), entry("c2")]);
        let all = store.entries_since("ada", None);

        let rest = store.entries_since("ada", Some(all[0].timestamp));
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].sync_client_id, "c2");
        assert!(store.entries_since("ada", Some(all[2].timestamp)).is_empty());
    }

    #[test]
    fn accounts_are_isolated() {
        let store = ServerStore::new();
        store.register_client("ada", "c1");
        store.append_entries("ada", vec![entry("c1")]);
        store.put_blob("ada", "/ab/cd", vec![1]);

        assert!(!store.is_registered("bob", "c1"));
        assert!(store.entries_since("bob", None).is_empty());
        assert_eq!(store.blob("bob", "/ab/cd"), None);
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn blobs_are_write_once() {
        let store = ServerStore::new();
        assert!(store.put_blob("ada", "/ab/cd", vec![1, 2]));
        assert!(!store.put_blob("ada", "/ab/cd", vec![9]));
        assert_eq!(store.blob("ada", "/ab/cd"), Some(vec![1, 2]));
        assert_eq!(store.blob_count("ada"), 1);
    }

    #[test]
    fn keys_are_replaced() {
        let store = ServerStore::new();
        let key = |data: &str| AccountKey {
            name: "primary".into(),
            key_type: "aes256gcm-v1".into(),
            data: data.into(),
        };
        assert_eq!(store.put_key("ada", key("one")), None);
        assert_eq!(store.put_key("ada", key("two")), Some(key("one")));
        assert_eq!(store.key("ada", "primary"), Some(key("two")));
    }
}
