// src/storage/tests/mod.rs


// Contract checks shared by every backend
pub(crate) mod common {
    use std::time::Duration;

    use crate::error::Result;
    use crate::storage::{RecordStore, WriteOutcome};

    // Create, read back, then update with the stamp that was read
    pub async fn test_create_and_update<S: RecordStore>(storage: &S, key: &str) -> Result<()> {
        let ttl = Duration::from_secs(60);

        let initial = storage.get(key).await?;
        assert!(initial.value.is_none());
        assert!(initial.stamp.is_none());

        let created = storage.conditional_set(key, b"[1]", None, ttl).await?;
        let first_stamp = match created {
            WriteOutcome::Applied(stamp) => stamp,
            other => panic!("create on an absent key must apply, got {:?}", other),
        };

        let read = storage.get(key).await?;
        assert_eq!(read.value.as_deref(), Some(&b"[1]"[..]));
        assert_eq!(read.stamp.as_ref(), Some(&first_stamp));

        let updated = storage
            .conditional_set(key, b"[1,2]", read.stamp.as_ref(), ttl)
            .await?;
        let second_stamp = match updated {
            WriteOutcome::Applied(stamp) => stamp,
            other => panic!("update with the current stamp must apply, got {:?}", other),
        };
        assert_ne!(first_stamp, second_stamp, "every write gets a fresh stamp");

        let read = storage.get(key).await?;
        assert_eq!(read.value.as_deref(), Some(&b"[1,2]"[..]));

        Ok(())
    }

    // A stale stamp, or a create on an existing key, must not overwrite
    pub async fn test_stale_writes_conflict<S: RecordStore>(storage: &S, key: &str) -> Result<()> {
        let ttl = Duration::from_secs(60);

        storage.conditional_set(key, b"[1]", None, ttl).await?;
        let stale = storage.get(key).await?.stamp;

        // a concurrent writer gets in first
        let winner = storage
            .conditional_set(key, b"[1,2]", stale.as_ref(), ttl)
            .await?;
        assert!(matches!(winner, WriteOutcome::Applied(_)));

        let loser = storage
            .conditional_set(key, b"[1,3]", stale.as_ref(), ttl)
            .await?;
        assert_eq!(loser, WriteOutcome::Conflict);

        let blind_create = storage.conditional_set(key, b"[9]", None, ttl).await?;
        assert_eq!(blind_create, WriteOutcome::Conflict);

        let read = storage.get(key).await?;
        assert_eq!(read.value.as_deref(), Some(&b"[1,2]"[..]));

        Ok(())
    }
}
