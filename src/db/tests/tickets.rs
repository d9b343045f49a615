//! Shared tests for TicketStore implementations

use chrono::{SubsecRound, TimeDelta, Utc};

use crate::{
    db::{error::DbError, repos::TicketStore},
    models::PgtIou,
};

pub async fn test_upsert_tgt_overwrites(store: &dyn TicketStore) {
    store.upsert_tgt("alice", "PGT-1").await.unwrap();
    let updated = store.upsert_tgt("alice", "PGT-2").await.unwrap();
    assert_eq!(updated.tgt, "PGT-2");

    let stored = store.get_tgt("alice").await.unwrap().unwrap();
    assert_eq!(stored.username, "alice");
    assert_eq!(stored.tgt, "PGT-2");
}

pub async fn test_get_tgt_missing(store: &dyn TicketStore) {
    store.upsert_tgt("alice", "PGT-1").await.unwrap();
    assert!(store.get_tgt("bob").await.unwrap().is_none());
}

pub async fn test_take_pgt_iou_once(store: &dyn TicketStore) {
    store.put_pgt_iou("PGTIOU-1", "PGT-1").await.unwrap();

    let taken = store.take_pgt_iou("PGTIOU-1").await.unwrap().unwrap();
    assert_eq!(taken.iou, "PGTIOU-1");
    assert_eq!(taken.tgt, "PGT-1");

    assert!(store.take_pgt_iou("PGTIOU-1").await.unwrap().is_none());
}

pub async fn test_take_unknown_iou(store: &dyn TicketStore) {
    assert!(store.take_pgt_iou("PGTIOU-missing").await.unwrap().is_none());
}

pub async fn test_duplicate_iou_conflict(store: &dyn TicketStore) {
    store.put_pgt_iou("PGTIOU-1", "PGT-1").await.unwrap();
    let result = store.put_pgt_iou("PGTIOU-1", "PGT-other").await;
    assert!(matches!(result, Err(DbError::Conflict(_))));

    let taken = store.take_pgt_iou("PGTIOU-1").await.unwrap().unwrap();
    assert_eq!(taken.tgt, "PGT-1");
}

pub async fn test_concurrent_take_yields_one(store: &dyn TicketStore) {
    store.put_pgt_iou("PGTIOU-race", "PGT-race").await.unwrap();

    let (a, b) = tokio::join!(
        store.take_pgt_iou("PGTIOU-race"),
        store.take_pgt_iou("PGTIOU-race")
    );
    let hits = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(Option::is_some)
        .count();
    assert_eq!(hits, 1);
}

pub async fn test_purge_expiry_boundary(store: &dyn TicketStore) {
    // Whole seconds so every backend stores the timestamps exactly
    let now = Utc::now().trunc_subsecs(0);
    let at = |iou: &str, created_at| PgtIou {
        iou: iou.to_string(),
        tgt: format!("PGT-{iou}"),
        created_at,
    };

    store
        .insert_pgt_iou(&at("older", now - TimeDelta::days(2) - TimeDelta::seconds(1)))
        .await
        .unwrap();
    store
        .insert_pgt_iou(&at("exactly", now - TimeDelta::days(2)))
        .await
        .unwrap();
    store
        .insert_pgt_iou(&at("newer", now - TimeDelta::days(1)))
        .await
        .unwrap();

    let purged = store.purge_expired_pgt_ious(now).await.unwrap();
    assert_eq!(purged, 1);

    assert!(store.take_pgt_iou("older").await.unwrap().is_none());
    assert!(store.take_pgt_iou("exactly").await.unwrap().is_some());
    assert!(store.take_pgt_iou("newer").await.unwrap().is_some());
}

pub async fn test_purge_leaves_tgts(store: &dyn TicketStore) {
    store.upsert_tgt("alice", "PGT-1").await.unwrap();
    let purged = store
        .purge_pgt_ious_before(Utc::now() + TimeDelta::days(1))
        .await
        .unwrap();
    assert_eq!(purged, 0);
    assert!(store.get_tgt("alice").await.unwrap().is_some());
}

mod memory_tests {
    use crate::db::memory::MemoryTicketStore;

    macro_rules! memory_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let store = MemoryTicketStore::new();
                super::$name(&store).await;
            }
        };
    }

    memory_test!(test_upsert_tgt_overwrites);
    memory_test!(test_get_tgt_missing);
    memory_test!(test_take_pgt_iou_once);
    memory_test!(test_take_unknown_iou);
    memory_test!(test_duplicate_iou_conflict);
    memory_test!(test_concurrent_take_yields_one);
    memory_test!(test_purge_expiry_boundary);
    memory_test!(test_purge_leaves_tgts);
}

#[cfg(feature = "database-sqlite")]
mod sqlite_tests {
    use crate::db::{
        sqlite::SqliteTicketStore,
        tests::harness::migrated_sqlite_pool,
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = migrated_sqlite_pool().await;
                let store = SqliteTicketStore::new(pool);
                super::$name(&store).await;
            }
        };
    }

    sqlite_test!(test_upsert_tgt_overwrites);
    sqlite_test!(test_get_tgt_missing);
    sqlite_test!(test_take_pgt_iou_once);
    sqlite_test!(test_take_unknown_iou);
    sqlite_test!(test_duplicate_iou_conflict);
    sqlite_test!(test_concurrent_take_yields_one);
    sqlite_test!(test_purge_expiry_boundary);
    sqlite_test!(test_purge_leaves_tgts);
}

#[cfg(feature = "database-postgres")]
mod postgres_tests {
    use crate::db::{
        postgres::PostgresTicketStore,
        tests::harness::postgres::migrated_postgres_pool,
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = migrated_postgres_pool().await;
                let store = PostgresTicketStore::new(pool);
                super::$name(&store).await;
            }
        };
    }

    postgres_test!(test_upsert_tgt_overwrites);
    postgres_test!(test_get_tgt_missing);
    postgres_test!(test_take_pgt_iou_once);
    postgres_test!(test_take_unknown_iou);
    postgres_test!(test_duplicate_iou_conflict);
    postgres_test!(test_concurrent_take_yields_one);
    postgres_test!(test_purge_expiry_boundary);
    postgres_test!(test_purge_leaves_tgts);
}
