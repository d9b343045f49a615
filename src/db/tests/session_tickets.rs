//! Shared tests for SessionTicketRegistry implementations

use crate::db::{error::DbError, repos::SessionTicketRegistry};

pub async fn test_record_then_lookup(registry: &dyn SessionTicketRegistry) {
    let mapping = registry.record("ST-1", "session-a").await.unwrap();
    assert_eq!(mapping.service_ticket, "ST-1");
    assert_eq!(mapping.session_key, "session-a");

    assert_eq!(
        registry.lookup("ST-1").await.unwrap().as_deref(),
        Some("session-a")
    );
}

pub async fn test_lookup_unknown(registry: &dyn SessionTicketRegistry) {
    assert!(registry.lookup("ST-unknown").await.unwrap().is_none());
}

pub async fn test_duplicate_ticket_rejected(registry: &dyn SessionTicketRegistry) {
    registry.record("ST-1", "session-a").await.unwrap();
    let result = registry.record("ST-1", "session-b").await;
    assert!(matches!(result, Err(DbError::Conflict(_))));

    // The original mapping is untouched
    assert_eq!(
        registry.lookup("ST-1").await.unwrap().as_deref(),
        Some("session-a")
    );
}

pub async fn test_delete_by_session_key(registry: &dyn SessionTicketRegistry) {
    registry.record("ST-1", "session-a").await.unwrap();
    registry.record("ST-2", "session-a").await.unwrap();
    registry.record("ST-3", "session-b").await.unwrap();

    let removed = registry.delete_by_session_key("session-a").await.unwrap();
    assert_eq!(removed, 2);

    assert!(registry.lookup("ST-1").await.unwrap().is_none());
    assert!(registry.lookup("ST-2").await.unwrap().is_none());
    assert_eq!(
        registry.lookup("ST-3").await.unwrap().as_deref(),
        Some("session-b")
    );
}

pub async fn test_delete_unknown_session_key(registry: &dyn SessionTicketRegistry) {
    assert_eq!(registry.delete_by_session_key("nobody").await.unwrap(), 0);
}

mod memory_tests {
    use crate::db::memory::MemorySessionTicketRegistry;

    macro_rules! memory_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let registry = MemorySessionTicketRegistry::new();
                super::$name(&registry).await;
            }
        };
    }

    memory_test!(test_record_then_lookup);
    memory_test!(test_lookup_unknown);
    memory_test!(test_duplicate_ticket_rejected);
    memory_test!(test_delete_by_session_key);
    memory_test!(test_delete_unknown_session_key);
}

#[cfg(feature = "database-sqlite")]
mod sqlite_tests {
    use crate::db::{
        sqlite::SqliteSessionTicketRegistry,
        tests::harness::migrated_sqlite_pool,
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = migrated_sqlite_pool().await;
                let registry = SqliteSessionTicketRegistry::new(pool);
                super::$name(&registry).await;
            }
        };
    }

    sqlite_test!(test_record_then_lookup);
    sqlite_test!(test_lookup_unknown);
    sqlite_test!(test_duplicate_ticket_rejected);
    sqlite_test!(test_delete_by_session_key);
    sqlite_test!(test_delete_unknown_session_key);
}

#[cfg(feature = "database-postgres")]
mod postgres_tests {
    use crate::db::{
        postgres::PostgresSessionTicketRegistry,
        tests::harness::postgres::migrated_postgres_pool,
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = migrated_postgres_pool().await;
                let registry = PostgresSessionTicketRegistry::new(pool);
                super::$name(&registry).await;
            }
        };
    }

    postgres_test!(test_record_then_lookup);
    postgres_test!(test_lookup_unknown);
    postgres_test!(test_duplicate_ticket_rejected);
    postgres_test!(test_delete_by_session_key);
    postgres_test!(test_delete_unknown_session_key);
}
