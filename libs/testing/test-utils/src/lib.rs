//! Shared test infrastructure
//!
//! - `TestDatabase`: PostgreSQL container with the schema migrated (feature: "postgres")
//! - `TestRedis`: Redis container (feature: "redis")
//!
//! Both containers are stopped and removed when the helper is dropped. Tests
//! using them need a Docker daemon and are marked `#[ignore]` in this
//! workspace; run them with `cargo test -- --ignored`.
//!
//! ```rust,ignore
//! use test_utils::TestDatabase;
//!
//! #[tokio::test]
//! #[ignore = "requires Docker"]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let repo = PgNotificationRepository::new(db.connection());
//! }
//! ```
//!
//! Redis helpers need `features = ["redis"]` on the dev-dependency.

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Poll `condition` every 50ms until it holds, panicking after `attempts` tries.
pub async fn eventually<F, Fut>(attempts: usize, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..attempts {
        if condition().await {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("condition not met after {} attempts", attempts);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_eventually_returns_once_condition_holds() {
        let counter = AtomicUsize::new(0);
        let polls = &counter;
        eventually(10, move || async move { polls.fetch_add(1, Ordering::SeqCst) >= 2 }).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    #[should_panic(expected = "condition not met")]
    async fn test_eventually_panics_when_condition_never_holds() {
        eventually(2, || async { false }).await;
    }
}
