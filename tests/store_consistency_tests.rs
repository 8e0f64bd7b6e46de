//! Postgres store consistency tests
//!
//! These exercise the row-level atomicity the auth service relies on:
//! single-statement attempt increments and compare-and-set revocation.

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sqlx::PgPool;
    use uuid::Uuid;

    use otpgate::auth::{
        ChallengeStore, PgChallengeStore, PgRefreshTokenStore, PgUserStore, RefreshTokenStore,
        UserStore,
    };

    /// Helper to create a test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/otpgate_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn test_phone() -> String {
        // Unique per run so repeated runs do not collide on the phone key.
        format!("+1555{:07}", rand::random::<u32>() % 10_000_000)
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_challenge_lifecycle() {
        let pool = setup_test_db().await;
        let store = PgChallengeStore::new(pool);

        let challenge_id = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::seconds(300);

        store
            .create(&test_phone(), &challenge_id, "$argon2id$stub", expires_at)
            .await
            .expect("create should succeed");

        let found = store
            .find_by_challenge_id(&challenge_id)
            .await
            .expect("challenge should be found");
        assert_eq!(found.attempts, 0);

        let updated = store
            .increment_attempts(&challenge_id)
            .await
            .expect("increment should succeed");
        assert_eq!(updated.attempts, 1);

        store
            .delete(&challenge_id)
            .await
            .expect("delete should succeed");
        assert!(store.find_by_challenge_id(&challenge_id).await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_concurrent_increments_never_lose_an_attempt() {
        let pool = setup_test_db().await;
        let store = std::sync::Arc::new(PgChallengeStore::new(pool));

        let challenge_id = Uuid::new_v4().to_string();
        store
            .create(
                &test_phone(),
                &challenge_id,
                "$argon2id$stub",
                Utc::now() + Duration::seconds(300),
            )
            .await
            .expect("create should succeed");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = challenge_id.clone();
            handles.push(tokio::spawn(
                async move { store.increment_attempts(&id).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().expect("increment should succeed");
        }

        let row = store
            .find_by_challenge_id(&challenge_id)
            .await
            .expect("challenge should be found");
        assert_eq!(row.attempts, 8);

        store.delete(&challenge_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_revoke_is_compare_and_set() {
        let pool = setup_test_db().await;
        let users = PgUserStore::new(pool.clone());
        let store = PgRefreshTokenStore::new(pool);

        let user = users
            .find_or_create(&test_phone())
            .await
            .expect("user upsert should succeed");

        let token = store
            .insert(user.id, "$argon2id$stub", Utc::now() + Duration::days(30))
            .await
            .expect("insert should succeed");

        assert!(store.revoke(token.id).await.unwrap());
        // Second revoke of the same row loses the compare-and-set.
        assert!(!store.revoke(token.id).await.unwrap());
        // Unknown row never wins.
        assert!(!store.revoke(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_list_active_excludes_revoked_and_orders_newest_first() {
        let pool = setup_test_db().await;
        let users = PgUserStore::new(pool.clone());
        let store = PgRefreshTokenStore::new(pool);

        let user = users.find_or_create(&test_phone()).await.unwrap();

        let first = store
            .insert(user.id, "$argon2id$first", Utc::now() + Duration::days(30))
            .await
            .unwrap();
        let second = store
            .insert(user.id, "$argon2id$second", Utc::now() + Duration::days(30))
            .await
            .unwrap();

        let active = store.list_active().await.unwrap();
        let ours: Vec<_> = active.iter().filter(|t| t.user_id == user.id).collect();
        assert_eq!(ours.len(), 2);
        // Newest first.
        assert_eq!(ours[0].id, second.id);

        store.revoke(first.id).await.unwrap();
        let active = store.list_active().await.unwrap();
        assert!(active
            .iter()
            .filter(|t| t.user_id == user.id)
            .all(|t| t.id == second.id));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_find_or_create_is_an_upsert() {
        let pool = setup_test_db().await;
        let users = PgUserStore::new(pool);

        let phone = test_phone();
        let a = users.find_or_create(&phone).await.unwrap();
        let b = users.find_or_create(&phone).await.unwrap();
        assert_eq!(a.id, b.id);

        let found = users.find_by_id(a.id).await.unwrap();
        assert_eq!(found.phone, phone);
    }
}
