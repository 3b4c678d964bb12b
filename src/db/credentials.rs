//! # Credential Operations
//!
//! Insert and lookup of registered credentials, plus the two fields that
//! change after registration: the signature counter and the backup state.
//!
//! Only public key material is stored. Private keys never leave the
//! authenticator.

use super::models::{CredentialRow, StoredCredential, User};
use super::CredentialStore;
use crate::error::{AppError, AppResult};
use chrono::Utc;

impl CredentialStore {
    /// Stores a new credential.
    ///
    /// Fails with `DuplicateCredential` if the id is already registered, to
    /// this user or any other. The primary key decides, not a prior lookup.
    pub async fn add_credential(&self, credential: StoredCredential) -> AppResult<()> {
        let transports = serde_json::to_string(&credential.transports)?;

        sqlx::query(
            "INSERT INTO credentials
             (id, user_handle, public_key, sign_count, transports, backup_eligible, backed_up,
              attestation_format, attestation_object, attestation_client_data, aaguid,
              registered_at, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&credential.id)
        .bind(&credential.user_handle)
        .bind(&credential.public_key)
        .bind(i64::from(credential.sign_count))
        .bind(transports)
        .bind(credential.backup_eligible)
        .bind(credential.backed_up)
        .bind(&credential.attestation_format)
        .bind(&credential.attestation_object)
        .bind(&credential.attestation_client_data)
        .bind(credential.aaguid.to_string())
        .bind(&credential.registered_at)
        .bind(&credential.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::DuplicateCredential
            }
            _ => AppError::Database(e),
        })?;

        Ok(())
    }

    /// Credentials of `user`, in registration order.
    pub async fn list_credentials(&self, user: &User) -> AppResult<Vec<StoredCredential>> {
        self.get_credentials_by_user_handle(&user.handle).await
    }

    pub async fn get_credentials_by_user_handle(
        &self,
        handle: &[u8],
    ) -> AppResult<Vec<StoredCredential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE user_handle = ? ORDER BY rowid",
        )
        .bind(handle)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredCredential::try_from).collect()
    }

    pub async fn get_credential_by_id(&self, id: &[u8]) -> AppResult<StoredCredential> {
        let row = sqlx::query_as::<_, CredentialRow>("SELECT * FROM credentials WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => AppError::NotFound("Credential not found".to_string()),
                _ => AppError::Database(e),
            })?;

        row.try_into()
    }

    /// Moves the signature counter from `expected` to `sign_count`, replaces
    /// the stored key material and stamps `last_used_at`.
    ///
    /// The write only happens if the stored counter still equals `expected`,
    /// so of two assertions racing with the same counter exactly one lands.
    /// Whether `sign_count` is an acceptable successor is the caller's call.
    ///
    /// ## Errors
    /// - NotFound: no credential with this id
    /// - CounterRegression: the stored counter moved since it was read
    pub async fn update_signature_counter(
        &self,
        id: &[u8],
        expected: u32,
        sign_count: u32,
        public_key: &[u8],
    ) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE credentials
             SET sign_count = ?, public_key = ?, last_used_at = ?
             WHERE id = ? AND sign_count = ?",
        )
        .bind(i64::from(sign_count))
        .bind(public_key)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(i64::from(expected))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated > 0 {
            return Ok(());
        }

        let current: Option<i64> =
            sqlx::query_scalar("SELECT sign_count FROM credentials WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match current {
            None => Err(AppError::NotFound("Credential not found".to_string())),
            Some(current) => Err(AppError::CounterRegression {
                stored: u32::try_from(current).unwrap_or(u32::MAX),
                presented: sign_count,
            }),
        }
    }

    /// Records a change of the backup state flag (BS) reported by the
    /// authenticator, e.g. a passkey that got synced after registration.
    pub async fn update_backup_state(&self, id: &[u8], backed_up: bool) -> AppResult<()> {
        let updated = sqlx::query("UPDATE credentials SET backed_up = ? WHERE id = ?")
            .bind(backed_up)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound("Credential not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewUser, Transport};
    use uuid::Uuid;

    async fn store_with_user(name: &str) -> (CredentialStore, User) {
        let store = CredentialStore::in_memory().await.unwrap();
        let user = store
            .get_or_create_user(name, || NewUser::random(None))
            .await
            .unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn stores_and_reads_back_every_field() {
        let (store, alice) = store_with_user("alice").await;

        let mut credential =
            StoredCredential::new(vec![1, 2, 3], alice.handle.clone(), b"pk".to_vec(), 5);
        credential.transports = vec![Transport::Usb, Transport::Nfc];
        credential.backup_eligible = true;
        credential.attestation_format = "packed".into();
        credential.attestation_object = vec![0xa3];
        credential.attestation_client_data = b"{}".to_vec();
        credential.aaguid = Uuid::new_v4();

        store.add_credential(credential.clone()).await.unwrap();

        assert_eq!(
            store.get_credential_by_id(&[1, 2, 3]).await.unwrap(),
            credential
        );
    }

    #[tokio::test]
    async fn lists_in_registration_order() {
        let (store, alice) = store_with_user("alice").await;

        for id in [[9u8], [1], [5]] {
            store
                .add_credential(StoredCredential::new(
                    id.to_vec(),
                    alice.handle.clone(),
                    vec![],
                    0,
                ))
                .await
                .unwrap();
        }

        let ids: Vec<Vec<u8>> = store
            .list_credentials(&alice)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![vec![9], vec![1], vec![5]]);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_for_any_user() {
        let (store, alice) = store_with_user("alice").await;
        let bob = store
            .get_or_create_user("bob", || NewUser::random(None))
            .await
            .unwrap();

        store
            .add_credential(StoredCredential::new(
                b"shared".to_vec(),
                alice.handle.clone(),
                b"alice-key".to_vec(),
                0,
            ))
            .await
            .unwrap();

        let err = store
            .add_credential(StoredCredential::new(
                b"shared".to_vec(),
                bob.handle.clone(),
                b"bob-key".to_vec(),
                0,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateCredential));

        let stored = store.get_credential_by_id(b"shared").await.unwrap();
        assert_eq!(stored.user_handle, alice.handle);
        assert!(store.list_credentials(&bob).await.unwrap().is_empty());
    }

    async fn store_with_credential(sign_count: u32) -> CredentialStore {
        let (store, alice) = store_with_user("alice").await;
        store
            .add_credential(StoredCredential::new(
                b"c".to_vec(),
                alice.handle.clone(),
                b"pk-v1".to_vec(),
                sign_count,
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn counter_update_writes_key_and_stamps_last_use() {
        let store = store_with_credential(10).await;

        store
            .update_signature_counter(b"c", 10, 11, b"pk-v2")
            .await
            .unwrap();

        let stored = store.get_credential_by_id(b"c").await.unwrap();
        assert_eq!(stored.sign_count, 11);
        assert_eq!(stored.public_key, b"pk-v2");
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn counter_update_against_a_moved_counter_is_refused() {
        let store = store_with_credential(10).await;
        store
            .update_signature_counter(b"c", 10, 12, b"pk-v2")
            .await
            .unwrap();

        let err = store
            .update_signature_counter(b"c", 10, 11, b"pk-v3")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::CounterRegression {
                stored: 12,
                presented: 11
            }
        ));

        let stored = store.get_credential_by_id(b"c").await.unwrap();
        assert_eq!(stored.sign_count, 12);
        assert_eq!(stored.public_key, b"pk-v2");
    }

    #[tokio::test]
    async fn racing_counter_updates_from_the_same_value_land_once() {
        let store = store_with_credential(4).await;

        let (a, b) = tokio::join!(
            store.update_signature_counter(b"c", 4, 5, b"pk-a"),
            store.update_signature_counter(b"c", 4, 5, b"pk-b"),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.get_credential_by_id(b"c").await.unwrap().sign_count, 5);
    }

    #[tokio::test]
    async fn counterless_authenticators_keep_updating_at_zero() {
        let store = store_with_credential(0).await;

        store.update_signature_counter(b"c", 0, 0, b"pk").await.unwrap();
        store.update_signature_counter(b"c", 0, 0, b"pk").await.unwrap();

        assert_eq!(store.get_credential_by_id(b"c").await.unwrap().sign_count, 0);
    }

    #[tokio::test]
    async fn updates_on_unknown_ids_are_not_found() {
        let store = CredentialStore::in_memory().await.unwrap();

        assert!(matches!(
            store.update_signature_counter(b"missing", 0, 1, b"pk").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.update_backup_state(b"missing", true).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.get_credential_by_id(b"missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn backup_state_can_change() {
        let (store, alice) = store_with_user("alice").await;
        store
            .add_credential(StoredCredential::new(
                b"c".to_vec(),
                alice.handle.clone(),
                vec![],
                0,
            ))
            .await
            .unwrap();

        store.update_backup_state(b"c", true).await.unwrap();
        assert!(store.get_credential_by_id(b"c").await.unwrap().backed_up);
    }
}
