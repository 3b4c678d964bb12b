use super::models::{NewUser, User};
use super::CredentialStore;
use crate::error::{AppError, AppResult};
use chrono::Utc;

impl CredentialStore {
    /// Returns the user called `name`, creating it first if needed.
    ///
    /// `builder` runs only when no such user exists yet. When two requests
    /// race on the same new name both inserts reach SQLite, the `UNIQUE`
    /// constraint keeps the first and `ON CONFLICT DO NOTHING` turns the
    /// second into a no-op. Both callers then read back the same row.
    pub async fn get_or_create_user<F>(&self, name: &str, builder: F) -> AppResult<User>
    where
        F: FnOnce() -> NewUser,
    {
        if let Some(user) = self.find_user(name).await? {
            return Ok(user);
        }

        let new_user = builder();
        let inserted = sqlx::query(
            "INSERT INTO users (handle, name, display_name, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(&new_user.handle)
        .bind(name)
        .bind(&new_user.display_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            tracing::info!(user = %name, "Created user");
        }

        self.get_user(name).await
    }

    pub async fn get_user(&self, name: &str) -> AppResult<User> {
        self.find_user(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", name)))
    }

    pub async fn get_user_by_handle(&self, handle: &[u8]) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE handle = ?")
            .bind(handle)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    AppError::NotFound("No user with this handle".to_string())
                }
                _ => AppError::Database(e),
            })
    }

    /// Owners of the credential `id`. Empty means the id is still free.
    pub async fn find_users_by_credential_id(&self, id: &[u8]) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT users.* FROM users
             JOIN credentials ON credentials.user_handle = users.handle
             WHERE credentials.id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn find_user(&self, name: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }
}
