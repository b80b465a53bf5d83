// db/notificationdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::auditmodel::Notification;

#[async_trait]
pub trait NotificationExt {
    async fn store_notification(
        &self,
        user_id: Uuid,
        template: &str,
        payload: serde_json::Value,
    ) -> Result<Notification, Error>;
}

#[async_trait]
impl NotificationExt for DBClient {
    async fn store_notification(
        &self,
        user_id: Uuid,
        template: &str,
        payload: serde_json::Value,
    ) -> Result<Notification, Error> {
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, template, payload)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, template, payload, created_at
            "#,
        )
        .bind(user_id)
        .bind(template)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
    }
}
