// db/auditdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::auditmodel::*;

const AUDIT_COLUMNS: &str = "id, actor_id, action, project_id, milestone_id, escrow_id, details, \
    description, created_at";

/// Append-only; entries are never updated or deleted.
#[async_trait]
pub trait AuditExt {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLog, Error>;

    async fn get_project_audit(&self, project_id: Uuid) -> Result<Vec<AuditLog>, Error>;

    /// Escrow money-movement entries where the user is the paying client or
    /// the receiving company, oldest first.
    async fn get_escrow_audit_for_party(&self, user_id: Uuid) -> Result<Vec<AuditLog>, Error>;
}

#[async_trait]
impl AuditExt for DBClient {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLog, Error> {
        sqlx::query_as::<_, AuditLog>(&format!(
            r#"
            INSERT INTO audit_logs
            (actor_id, action, project_id, milestone_id, escrow_id, details, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {AUDIT_COLUMNS}
            "#
        ))
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(entry.project_id)
        .bind(entry.milestone_id)
        .bind(entry.escrow_id)
        .bind(entry.details)
        .bind(entry.description)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_project_audit(&self, project_id: Uuid) -> Result<Vec<AuditLog>, Error> {
        sqlx::query_as::<_, AuditLog>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE project_id = $1 ORDER BY created_at ASC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_escrow_audit_for_party(&self, user_id: Uuid) -> Result<Vec<AuditLog>, Error> {
        sqlx::query_as::<_, AuditLog>(&format!(
            r#"
            SELECT {AUDIT_COLUMNS} FROM audit_logs
            WHERE escrow_id IS NOT NULL
              AND (details->>'client_id' = $1::text OR details->>'company_id' = $1::text)
            ORDER BY created_at ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
