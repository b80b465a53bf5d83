// db/db.rs
use sqlx::{Pool, Postgres};

use super::{
    auditdb::AuditExt,
    consultationdb::ConsultationExt,
    disputedb::DisputeExt,
    escrowdb::EscrowExt,
    notificationdb::NotificationExt,
    paymentdb::PaymentAccountExt,
    projectdb::ProjectExt,
};

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .finish()
    }
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}

/// Everything the services need from persistence. Implemented by `DBClient`
/// and, in tests, by the in-memory store.
pub trait MarketStore:
    ProjectExt
    + EscrowExt
    + DisputeExt
    + PaymentAccountExt
    + ConsultationExt
    + AuditExt
    + NotificationExt
    + Send
    + Sync
{
}

impl<T> MarketStore for T where
    T: ProjectExt
        + EscrowExt
        + DisputeExt
        + PaymentAccountExt
        + ConsultationExt
        + AuditExt
        + NotificationExt
        + Send
        + Sync
{
}

/// Renders statuses for `status::text = ANY($n)` guards.
pub(crate) fn status_list<T, F>(statuses: &[T], to_str: F) -> Vec<String>
where
    F: Fn(&T) -> &'static str,
{
    statuses.iter().map(|s| to_str(s).to_string()).collect()
}
