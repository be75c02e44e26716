//! Existence probes: read-only lookups of a resource by identity.

use crate::error::Result;
use crate::query::Query;
use crate::session::{Instance, ManagementSession};
use tracing::debug;

/// Whether at least one object matches `query`.
pub async fn exists(session: &ManagementSession, query: &Query) -> Result<bool> {
    let found = session.query(query).await?;
    debug!(query = %query, matches = found.len(), "Existence probe");
    Ok(!found.is_empty())
}

/// First object matching `query`.
pub async fn find(session: &ManagementSession, query: &Query) -> Result<Option<Instance>> {
    Ok(session.query(query).await?.into_iter().next())
}

pub async fn find_all(session: &ManagementSession, query: &Query) -> Result<Vec<Instance>> {
    session.query(query).await
}
