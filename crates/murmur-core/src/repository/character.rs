//! Character repository trait definition.

use murmur_types::agent::{Agent, AgentId, AgentPatch};
use murmur_types::error::RepositoryError;

/// Filter criteria for listing personas.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    /// Only return personas with this `active` flag.
    pub active: Option<bool>,
    /// Maximum number of results.
    pub limit: Option<i64>,
}

impl AgentFilter {
    pub fn active_only() -> Self {
        Self {
            active: Some(true),
            ..Self::default()
        }
    }
}

/// Repository trait for persona persistence.
///
/// Shared by every behavior loop, so implementations must tolerate concurrent
/// calls. `update` is atomic per id and merges `replied_ids` as a set union.
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CharacterRepository: Send + Sync + 'static {
    /// Store a new persona. Returns the stored record.
    fn create(
        &self,
        agent: &Agent,
    ) -> impl std::future::Future<Output = Result<Agent, RepositoryError>> + Send;

    /// Get a persona by id.
    fn get(
        &self,
        id: &AgentId,
    ) -> impl std::future::Future<Output = Result<Option<Agent>, RepositoryError>> + Send;

    /// List personas, newest first.
    fn list(
        &self,
        filter: Option<AgentFilter>,
    ) -> impl std::future::Future<Output = Result<Vec<Agent>, RepositoryError>> + Send;

    /// Apply a partial update. Returns the updated record, or
    /// `RepositoryError::NotFound` if the id does not exist.
    fn update(
        &self,
        id: &AgentId,
        patch: &AgentPatch,
    ) -> impl std::future::Future<Output = Result<Agent, RepositoryError>> + Send;
}
