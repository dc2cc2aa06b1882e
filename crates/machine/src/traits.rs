use async_trait::async_trait;
use thiserror::Error;

use rollups_primitives::{Application, InputCompletionStatus};

pub type MachineResult<T> = Result<T, MachineError>;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("machine runtime error: {0}")]
    Runtime(String),

    #[error("could not create machine for {0}: {1}")]
    Create(String, String),
}

/// Result of a read-only query against a machine snapshot.
#[derive(Clone, Debug, Default)]
pub struct InspectResult {
    pub accepted: bool,
    /// Machine-side failure description, when the query raised one.
    pub error: Option<String>,
    pub reports: Vec<Vec<u8>>,
    /// How many inputs the snapshot had processed when queried.
    pub processed_inputs: u64,
}

/// Result of advancing a machine with one input.
#[derive(Clone, Debug)]
pub struct AdvanceResult {
    pub status: InputCompletionStatus,
    pub outputs: Vec<Vec<u8>>,
    pub reports: Vec<Vec<u8>>,
}

/// Mutating half of a machine: feeds inputs forward.
#[async_trait]
pub trait AdvanceMachine: Send + Sync {
    async fn advance(&self, input: &[u8], index: u64) -> MachineResult<AdvanceResult>;
}

/// Read-only half of a machine: runs queries without changing state.
/// Concurrent inspects on the same application are serialized by the
/// machine itself.
#[async_trait]
pub trait InspectMachine: Send + Sync {
    async fn inspect(&self, query: &[u8]) -> MachineResult<InspectResult>;
}

/// Creates the machine pair for an application at registry load time. The
/// actual VM backend lives behind this seam.
#[async_trait]
pub trait MachineFactory: Send + Sync {
    async fn create_machines(
        &self,
        app: &Application,
    ) -> MachineResult<(
        std::sync::Arc<dyn AdvanceMachine>,
        std::sync::Arc<dyn InspectMachine>,
    )>;
}
