//! Loopback machine used in tests and for running the node without a VM
//! backend attached.

use std::sync::Arc;

use async_trait::async_trait;

use rollups_primitives::{Application, InputCompletionStatus};

use crate::traits::{
    AdvanceMachine, AdvanceResult, InspectMachine, InspectResult, MachineFactory, MachineResult,
};

/// Accepts everything and echoes the payload back as a single report.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoMachine;

#[async_trait]
impl AdvanceMachine for EchoMachine {
    async fn advance(&self, input: &[u8], _index: u64) -> MachineResult<AdvanceResult> {
        Ok(AdvanceResult {
            status: InputCompletionStatus::Accepted,
            outputs: Vec::new(),
            reports: vec![input.to_vec()],
        })
    }
}

#[async_trait]
impl InspectMachine for EchoMachine {
    async fn inspect(&self, query: &[u8]) -> MachineResult<InspectResult> {
        Ok(InspectResult {
            accepted: true,
            error: None,
            reports: vec![query.to_vec()],
            processed_inputs: 0,
        })
    }
}

/// Factory producing [`EchoMachine`] pairs.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoMachineFactory;

#[async_trait]
impl MachineFactory for EchoMachineFactory {
    async fn create_machines(
        &self,
        _app: &Application,
    ) -> MachineResult<(Arc<dyn AdvanceMachine>, Arc<dyn InspectMachine>)> {
        Ok((Arc::new(EchoMachine), Arc::new(EchoMachine)))
    }
}
