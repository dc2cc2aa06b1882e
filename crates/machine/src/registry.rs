use std::collections::HashMap;
use std::sync::Arc;

use tracing::*;

use rollups_primitives::{Application, Buf20};

use crate::traits::{AdvanceMachine, InspectMachine, MachineFactory, MachineResult};

struct AppMachines {
    advance: Arc<dyn AdvanceMachine>,
    inspect: Arc<dyn InspectMachine>,
}

/// One advance-machine and one inspect-machine handle per enabled
/// application. Loaded once at startup; application changes require a
/// restart.
#[derive(Default)]
pub struct MachineRegistry {
    machines: HashMap<Buf20, AppMachines>,
}

impl MachineRegistry {
    /// Spawns machines for every application in `apps`.
    pub async fn load(
        apps: &[Application],
        factory: &dyn MachineFactory,
    ) -> MachineResult<Self> {
        let mut machines = HashMap::with_capacity(apps.len());
        for app in apps {
            let (advance, inspect) = factory.create_machines(app).await?;
            info!(app = %app.contract_address, "loaded machines");
            machines.insert(app.contract_address, AppMachines { advance, inspect });
        }
        Ok(Self { machines })
    }

    pub fn advance_machine(&self, app: Buf20) -> Option<Arc<dyn AdvanceMachine>> {
        self.machines.get(&app).map(|m| m.advance.clone())
    }

    pub fn inspect_machine(&self, app: Buf20) -> Option<Arc<dyn InspectMachine>> {
        self.machines.get(&app).map(|m| m.inspect.clone())
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Releases every machine handle.
    pub fn close(&mut self) {
        self.machines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::EchoMachineFactory;
    use rollups_primitives::Buf32;

    fn test_app(addr: u8) -> Application {
        Application {
            contract_address: Buf20::from([addr; 20]),
            consensus_address: Buf20::from([0xcc; 20]),
            template_hash: Buf32::from([0; 32]),
            last_processed_block: 0,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_load_and_lookup() {
        let apps = [test_app(1), test_app(2)];
        let registry = MachineRegistry::load(&apps, &EchoMachineFactory)
            .await
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.inspect_machine(Buf20::from([1; 20])).is_some());
        assert!(registry.advance_machine(Buf20::from([2; 20])).is_some());
        assert!(registry.inspect_machine(Buf20::from([9; 20])).is_none());
    }

    #[tokio::test]
    async fn test_close_releases_machines() {
        let apps = [test_app(1)];
        let mut registry = MachineRegistry::load(&apps, &EchoMachineFactory)
            .await
            .unwrap();
        registry.close();
        assert!(registry.is_empty());
    }
}
