//! The narrow interface to the virtual machines that execute inputs, and
//! the registry mapping applications to live machine handles.

pub mod registry;
pub mod test_utils;
pub mod traits;

pub use registry::MachineRegistry;
pub use traits::{
    AdvanceMachine, AdvanceResult, InspectMachine, InspectResult, MachineError, MachineFactory,
    MachineResult,
};
