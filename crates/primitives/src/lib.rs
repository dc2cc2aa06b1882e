//! Core types shared by every other crate in the workspace.

pub mod buf;
pub mod model;

pub use buf::{Buf20, Buf32};
pub use model::{
    epoch_index, Application, DefaultBlock, Epoch, EpochStatus, Input, InputCompletionStatus,
    Output, Report,
};
