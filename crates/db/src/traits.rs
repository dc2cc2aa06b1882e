//! Trait definition for the node's persistence layer.
//!
//! Operations are synchronous at this level; async callers go through the
//! storage ops layer which runs them on a worker pool.

use rollups_primitives::{Application, Buf20, Epoch, Input, Output, Report};

use crate::types::EpochWithInputs;
use crate::DbResult;

/// The single authoritative state store shared by both reader paths and the
/// read APIs. Implementations must make every write method atomic and
/// serialize read-modify-write sequences against each other.
pub trait Repository: Send + Sync + 'static {
    // -- applications --

    fn put_application(&self, app: Application) -> DbResult<()>;

    fn get_application(&self, app: Buf20) -> DbResult<Option<Application>>;

    /// All applications currently enabled, in address order.
    fn get_all_running_applications(&self) -> DbResult<Vec<Application>>;

    // -- epochs + inputs --

    /// Atomically upserts `batches` (epochs plus their new inputs), advances
    /// the application's dense input-index cursor past the inserted inputs,
    /// and advances `last_processed_block` to `block_number`. Inputs must
    /// arrive with consecutive indices continuing the cursor, otherwise the
    /// whole batch fails with [`crate::DbError::OooInsert`]. An empty batch
    /// list still commits the cursor advance.
    fn store_epoch_and_inputs(
        &self,
        app: Buf20,
        batches: Vec<EpochWithInputs>,
        block_number: u64,
    ) -> DbResult<()>;

    /// The application's current open epoch, if any. `epoch_length` is used
    /// to sanity-check the stored epoch's block bounds.
    fn get_epoch(&self, epoch_length: u64, app: Buf20) -> DbResult<Option<Epoch>>;

    fn get_epoch_at(&self, app: Buf20, index: u64) -> DbResult<Option<Epoch>>;

    fn get_epochs(&self, app: Buf20) -> DbResult<Vec<Epoch>>;

    /// Epochs in Closed or ClaimComputed state whose `last_block` does not
    /// exceed `up_to_block`, in index order.
    fn get_previous_epochs_with_open_claims(
        &self,
        app: Buf20,
        up_to_block: u64,
    ) -> DbResult<Vec<Epoch>>;

    /// Transitions the supplied epochs to ClaimAccepted and advances the
    /// application cursor to `most_recent_block`. Status-gated: an epoch not
    /// currently in Closed or ClaimComputed state fails the call with
    /// [`crate::DbError::NoUpdate`].
    fn update_epochs(
        &self,
        app: Buf20,
        claims: Vec<Epoch>,
        most_recent_block: u64,
    ) -> DbResult<()>;

    // -- inputs --

    fn get_input(&self, app: Buf20, index: u64) -> DbResult<Option<Input>>;

    fn get_inputs(&self, app: Buf20) -> DbResult<Vec<Input>>;

    // -- outputs + reports --

    fn put_output(&self, app: Buf20, output: Output) -> DbResult<()>;

    fn get_output(&self, app: Buf20, index: u64) -> DbResult<Option<Output>>;

    fn get_outputs(&self, app: Buf20) -> DbResult<Vec<Output>>;

    /// Records execution transaction hashes for `outputs` and advances the
    /// application cursor. Fails with [`crate::DbError::NoUpdate`] if any of
    /// the outputs is not present.
    fn update_output_execution(
        &self,
        app: Buf20,
        outputs: Vec<Output>,
        block_number: u64,
    ) -> DbResult<()>;

    fn put_report(&self, app: Buf20, report: Report) -> DbResult<()>;

    fn get_report(&self, app: Buf20, index: u64) -> DbResult<Option<Report>>;

    /// Reports for an application, optionally restricted to one input.
    fn get_reports(&self, app: Buf20, input_index: Option<u64>) -> DbResult<Vec<Report>>;

    // -- espresso cursors --

    /// Next expected nonce for `(sender, app)`, starting at 0.
    fn get_espresso_nonce(&self, sender: Buf20, app: Buf20) -> DbResult<u64>;

    /// Post-increments the stored nonce and returns the previous value.
    fn update_espresso_nonce(&self, sender: Buf20, app: Buf20) -> DbResult<u64>;

    /// Next dense input index to assign for `app`. Advanced atomically by
    /// [`Self::store_epoch_and_inputs`].
    fn get_input_index(&self, app: Buf20) -> DbResult<u64>;

    fn get_last_processed_espresso_block(&self, app: Buf20) -> DbResult<u64>;

    fn update_last_processed_espresso_block(&self, app: Buf20, height: u64) -> DbResult<()>;
}
