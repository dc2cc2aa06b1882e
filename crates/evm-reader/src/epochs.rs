//! Pure epoch planning: given the open epoch, the new input events and the
//! commit head, decide which epochs to upsert and which inputs go where.

use tracing::warn;

use rollups_chainio::InputAddedEvent;
use rollups_db::types::EpochWithInputs;
use rollups_primitives::{epoch_index, Epoch, EpochStatus, Input, InputCompletionStatus};

/// Byte offset of the `index` word inside an ABI-encoded `EvmAdvance` blob:
/// 4 selector bytes, then the seventh 32-byte argument slot.
const ADVANCE_INDEX_OFFSET: usize = 4 + 6 * 32;

/// Patches the `index` argument inside an encoded `EvmAdvance` payload.
/// Returns false (leaving the blob alone) when it is too short to carry one.
pub(crate) fn rewrite_advance_index(raw: &mut [u8], index: u64) -> bool {
    let end = ADVANCE_INDEX_OFFSET + 32;
    if raw.len() < end {
        return false;
    }
    let word = alloy_primitives::U256::from(index).to_be_bytes::<32>();
    raw[ADVANCE_INDEX_OFFSET..end].copy_from_slice(&word);
    true
}

/// Plans the epoch/input batch for one application window.
///
/// `events` must be ordered by (block, log index) and all lie in blocks
/// `≤ to`. Epoch rules:
/// - an event whose epoch index passes the open epoch closes it, opening
///   (and immediately closing) any intermediate empty epochs so indexes stay
///   contiguous;
/// - the head crossing `last_block` with no inputs closes the epoch too;
/// - exactly one epoch is left Open, and only if one was open before or any
///   event arrived.
///
/// Input indexes continue `next_index` densely regardless of the on-chain
/// index; when the two differ (inputs from the other source interleaved) the
/// index word inside the payload is rewritten to match.
pub(crate) fn plan_epochs(
    epoch_length: u64,
    open_epoch: Option<Epoch>,
    events: &[InputAddedEvent],
    mut next_index: u64,
    to: u64,
) -> Vec<EpochWithInputs> {
    let mut out: Vec<EpochWithInputs> = Vec::new();
    let mut current = open_epoch.map(EpochWithInputs::new);

    for ev in events {
        let target = epoch_index(epoch_length, ev.block_number);
        match current.as_mut() {
            None => {
                current = Some(EpochWithInputs::new(Epoch::open_at(target, epoch_length)));
            }
            Some(cur) => {
                while cur.epoch.index < target {
                    cur.epoch.status = EpochStatus::Closed;
                    let next = EpochWithInputs::new(Epoch::open_at(
                        cur.epoch.index + 1,
                        epoch_length,
                    ));
                    out.push(std::mem::replace(cur, next));
                }
            }
        }

        let cur = current.as_mut().expect("current epoch exists");
        let mut input = Input {
            index: next_index,
            block_number: ev.block_number,
            raw_data: ev.payload.clone(),
            status: InputCompletionStatus::None,
            transaction_id: None,
        };
        if ev.index != next_index && !rewrite_advance_index(&mut input.raw_data, next_index) {
            warn!(
                onchain_index = ev.index,
                assigned = next_index,
                "advance payload too short to rebase its index"
            );
        }
        next_index += 1;
        cur.inputs.push(input);
    }

    // Roll the open epoch forward when the head crossed its boundary.
    if let Some(cur) = current.as_mut() {
        while cur.epoch.last_block < to {
            cur.epoch.status = EpochStatus::Closed;
            let next = EpochWithInputs::new(Epoch::open_at(cur.epoch.index + 1, epoch_length));
            out.push(std::mem::replace(cur, next));
        }
    }

    if let Some(cur) = current {
        out.push(cur);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use alloy_sol_types::SolCall;
    use rollups_chainio::events::EvmAdvanceCall;
    use rollups_primitives::Buf20;

    fn ev(app: Buf20, index: u64, block: u64) -> InputAddedEvent {
        InputAddedEvent {
            app,
            index,
            payload: vec![0u8; 300],
            block_number: block,
            log_index: index,
        }
    }

    #[test]
    fn test_two_inputs_same_epoch() {
        let app = Buf20::from([1; 20]);
        let events = [ev(app, 0, 10), ev(app, 1, 11)];
        let plan = plan_epochs(10, None, &events, 0, 11);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].epoch.index, 1);
        assert_eq!(plan[0].epoch.first_block, 10);
        assert_eq!(plan[0].epoch.last_block, 19);
        assert_eq!(plan[0].epoch.status, EpochStatus::Open);
        assert_eq!(plan[0].inputs.len(), 2);
        assert_eq!(plan[0].inputs[0].index, 0);
        assert_eq!(plan[0].inputs[1].index, 1);
    }

    #[test]
    fn test_input_crossing_closes_epoch() {
        let app = Buf20::from([1; 20]);
        let open = Epoch::open_at(1, 10);
        let events = [ev(app, 0, 20)];
        let plan = plan_epochs(10, Some(open), &events, 0, 20);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].epoch.index, 1);
        assert_eq!(plan[0].epoch.status, EpochStatus::Closed);
        assert!(plan[0].inputs.is_empty());
        assert_eq!(plan[1].epoch.index, 2);
        assert_eq!(plan[1].epoch.status, EpochStatus::Open);
        assert_eq!(plan[1].inputs.len(), 1);
    }

    #[test]
    fn test_head_crossing_closes_epoch_without_inputs() {
        let open = Epoch::open_at(0, 10);
        let plan = plan_epochs(10, Some(open), &[], 0, 25);

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].epoch.index, 0);
        assert_eq!(plan[0].epoch.status, EpochStatus::Closed);
        assert_eq!(plan[1].epoch.index, 1);
        assert_eq!(plan[1].epoch.status, EpochStatus::Closed);
        assert_eq!(plan[2].epoch.index, 2);
        assert_eq!(plan[2].epoch.status, EpochStatus::Open);
    }

    #[test]
    fn test_gap_between_event_epochs_is_filled() {
        let app = Buf20::from([1; 20]);
        let events = [ev(app, 0, 5), ev(app, 1, 35)];
        let plan = plan_epochs(10, None, &events, 0, 35);

        let indexes: Vec<_> = plan.iter().map(|p| p.epoch.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
        assert!(plan[1].inputs.is_empty());
        assert!(plan[2].inputs.is_empty());
        assert_eq!(plan[3].inputs.len(), 1);
        assert_eq!(plan[3].epoch.status, EpochStatus::Open);
    }

    #[test]
    fn test_no_events_no_open_epoch_plans_nothing() {
        assert!(plan_epochs(10, None, &[], 0, 42).is_empty());
    }

    #[test]
    fn test_index_rebase_rewrites_payload() {
        let app = Buf20::from([1; 20]);
        let payload = EvmAdvanceCall {
            chainId: U256::from(31337u64),
            appContract: Address::from(app),
            msgSender: Address::repeat_byte(2),
            blockNumber: U256::from(20u64),
            blockTimestamp: U256::from(1_700_000_240u64),
            prevRandao: U256::from(7u64),
            index: U256::from(0u64),
            payload: vec![0xde, 0xad].into(),
        }
        .abi_encode();

        // the on-chain event says index 0, but locally three inputs exist
        let event = InputAddedEvent {
            app,
            index: 0,
            payload,
            block_number: 20,
            log_index: 0,
        };
        let plan = plan_epochs(10, None, &[event], 3, 20);
        let input = &plan[0].inputs[0];
        assert_eq!(input.index, 3);

        let decoded = EvmAdvanceCall::abi_decode(&input.raw_data).unwrap();
        assert_eq!(decoded.index, U256::from(3u64));
        // everything else untouched
        assert_eq!(decoded.blockNumber, U256::from(20u64));
        assert_eq!(decoded.payload.as_ref(), &[0xde, 0xad]);
    }
}
