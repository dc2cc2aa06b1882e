//! On-chain event and call definitions the adapter understands.

use alloy_sol_types::sol;

sol! {
    /// Emitted by the input box when a user submits an input on L1. The
    /// `input` blob is the full ABI-encoded advance payload.
    #[derive(Debug)]
    event InputAdded(address indexed appContract, uint256 indexed index, bytes input);

    /// Emitted by the consensus contract when a claim gets accepted.
    #[derive(Debug)]
    event ClaimAcceptance(address indexed appContract, uint256 lastProcessedBlockNumber, bytes32 claim);

    /// Emitted by the application contract when an output is executed on L1.
    #[derive(Debug)]
    event OutputExecuted(uint64 outputIndex, bytes output);

    function getConsensus() external view returns (address);

    function getEpochLength() external view returns (uint256);

    /// The canonical advance-request payload handed to machines. The input
    /// box emits inputs already encoded this way; the espresso path encodes
    /// them itself.
    function EvmAdvance(
        uint256 chainId,
        address appContract,
        address msgSender,
        uint256 blockNumber,
        uint256 blockTimestamp,
        uint256 prevRandao,
        uint256 index,
        bytes calldata payload
    ) external;
}
