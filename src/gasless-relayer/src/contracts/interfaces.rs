//! Solidity ABI of the gasless entrypoint the relayer submits to.
//!
//! The entrypoint verifies the user's EIP-712 signature itself, consumes the signer's nonce and
//! forwards to the governance / market contracts. We only ever talk to it through this surface.

use alloy_sol_types::sol;

sol! {
    interface IGaslessEntrypoint {
        function nonces(address owner) external view returns (uint256 nonce);

        function createProposalWithSig(
            address proposer,
            bytes32 marketId,
            string title,
            string description,
            uint256 stakeAmount,
            uint256 nonce,
            uint256 deadline,
            bytes signature
        ) external returns (uint256 proposalId);

        function castVoteWithSig(
            uint256 proposalId,
            bool support,
            address voter,
            uint256 nullifierHash,
            uint256 nonce,
            uint256 deadline,
            bytes signature
        ) external;

        function zapWithSig(
            address user,
            uint256 wldAmount,
            uint256 minUSDC,
            bytes32 conditionId,
            uint256 outcomeIndex,
            uint256 minSharesOut,
            uint256 nonce,
            uint256 deadline,
            bytes signature
        ) external returns (uint256 sharesOut);

        event ProposalCreated(uint256 indexed proposalId, address indexed proposer, bytes32 indexed marketId, uint256 stakeAmount);
        event VoteCast(uint256 indexed proposalId, address indexed voter, bool support, uint256 nullifierHash);
        event ZapExecuted(
            address indexed user,
            bytes32 indexed conditionId,
            uint256 outcomeIndex,
            uint256 usdcIn,
            uint256 sharesOut,
            uint256 positionId
        );

        error InvalidNonce(address signer, uint256 expected, uint256 provided);
        error ExpiredDeadline(uint256 deadline);
        error InvalidSigner(address recovered);
        error NullifierUsed(uint256 nullifierHash);
        error SlippageExceeded(uint256 minimum, uint256 actual);
    }
}
