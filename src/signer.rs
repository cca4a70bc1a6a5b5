/// Sender recovery (§4.4, step 4 / §9 "Sender recovery"): `tx_from` is
/// derived from the transaction's signature rather than trusted verbatim
/// from the RPC response, using the signer appropriate to the transaction's
/// own type (legacy EIP-155 vs. typed EIP-1559/2930/4844) and reported
/// chain-id. Grounded on `other_examples/...danyalprout-node-reth__src-rpc.rs`,
/// which recovers senders from a block body via `recover_signers()` rather
/// than reading a pre-populated `from` field.
///
/// A transaction whose signature does not recover is a malformed body, not
/// a network hiccup, so failures here are always `PermanentUpstream` and
/// the caller skips that single transaction (it does not abort the block).
use alloy::consensus::transaction::SignerRecoverable;
use alloy::rpc::types::Transaction as RpcTransaction;

use crate::error::IndexError;

pub fn recover_sender(tx: &RpcTransaction) -> Result<String, IndexError> {
    tx.inner
        .inner()
        .recover_signer()
        .map(|addr| format!("{addr:#x}"))
        .map_err(|e| IndexError::permanent(format!("signature recovery failed: {e}")))
}
