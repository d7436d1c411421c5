//! Per-transaction validation and execution.

use crate::context::{BlockContext, TxContext};
use crate::error::{ValidationError, VmError};
use crate::gas;
use crate::vm::{FrameOutcome, FrameResult, Vm};
use sable_crypto::{PublicKey, Signature};
use sable_storage::StateStore;
use sable_types::{Address, Receipt, Transaction};
use tracing::debug;

/// Static configuration for the processor.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub chain_id: u64,
    /// Accept the all-0xFF placeholder signature. Test tooling only; MUST
    /// stay disabled on any real deployment.
    pub allow_dev_signatures: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            allow_dev_signatures: false,
        }
    }
}

/// Outcome of processing one transaction inside a block.
#[derive(Clone, Debug)]
pub struct ProcessedTransaction {
    pub receipt: Receipt,
    pub gas_used: u64,
    pub success: bool,
    /// VM failure category when `success` is false.
    pub error: Option<String>,
}

/// Validates and executes transactions against the state store.
#[derive(Clone, Debug, Default)]
pub struct TransactionProcessor {
    config: ProcessorConfig,
}

impl TransactionProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Check a transaction without executing it. Order matters: nonce,
    /// fee floor, intrinsic gas, funds, signature.
    pub fn validate(
        &self,
        state: &StateStore,
        tx: &Transaction,
        base_fee: u64,
    ) -> Result<(), ValidationError> {
        let expected = state.get_nonce(&tx.from);
        if tx.nonce != expected {
            return Err(ValidationError::BadNonce {
                expected,
                got: tx.nonce,
            });
        }

        if tx.max_fee < base_fee {
            return Err(ValidationError::FeeTooLow {
                max_fee: tx.max_fee,
                base_fee,
            });
        }

        let intrinsic = gas::intrinsic_gas(tx);
        if tx.gas_limit < intrinsic {
            return Err(ValidationError::IntrinsicTooLow {
                gas_limit: tx.gas_limit,
                intrinsic,
            });
        }

        let balance = state.get_balance(&tx.from);
        let required = tx.max_cost();
        if balance < required {
            return Err(ValidationError::InsufficientFunds { balance, required });
        }

        self.verify_signature(tx)?;
        Ok(())
    }

    /// Verify the Ed25519 authorization: the sender address must derive
    /// from the carried public key, and the signature must cover the
    /// transaction hash.
    pub fn verify_signature(&self, tx: &Transaction) -> Result<(), ValidationError> {
        if self.config.allow_dev_signatures && tx.signature.iter().all(|b| *b == 0xff) {
            return Ok(());
        }

        let pubkey =
            PublicKey::from_bytes(&tx.sender_pubkey).map_err(|_| ValidationError::BadSignature)?;
        if pubkey.derive_address().payload != tx.from.payload {
            return Err(ValidationError::BadSignature);
        }

        let sig = Signature::from_bytes(&tx.signature);
        pubkey
            .verify(&tx.hash().0, &sig)
            .map_err(|_| ValidationError::BadSignature)
    }

    /// Validate then execute. Validation failures are typed outcomes; an
    /// execution failure produces a `success = false` receipt with the gas
    /// accounting applied.
    pub fn process(
        &self,
        state: &mut StateStore,
        tx: &Transaction,
        ctx: &BlockContext,
    ) -> Result<ProcessedTransaction, ValidationError> {
        self.validate(state, tx, ctx.base_fee)?;

        let price = tx.effective_gas_price(ctx.base_fee);
        let intrinsic = gas::intrinsic_gas(tx);

        // Escrow the worst-case gas charge, then advance the nonce. Both
        // survive a failed execution.
        state
            .sub_balance(&tx.from, tx.gas_limit.saturating_mul(price))
            .map_err(|_| ValidationError::InsufficientFunds {
                balance: state.get_balance(&tx.from),
                required: tx.gas_limit.saturating_mul(price),
            })?;
        state.increment_nonce(&tx.from);

        let snap = state.snapshot();
        let code_gas = tx.gas_limit - intrinsic;
        let tx_ctx = TxContext {
            origin: tx.from,
            gas_price: price,
        };

        let mut vm = Vm::new(state, ctx, tx_ctx);
        let (frame, created): (FrameResult, Option<Address>) = if tx.is_create() {
            vm.create(tx.from, &tx.data, tx.value, code_gas, None)
        } else {
            (
                vm.call(tx.from, tx.to, tx.value, &tx.data, code_gas, false),
                None,
            )
        };

        let (success, gas_used, output_error, logs) = match frame.outcome {
            FrameOutcome::Success => {
                let used = intrinsic + (code_gas - frame.gas_left);
                (true, used, None, frame.logs)
            }
            FrameOutcome::Revert => {
                state.revert(snap);
                let used = intrinsic + (code_gas - frame.gas_left);
                let category = VmError::Revert(frame.output).category().to_string();
                (false, used, Some(category), Vec::new())
            }
            FrameOutcome::Fault(err) => {
                state.revert(snap);
                (false, tx.gas_limit, Some(err.category().to_string()), Vec::new())
            }
        };

        // Refund the unused portion of the escrow and pay the sequencer.
        let refund = tx.gas_limit - gas_used;
        if refund > 0 {
            state.add_balance(&tx.from, refund.saturating_mul(price));
        }
        state.add_balance(&ctx.coinbase, gas_used.saturating_mul(price));

        debug!(
            tx = %tx.hash(),
            success,
            gas_used,
            error = output_error.as_deref().unwrap_or(""),
            "transaction processed"
        );

        let receipt = Receipt {
            tx_hash: tx.hash(),
            block_number: ctx.block_number,
            index: 0, // assigned by the block processor
            from: tx.from,
            to: tx.to,
            success,
            gas_used,
            cumulative_gas_used: 0, // assigned by the block processor
            contract_address: if success { created } else { None },
            logs,
        };

        Ok(ProcessedTransaction {
            receipt,
            gas_used,
            success,
            error: output_error,
        })
    }

    /// Run a transaction under snapshot/revert, discarding all changes.
    pub fn simulate(
        &self,
        state: &mut StateStore,
        tx: &Transaction,
        ctx: &BlockContext,
    ) -> Result<ProcessedTransaction, ValidationError> {
        let snap = state.snapshot();
        let result = self.process(state, tx, ctx);
        state.revert(snap);
        result
    }

    /// Simulated gas usage with a 20% headroom margin.
    pub fn estimate_gas(
        &self,
        state: &mut StateStore,
        tx: &Transaction,
        ctx: &BlockContext,
    ) -> Result<u64, ValidationError> {
        let outcome = self.simulate(state, tx, ctx)?;
        Ok(outcome.gas_used * 120 / 100)
    }

    /// Read-only contract call: executes with the static flag set and
    /// reverts every state change. Returns the call's output data.
    pub fn call_readonly(
        &self,
        state: &mut StateStore,
        from: Address,
        to: Address,
        data: &[u8],
        gas_limit: u64,
        ctx: &BlockContext,
    ) -> (bool, Vec<u8>) {
        let snap = state.snapshot();
        let tx_ctx = TxContext {
            origin: from,
            gas_price: ctx.base_fee,
        };
        let mut vm = Vm::new(state, ctx, tx_ctx);
        let result = vm.call(from, to, 0, data, gas_limit, true);
        state.revert(snap);
        (result.is_success(), result.output)
    }
}
