//! Admission checks (CheckTx).
//!
//! Admission is a read-only check against the latest committed version. It
//! takes `&` references only, so it cannot mutate the store or the pending
//! validator log. Its verdict is advisory: execution has the final word.

use std::sync::Arc;

use tracing::debug;

use kestrel_core::{SignatureVerifier, StateKey, Transaction, TxKind};
use kestrel_storage::StateReader;

use crate::error::TxError;
use crate::validators::GenesisAuthorization;

/// Validates transactions before they are proposed.
#[derive(Clone)]
pub struct AdmissionChecker {
    verifier: Option<Arc<dyn SignatureVerifier>>,
}

impl std::fmt::Debug for AdmissionChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionChecker")
            .field("verifies_signatures", &self.verifier.is_some())
            .finish()
    }
}

impl AdmissionChecker {
    /// Check signatures with `verifier`.
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            verifier: Some(verifier),
        }
    }

    /// Skip signature verification. Every other rule still applies.
    pub fn without_signatures() -> Self {
        Self { verifier: None }
    }

    /// Run the admission rules in order.
    pub fn check<R>(
        &self,
        tx: &Transaction,
        state: &R,
        genesis: &GenesisAuthorization,
    ) -> Result<(), TxError>
    where
        R: StateReader + ?Sized,
    {
        let result = self.check_inner(tx, state, genesis);
        if let Err(err) = &result {
            debug!(kind = ?tx.kind(), code = %err.code(), "rejected transaction: {}", err);
        }
        result
    }

    fn check_inner<R>(
        &self,
        tx: &Transaction,
        state: &R,
        genesis: &GenesisAuthorization,
    ) -> Result<(), TxError>
    where
        R: StateReader + ?Sized,
    {
        if tx.is_signed() {
            self.check_signer(tx, state)?;
        }

        match tx.kind() {
            TxKind::KeyValueWrite => {
                tx.to_kv_write()?;
            }
            TxKind::AccountRegister => {
                require_genesis_signer(tx, genesis)?;
                tx.to_account()?;
            }
            TxKind::ValidatorChange => {
                require_genesis_signer(tx, genesis)?;
                tx.to_validator()?;
            }
            TxKind::Unknown => return Err(TxError::encoding("unknown transaction type")),
        }
        Ok(())
    }

    fn check_signer<R>(&self, tx: &Transaction, state: &R) -> Result<(), TxError>
    where
        R: StateReader + ?Sized,
    {
        let signer = tx
            .signer()
            .ok_or_else(|| TxError::unauthorized("unknown signer account"))?;

        if !state.has(&StateKey::account(signer).encode())? {
            return Err(TxError::unauthorized(format!(
                "unknown signer account {}",
                signer.to_hex_upper()
            )));
        }

        if let (Some(verifier), Some(signature)) = (&self.verifier, tx.signature()) {
            verifier
                .verify(signer, tx.payload(), signature)
                .map_err(|e| TxError::unauthorized(format!("bad signature: {}", e.message())))?;
        }
        Ok(())
    }
}

fn require_genesis_signer(tx: &Transaction, genesis: &GenesisAuthorization) -> Result<(), TxError> {
    match tx.signer() {
        Some(signer) if genesis.is_authorized(signer) => Ok(()),
        Some(signer) => Err(TxError::unauthorized(format!(
            "signer {} is not a genesis validator",
            signer.to_hex_upper()
        ))),
        None => Err(TxError::unauthorized("transaction must be signed by a genesis validator")),
    }
}
