//! Transaction execution (DeliverTx).

use tracing::debug;

use kestrel_core::{Transaction, TxKind};
use kestrel_storage::StateStore;

use crate::error::TxError;
use crate::validators::{resolve, PendingValidatorUpdates};

/// Apply a transaction to the working view.
///
/// A failed transaction leaves the store and the pending log untouched;
/// every branch performs its single mutation last.
pub fn apply<S>(
    tx: &Transaction,
    store: &mut S,
    pending: &mut PendingValidatorUpdates,
) -> Result<(), TxError>
where
    S: StateStore + ?Sized,
{
    match tx.kind() {
        TxKind::KeyValueWrite => {
            let kv = tx.to_kv_write()?;
            store.set(kv.key.encode(), kv.value)?;
        }
        TxKind::AccountRegister => {
            let account = tx.to_account()?;
            // Overwrites any earlier power for the same key.
            store.set(account.key().encode(), account.encode_value())?;
            debug!(account = %account.pub_key, power = account.power, "registered account");
        }
        TxKind::ValidatorChange => {
            let record = tx.to_validator()?;
            resolve(&record, store)?;
            pending.push(record);
        }
        TxKind::Unknown => return Err(TxError::encoding("unknown transaction type")),
    }
    Ok(())
}
