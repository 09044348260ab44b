//! Record-number and audit-number allocation.
//!
//! A record number binds one entity instance to its own chain. It is reused
//! for every later change to the same `(entity_type, entity_id)`, or minted
//! as `<yyyyMMdd><000001>` with the sequence scoped to the UTC day across
//! the whole change table.
//!
//! Minting reads the day's greatest record number and increments it.
//! `ChangeTrail` runs allocation inside the store's `append`, so the lookup,
//! the mint and the first write of an entity cannot interleave with another
//! writer.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use ledger_contracts::{
    error::{LedgerError, LedgerResult},
    request::{has_text, ChangeRequest},
};

use crate::traits::{ChangeLookup, Clock};

/// `chrono` format of the date prefix.
pub const RECORD_DATE_FORMAT: &str = "%Y%m%d";

/// Width of the zero-padded per-day sequence.
pub const SEQUENCE_WIDTH: usize = 6;

/// Greatest sequence that fits in [`SEQUENCE_WIDTH`] digits.
pub const MAX_SEQUENCE: u64 = 999_999;

/// How a request's record number was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// The caller supplied it.
    Supplied,
    /// An earlier entry for the same entity already carried it.
    Reused,
    /// A new number was minted for a first-time entity.
    Minted,
    /// No entity type to resolve from; validation rejects the request.
    Unresolved,
}

pub struct RecordNumberAllocator {
    clock: Arc<dyn Clock>,
}

impl RecordNumberAllocator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Make sure `request` carries a record number.
    ///
    /// 1. A non-blank caller value is kept unchanged.
    /// 2. A blank entity type leaves the field unset.
    /// 3. A blank entity id is a validation error.
    /// 4. An existing number for the entity is reused.
    /// 5. Otherwise a new one is minted for today's UTC date.
    pub fn ensure_record_number(
        &self,
        lookup: &dyn ChangeLookup,
        request: &mut ChangeRequest,
    ) -> LedgerResult<Allocation> {
        if has_text(request.record_number.as_deref()) {
            return Ok(Allocation::Supplied);
        }

        let Some(entity_id) = resolvable_entity_id(request)? else {
            return Ok(Allocation::Unresolved);
        };

        if let Some(existing) = lookup.find_record_number_for(&request.entity_type, entity_id)? {
            debug!(
                entity_type = %request.entity_type,
                entity_id = %entity_id,
                record_number = %existing,
                "reusing record number"
            );
            request.record_number = Some(existing);
            return Ok(Allocation::Reused);
        }

        let minted = self.mint(lookup)?;
        debug!(
            entity_type = %request.entity_type,
            entity_id = %entity_id,
            record_number = %minted,
            "minted record number"
        );
        request.record_number = Some(minted);
        Ok(Allocation::Minted)
    }

    /// Mint the next record number for the clock's current UTC date.
    ///
    /// Fails with `Persistence` once the day's sequence has reached
    /// [`MAX_SEQUENCE`]; a wider suffix would no longer sort after the
    /// six-digit ones.
    pub fn mint(&self, lookup: &dyn ChangeLookup) -> LedgerResult<String> {
        let prefix = self.clock.now().format(RECORD_DATE_FORMAT).to_string();
        let next = lookup
            .find_latest_record_number_with_prefix(&prefix)?
            .map(|latest| extract_sequence(&latest, &prefix) + 1)
            .unwrap_or(1);
        if next > MAX_SEQUENCE {
            return Err(LedgerError::persistence(format!(
                "record number sequence for {prefix} is exhausted"
            )));
        }
        Ok(format_record_number(&prefix, next))
    }
}

/// The entity id a record number can be resolved from.
///
/// `Ok(None)` when the request needs no resolution (record number supplied
/// or entity type blank); a validation error when the entity id is blank.
pub fn resolvable_entity_id(request: &ChangeRequest) -> LedgerResult<Option<&str>> {
    if has_text(request.record_number.as_deref()) || !has_text(Some(&request.entity_type)) {
        return Ok(None);
    }
    match request.entity_id.as_deref() {
        Some(id) if has_text(Some(id)) => Ok(Some(id)),
        _ => Err(LedgerError::validation(
            "entityId must not be blank when recordNumber is not supplied",
        )),
    }
}

/// Make sure `request` carries an audit number, generating a UUID v4.
pub fn ensure_audit_number(request: &mut ChangeRequest) -> String {
    match request.audit_number.as_deref() {
        Some(number) if has_text(Some(number)) => number.to_string(),
        _ => {
            let generated = Uuid::new_v4().to_string();
            request.audit_number = Some(generated.clone());
            generated
        }
    }
}

/// `prefix` followed by `sequence` zero-padded to six digits.
pub fn format_record_number(prefix: &str, sequence: u64) -> String {
    format!("{prefix}{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// The numeric suffix of `record_number` after `prefix`, or 0 when the
/// number does not carry the prefix or the suffix is not numeric.
pub fn extract_sequence(record_number: &str, prefix: &str) -> u64 {
    record_number
        .strip_prefix(prefix)
        .filter(|suffix| !suffix.is_empty())
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .unwrap_or(0)
}
