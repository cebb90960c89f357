//! Contract of the relational store the backup manager reads from and writes to.

use crate::envelope::SerializedRow;
use crate::groups::RecordGroup;
use crate::utils::errors::Result;

/// Relational storage seen through record groups.
///
/// Implementations report failures as [`BackupError::Store`](crate::BackupError::Store)
/// so callers can downgrade them to warnings where the operation allows it.
pub trait RecordStore {
    /// Serialize every row of `group`, primary key order.
    fn dump_group(&self, group: RecordGroup) -> Result<Vec<SerializedRow>>;

    /// Insert or update one row of `group`.
    fn persist_row(&self, group: RecordGroup, row: &SerializedRow) -> Result<()>;

    /// Approximate on-disk size of the store in bytes.
    fn approximate_size(&self) -> Result<u64>;

    /// Cheap round-trip proving the store answers.
    fn ping(&self) -> Result<()>;
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn dump_group(&self, group: RecordGroup) -> Result<Vec<SerializedRow>> {
        (**self).dump_group(group)
    }

    fn persist_row(&self, group: RecordGroup, row: &SerializedRow) -> Result<()> {
        (**self).persist_row(group, row)
    }

    fn approximate_size(&self) -> Result<u64> {
        (**self).approximate_size()
    }

    fn ping(&self) -> Result<()> {
        (**self).ping()
    }
}
