//! Progress reporting for bank operations

/// Callback for progress reporting during erase, program and read
pub trait BankProgress {
    /// Called when starting to erase `sectors` sectors
    fn erasing(&mut self, sectors: usize);

    /// Called after each sector is erased
    fn erase_progress(&mut self, sectors_erased: usize);

    /// Called when starting to write `total_bytes`
    fn writing(&mut self, total_bytes: usize);

    /// Called after each chunk is written
    fn write_progress(&mut self, bytes_written: usize);

    /// Called when starting to read `total_bytes`
    fn reading(&mut self, total_bytes: usize);

    /// Called after each chunk is read
    fn read_progress(&mut self, bytes_read: usize);

    /// Called when the operation is complete
    fn complete(&mut self);
}

/// A no-op progress reporter
pub struct NoProgress;

impl BankProgress for NoProgress {
    fn erasing(&mut self, _sectors: usize) {}
    fn erase_progress(&mut self, _sectors_erased: usize) {}
    fn writing(&mut self, _total_bytes: usize) {}
    fn write_progress(&mut self, _bytes_written: usize) {}
    fn reading(&mut self, _total_bytes: usize) {}
    fn read_progress(&mut self, _bytes_read: usize) {}
    fn complete(&mut self) {}
}
