//! Indexer cursor — tracks the current position in the chain.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// The indexer's current position in the chain.
///
/// The cursor only moves forward, one block at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// First block to index when nothing has been indexed yet.
    pub start_block: u64,
    /// Last fully indexed block.
    pub last_indexed_block: Option<u64>,
}

impl Cursor {
    pub fn new(start_block: u64, last_indexed_block: Option<u64>) -> Self {
        Self {
            start_block,
            last_indexed_block,
        }
    }

    /// The next block to process. Saturates at `u64::MAX`.
    pub fn next_block(&self) -> u64 {
        match self.last_indexed_block {
            Some(last) => last.saturating_add(1).max(self.start_block),
            None => self.start_block,
        }
    }

    /// Fails unless `block_number` is exactly [`Cursor::next_block`].
    pub fn check_advance(&self, block_number: u64) -> Result<(), IndexerError> {
        if self.last_indexed_block == Some(u64::MAX) {
            return Err(IndexerError::Other("cursor is already at block u64::MAX".into()));
        }
        let expected = self.next_block();
        if block_number != expected {
            return Err(IndexerError::Other(format!(
                "cursor expected block {expected}, got {block_number}"
            )));
        }
        Ok(())
    }

    /// Mark `block_number` as fully indexed.
    pub fn advance(&mut self, block_number: u64) -> Result<(), IndexerError> {
        self.check_advance(block_number)?;
        self.last_indexed_block = Some(block_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advance() {
        let mut cursor = Cursor::new(100, None);
        assert_eq!(cursor.next_block(), 100);
        cursor.advance(100).unwrap();
        cursor.advance(101).unwrap();
        assert_eq!(cursor.last_indexed_block, Some(101));
        assert_eq!(cursor.next_block(), 102);
    }

    #[test]
    fn cursor_is_monotonic() {
        let mut cursor = Cursor::new(0, Some(10));
        assert!(cursor.advance(10).is_err()); // replay
        assert!(cursor.advance(12).is_err()); // gap
        assert_eq!(cursor.last_indexed_block, Some(10));
        cursor.advance(11).unwrap();
    }

    #[test]
    fn start_block_ahead_of_saved_state() {
        let cursor = Cursor::new(500, Some(123));
        assert_eq!(cursor.next_block(), 500);
    }

    #[test]
    fn saturated_cursor_does_not_overflow() {
        let mut cursor = Cursor::new(0, Some(u64::MAX));
        assert_eq!(cursor.next_block(), u64::MAX);
        assert!(cursor.advance(u64::MAX).is_err());
        assert_eq!(cursor.last_indexed_block, Some(u64::MAX));

        let mut cursor = Cursor::new(0, Some(u64::MAX - 1));
        cursor.advance(u64::MAX).unwrap();
        assert!(cursor.advance(u64::MAX).is_err());
    }
}
