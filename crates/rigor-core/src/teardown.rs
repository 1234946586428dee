//! Per-case teardown block queue.

use rigor_proto::TestResult;

/// A block registered with `add_teardown_block`, run after the test body.
pub type TeardownBlock = Box<dyn FnOnce() -> TestResult + Send>;

/// Misuse of the teardown queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TeardownError {
    #[error(
        "API violation -- attempting to add a teardown block after teardown blocks have been dequeued"
    )]
    AlreadyFinalized,

    #[error("API violation -- attempting to run teardown blocks after they've already run")]
    FinalizedTwice,
}

/// Teardown blocks of one test case.
///
/// Blocks are appended while the case runs and dequeued exactly once, newest
/// first.
#[derive(Default)]
pub struct TeardownBlocks {
    blocks: Vec<TeardownBlock>,
    finalized: bool,
}

impl TeardownBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, block: TeardownBlock) -> Result<(), TeardownError> {
        if self.finalized {
            return Err(TeardownError::AlreadyFinalized);
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Closes the queue and returns the blocks in execution (LIFO) order.
    pub fn finalize(&mut self) -> Result<Vec<TeardownBlock>, TeardownError> {
        if self.finalized {
            return Err(TeardownError::FinalizedTwice);
        }
        self.finalized = true;
        let mut blocks = std::mem::take(&mut self.blocks);
        blocks.reverse();
        Ok(blocks)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl std::fmt::Debug for TeardownBlocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownBlocks")
            .field("pending", &self.blocks.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}
