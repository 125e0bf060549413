/// First-fit free list over a linear byte range

use crate::utils::align;

/// One unallocated region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub offset: u64,
    pub size: u64,
}

impl FreeBlock {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Result of a successful search: which block, and where inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub index: usize,
    pub offset: u64,
}

/// Free blocks in iteration order.
///
/// Searches are strictly first-fit. The list is re-sorted by offset on every
/// merge, so after a merge first-fit is also lowest-address-fit.
#[derive(Debug, Clone, Default)]
pub struct FreeList {
    blocks: Vec<FreeBlock>,
}

impl FreeList {
    /// Free list covering `[0, size)`
    pub fn new(size: u64) -> Self {
        let mut list = Self::default();
        list.push(FreeBlock { offset: 0, size });
        list
    }

    pub fn blocks(&self) -> &[FreeBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of all free block sizes
    pub fn total_free(&self) -> u64 {
        self.blocks.iter().map(|block| block.size).sum()
    }

    /// Size of the largest free block (0 when full)
    pub fn largest_block(&self) -> u64 {
        self.blocks.iter().map(|block| block.size).max().unwrap_or(0)
    }

    /// Append a block (empty blocks are ignored)
    pub fn push(&mut self, block: FreeBlock) {
        if block.size > 0 {
            self.blocks.push(block);
        }
    }

    /// First block that still holds `size` bytes once its start is aligned
    pub fn find_first_fit(&self, size: u64, alignment: u64) -> Option<Placement> {
        self.blocks.iter().enumerate().find_map(|(index, block)| {
            let offset = align(block.offset, alignment);
            if offset + size <= block.end() {
                Some(Placement { index, offset })
            } else {
                None
            }
        })
    }

    /// Carve `size` bytes out of the placed block.
    ///
    /// The alignment padding before the allocation and the remainder after it
    /// go back to the list, then the list is merged.
    pub fn take(&mut self, placement: Placement, size: u64) -> u64 {
        let block = self.blocks.remove(placement.index);
        debug_assert!(placement.offset >= block.offset && placement.offset + size <= block.end());

        self.push(FreeBlock {
            offset: block.offset,
            size: placement.offset - block.offset,
        });
        self.push(FreeBlock {
            offset: placement.offset + size,
            size: block.end() - (placement.offset + size),
        });
        self.merge();
        placement.offset
    }

    /// Sort by offset and coalesce touching blocks
    pub fn merge(&mut self) {
        if self.blocks.len() < 2 {
            return;
        }
        self.blocks.sort_unstable_by_key(|block| block.offset);

        let mut merged: Vec<FreeBlock> = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end() == block.offset => last.size += block.size,
                _ => merged.push(block),
            }
        }
        self.blocks = merged;
    }

    /// Whether two blocks touch (should never hold after a merge)
    pub fn has_adjacent_blocks(&self) -> bool {
        let mut sorted = self.blocks.clone();
        sorted.sort_unstable_by_key(|block| block.offset);
        sorted.windows(2).any(|pair| pair[0].end() == pair[1].offset)
    }
}

#[cfg(test)]
#[path = "free_list_tests.rs"]
mod tests;
