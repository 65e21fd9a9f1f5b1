//! A block the hero can push cell by cell, with an optional move budget.

/// One push displaces the block by a full cell.
pub const BLOCK_MOVE_STEP: i32 = 16;
/// Ticks the hero must keep pushing before the push takes effect.
pub const BLOCK_PUSH_DELAY_TICKS: u32 = 12;

#[derive(Debug, Clone)]
pub struct Block {
    pushable: bool,
    /// None means unlimited moves.
    max_moves: Option<u32>,
    moves_remaining: Option<u32>,
}

impl Block {
    pub fn new(pushable: bool, max_moves: Option<u32>) -> Self {
        Self {
            pushable,
            max_moves,
            moves_remaining: max_moves,
        }
    }

    /// Whether this block is pushable by configuration. This stays true
    /// even once the move budget is exhausted; exhaustion only makes
    /// pushes yield no displacement.
    pub fn is_pushable(&self) -> bool {
        self.pushable
    }

    pub fn max_moves(&self) -> Option<u32> {
        self.max_moves
    }

    pub fn moves_remaining(&self) -> Option<u32> {
        self.moves_remaining
    }

    pub fn has_moves_left(&self) -> bool {
        match self.moves_remaining {
            Some(remaining) => remaining > 0,
            None => true,
        }
    }

    /// Consumes one move from the budget. Call only after the
    /// destination cell has been confirmed free.
    pub fn record_move(&mut self) {
        if let Some(remaining) = self.moves_remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    /// Restores the budget to its initial value (used by switch-driven
    /// block resets and by save restore).
    pub fn reset_moves(&mut self) {
        self.moves_remaining = self.max_moves;
    }

    pub(crate) fn restore_moves_remaining(&mut self, moves_remaining: Option<u32>) {
        self.moves_remaining = moves_remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exhaustion_keeps_pushable_configuration() {
        let mut block = Block::new(true, Some(2));
        assert!(block.has_moves_left());
        block.record_move();
        block.record_move();
        assert!(!block.has_moves_left());
        // Configuration predicate is unchanged.
        assert!(block.is_pushable());
        // Further records do not underflow.
        block.record_move();
        assert_eq!(block.moves_remaining(), Some(0));
    }

    #[test]
    fn unlimited_blocks_never_exhaust() {
        let mut block = Block::new(true, None);
        for _ in 0..100 {
            block.record_move();
        }
        assert!(block.has_moves_left());
    }

    #[test]
    fn reset_restores_initial_budget() {
        let mut block = Block::new(true, Some(3));
        block.record_move();
        block.record_move();
        block.reset_moves();
        assert_eq!(block.moves_remaining(), Some(3));
    }
}
