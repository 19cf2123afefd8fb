//! Random interleaving of two derived streams
//!
//! The discriminator pipeline derives two elements from every source image
//! (the real image and its bicubic reconstruction). [`PairSampler`] splits
//! incoming pairs into two queues and draws from them at random, so every
//! upstream element contributes exactly once to each side. Within a side
//! the upstream order is kept. Draining with [`PairSampler::finish`] at the
//! end of an epoch keeps both labels balanced per epoch.

use rand::rngs::StdRng;
use rand::Rng;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Push-based random sampler over two queues fed in lockstep
pub struct PairSampler<T> {
    left: VecDeque<T>,
    right: VecDeque<T>,
    /// Side drawn but not yet served because its queue was empty
    pending: Option<Side>,
    rng: StdRng,
}

impl<T> PairSampler<T> {
    /// Draws from both sides with equal probability
    pub fn new(rng: StdRng) -> Self {
        Self {
            left: VecDeque::new(),
            right: VecDeque::new(),
            pending: None,
            rng,
        }
    }

    /// Feed one upstream pair
    pub fn push(&mut self, left: T, right: T) {
        self.left.push_back(left);
        self.right.push_back(right);
    }

    /// Next element if the drawn side has one queued.
    ///
    /// Returns `None` when more upstream input is needed; the draw is kept
    /// so that refilling does not bias the sampling.
    pub fn next_ready(&mut self) -> Option<T> {
        let side = match self.pending.take() {
            Some(side) => side,
            None => self.draw(),
        };
        match self.queue(side).pop_front() {
            Some(item) => Some(item),
            None => {
                self.pending = Some(side);
                None
            }
        }
    }

    /// Next element once upstream is exhausted; falls back to the other side
    pub fn finish(&mut self) -> Option<T> {
        if let Some(item) = self.next_ready() {
            return Some(item);
        }
        let side = self.pending.take().unwrap_or(Side::Left);
        let other = match side {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        };
        self.queue(other).pop_front()
    }

    fn draw(&mut self) -> Side {
        if self.rng.gen_bool(0.5) {
            Side::Left
        } else {
            Side::Right
        }
    }

    fn queue(&mut self, side: Side) -> &mut VecDeque<T> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}
