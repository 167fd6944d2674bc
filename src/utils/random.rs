//! Number source for ticket and winning numbers.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::Rng;

use crate::model::{MAX_TICKET_NUMBER, MIN_TICKET_NUMBER};

/// Uniform draws over the ticket number space.
pub trait NumberSource: Send + Sync {
    /// A number uniformly distributed in `[MIN_TICKET_NUMBER, MAX_TICKET_NUMBER]`.
    fn draw(&self) -> u32;
}

/// Thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl NumberSource for ThreadRngSource {
    fn draw(&self) -> u32 {
        rand::rng().random_range(MIN_TICKET_NUMBER..=MAX_TICKET_NUMBER)
    }
}

/// Replays a fixed sequence, then falls back to the RNG.
#[derive(Debug, Default)]
pub struct ScriptedNumbers {
    queue: Mutex<VecDeque<u32>>,
}

impl ScriptedNumbers {
    pub fn new(numbers: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queue: Mutex::new(numbers.into_iter().collect()),
        }
    }

    pub fn push(&self, number: u32) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push_back(number);
    }
}

impl NumberSource for ScriptedNumbers {
    fn draw(&self) -> u32 {
        let next = self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        next.unwrap_or_else(|| ThreadRngSource.draw())
    }
}
