/// Hands out request sequence numbers for one connection, starting at 0.
///
/// Wrapping past `u64::MAX` is not handled.
#[derive(Debug, Default)]
pub struct Sequencer {
    next: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Sequencer::default()
    }

    /// Number of sequence numbers handed out so far.
    pub fn current(&self) -> u64 {
        self.next
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}
