//! Double-buffered state.
//!
//! A pass reads the current slot and writes the other; [`PingPong::swap`] then
//! flips which slot is current. The device backend holds its position and
//! sort buffers this way so no pass reads and writes the same allocation.

/// Two slots of `T` and the index of the one being read.
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    slots: [T; 2],
    read: usize,
}

impl<T> PingPong<T> {
    /// Start reading from `first`.
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            read: 0,
        }
    }

    /// Slot holding the current data.
    pub fn read(&self) -> &T {
        &self.slots[self.read]
    }

    /// Slot the next pass writes into.
    pub fn write(&self) -> &T {
        &self.slots[1 - self.read]
    }

    /// Make the written slot current.
    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_exchanges_roles() {
        let mut buffers = PingPong::new("a", "b");
        assert_eq!((*buffers.read(), *buffers.write()), ("a", "b"));
        buffers.swap();
        assert_eq!((*buffers.read(), *buffers.write()), ("b", "a"));
        buffers.swap();
        assert_eq!(*buffers.read(), "a");
    }

    #[test]
    fn even_number_of_swaps_restores_first_slot() {
        let mut buffers = PingPong::new(vec![1, 2, 3], vec![0; 3]);
        for _ in 0..4 {
            buffers.swap();
        }
        assert_eq!(buffers.read(), &vec![1, 2, 3]);
        assert_eq!(buffers.write(), &vec![0; 3]);
    }
}
