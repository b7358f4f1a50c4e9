//! Pass-local book of bootstrap peer addresses.

/// Ordered, append-only list of peer addresses built during one pass.
///
/// Node `i` is planned with a snapshot taken before node `i` is appended, so
/// it only ever sees bootnodes that precede it in the fleet spec.
#[derive(Debug, Default, Clone)]
pub struct PeerAddressBook {
    addresses: Vec<String>,
}

impl PeerAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, address: String) {
        self.addresses.push(address);
    }

    /// Addresses appended so far, in spec order.
    pub fn snapshot(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_preserves_append_order() {
        let mut book = PeerAddressBook::new();
        assert!(book.is_empty());
        book.append("a".into());
        book.append("b".into());
        assert_eq!(book.snapshot(), ["a".to_string(), "b".to_string()]);
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_snapshot_is_a_prefix_of_later_snapshots() {
        let mut book = PeerAddressBook::new();
        book.append("a".into());
        let before = book.snapshot().to_vec();
        book.append("b".into());
        assert_eq!(&book.snapshot()[..before.len()], before.as_slice());
    }
}
