//! Round-robin member selection.
//!
//! A balancer owns a fixed item list and a cursor. Address changes build
//! a new balancer rather than editing the list, so a pick never races a
//! resize.

use std::sync::atomic::{AtomicUsize, Ordering};

use reach_core::ServerAddress;

/// Rotates over a fixed list; picks are lock-free.
#[derive(Debug)]
pub struct RoundRobinBalancer<T> {
    items: Vec<T>,
    cursor: AtomicUsize,
}

/// The balancer the request client routes through.
pub type AddressPicker = RoundRobinBalancer<ServerAddress>;

impl<T> RoundRobinBalancer<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next item in rotation, `None` if the list is empty.
    pub fn pick(&self) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(turn % self.items.len())
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for RoundRobinBalancer<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_core::RequestSchema;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    fn addr(host: &str) -> ServerAddress {
        ServerAddress {
            host: host.to_string(),
            port: 8080,
            schema: RequestSchema::Http,
        }
    }

    #[test]
    fn picks_wrap_around_the_list() {
        let picker = AddressPicker::new(vec![addr("10.0.0.1"), addr("10.0.0.2")]);
        let picked: Vec<&str> = (0..5)
            .map(|_| picker.pick().unwrap().host.as_str())
            .collect();
        assert_eq!(
            picked,
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.2", "10.0.0.1"]
        );
        assert_eq!(picker.len(), 2);
    }

    #[test]
    fn empty_list_never_advances() {
        let picker: AddressPicker = RoundRobinBalancer::default();
        assert!(picker.is_empty());
        assert!(picker.pick().is_none());
        assert!(picker.pick().is_none());
        assert!(picker.items().is_empty());
    }

    #[test]
    fn concurrent_picks_spread_evenly() {
        let balancer = Arc::new(RoundRobinBalancer::new(vec!["a", "b", "c"]));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let balancer = balancer.clone();
                thread::spawn(move || {
                    (0..50)
                        .map(|_| *balancer.pick().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for handle in handles {
            for item in handle.join().unwrap() {
                *counts.entry(item).or_default() += 1;
            }
        }
        // 300 picks over 3 items: each lands exactly 100 times.
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == 100));
    }
}
