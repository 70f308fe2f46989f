//! Round-robin load balancing strategy.

use std::sync::{Arc, Mutex, PoisonError};

use crate::load_balancer::{origin::Origin, LoadBalancer};

/// Round-robin selector.
///
/// The cursor is read and advanced under one lock, so concurrent callers see
/// a single total order of selections. It stays below the pool length, so
/// there is no wraparound skew after `usize::MAX` calls.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, origins: &[Arc<Origin>]) -> Option<Arc<Origin>> {
        if origins.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let index = *cursor % origins.len();
        *cursor = (index + 1) % origins.len();
        Some(origins[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pool(addrs: &[&str]) -> Vec<Arc<Origin>> {
        addrs
            .iter()
            .map(|a| Arc::new(Origin::parse(a).unwrap()))
            .collect()
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let origins = pool(&["127.0.0.1:8080", "127.0.0.1:8081"]);

        let s1 = lb.next_server(&origins).unwrap();
        assert_eq!(s1.authority(), "127.0.0.1:8080");

        let s2 = lb.next_server(&origins).unwrap();
        assert_eq!(s2.authority(), "127.0.0.1:8081");

        let s3 = lb.next_server(&origins).unwrap();
        assert_eq!(s3.authority(), "127.0.0.1:8080");
    }

    #[test]
    fn cycles_in_configured_order() {
        let lb = RoundRobin::new();
        let origins = pool(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);

        let picked: Vec<_> = (0..7)
            .map(|_| lb.next_server(&origins).unwrap().authority().to_string())
            .collect();
        assert_eq!(
            picked,
            [
                "10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1"
            ]
            .map(|h| format!("{}:80", h))
        );
    }

    #[test]
    fn single_origin_always_selected() {
        let lb = RoundRobin::new();
        let origins = pool(&["127.0.0.1:7000"]);
        for _ in 0..5 {
            assert_eq!(lb.next_server(&origins).unwrap().authority(), "127.0.0.1:7000");
        }
    }

    #[test]
    fn empty_pool_yields_none() {
        assert!(RoundRobin::new().next_server(&[]).is_none());
    }

    #[test]
    fn concurrent_selection_is_fair() {
        let lb = Arc::new(RoundRobin::new());
        let origins = Arc::new(pool(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let lb = lb.clone();
                let origins = origins.clone();
                std::thread::spawn(move || {
                    (0..300)
                        .map(|_| lb.next_server(&origins).unwrap().authority().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for authority in handle.join().unwrap() {
                *counts.entry(authority).or_default() += 1;
            }
        }

        // 1800 selections over 3 origins: every full cycle visits each once.
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&c| c == 600));
    }
}
