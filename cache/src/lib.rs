//! Age-counter eviction cache used by each Storage node (spec §4.1).
//!
//! Every `get`/`add` ages all currently-held keys by one; inserting past
//! capacity evicts whichever key has aged the most. This is deliberately
//! O(n) in the cache size: `n` is expected to stay small (default 5), so a
//! linear scan over a `HashMap` is simpler and fast enough.

use std::collections::HashMap;

use async_std::sync::Mutex;

pub struct Cache {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    values: HashMap<String, Vec<u8>>,
    ages: HashMap<String, u64>,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                values: HashMap::new(),
                ages: HashMap::new(),
            }),
        }
    }

    /// Ages all keys, then returns the value for `key` if present.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().await;
        age_all(&mut inner.ages);
        inner.values.get(key).cloned()
    }

    /// Ages all keys, then inserts/refreshes `key`, evicting the oldest
    /// entry first if this would exceed capacity.
    pub async fn add(&self, key: &str, value: Vec<u8>) {
        let mut inner = self.inner.lock().await;
        age_all(&mut inner.ages);

        if inner.values.contains_key(key) {
            inner.values.insert(key.to_string(), value);
            inner.ages.insert(key.to_string(), 0);
            return;
        }

        if inner.values.len() >= self.capacity {
            if let Some(oldest) = oldest_key(&inner.ages) {
                inner.values.remove(&oldest);
                inner.ages.remove(&oldest);
            }
        }

        inner.values.insert(key.to_string(), value);
        inner.ages.insert(key.to_string(), 0);
    }

    /// Removes `key` if present; no-op otherwise.
    pub async fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        inner.values.remove(key);
        inner.ages.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.values.len()
    }
}

fn age_all(ages: &mut HashMap<String, u64>) {
    for age in ages.values_mut() {
        *age += 1;
    }
}

fn oldest_key(ages: &HashMap<String, u64>) -> Option<String> {
    let mut best: Option<(&String, u64)> = None;
    for (k, &age) in ages.iter() {
        match best {
            Some((_, best_age)) if best_age >= age => {}
            _ => best = Some((k, age)),
        }
    }
    best.map(|(k, _)| k.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn basic_get_add() {
        let c = Cache::new(3);
        c.add("a", b"apple".to_vec()).await;
        assert_eq!(c.get("a").await, Some(b"apple".to_vec()));
    }

    #[async_std::test]
    async fn refresh_resets_age() {
        let c = Cache::new(3);
        c.add("a", b"apple".to_vec()).await;
        c.add("b", b"banana".to_vec()).await;
        c.add("c", b"cherry".to_vec()).await;
        c.add("a", b"apricot".to_vec()).await;
        c.add("d", b"date".to_vec()).await;

        assert_eq!(c.get("a").await, Some(b"apricot".to_vec()));
        assert_eq!(c.get("d").await, Some(b"date".to_vec()));
        assert!(c.len().await <= 3);

        // exactly one of {b, c} should have been evicted.
        let b_present = c.get("b").await.is_some();
        let c_present = c.get("c").await.is_some();
        assert!(b_present ^ c_present);
    }

    #[async_std::test]
    async fn capacity_never_exceeded() {
        let c = Cache::new(2);
        c.add("a", b"1".to_vec()).await;
        c.add("b", b"2".to_vec()).await;
        c.add("c", b"3".to_vec()).await;
        assert!(c.len().await <= 2);
        assert_eq!(c.get("c").await, Some(b"3".to_vec()));
    }

    #[async_std::test]
    async fn invalidate_removes_entry() {
        let c = Cache::new(3);
        c.add("a", b"apple".to_vec()).await;
        c.invalidate("a").await;
        assert_eq!(c.get("a").await, None);
        c.invalidate("missing").await;
    }
}
