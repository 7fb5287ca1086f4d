use crate::conversation::{Message, Role};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Number of characters of the last user message that take part in a key
pub const KEY_CONTENT_CHARS: usize = 50;

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// `(request timestamp, last user content prefix)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    timestamp: i64,
    content: String,
}

impl CacheKey {
    pub fn new(timestamp: i64, messages: &[Message]) -> Self {
        let content = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.chars().take(KEY_CONTENT_CHARS).collect())
            .unwrap_or_default();
        Self { timestamp, content }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Bounded, expiring map used to answer repeated identical requests
pub struct RequestCache<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    order: VecDeque<CacheKey>,
    capacity: usize,
    clock: Box<dyn Clock>,
}

impl<V: Clone> RequestCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Box::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Box<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            clock,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        self.purge_expired();
        self.entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or replace an entry; the oldest entry is evicted when full
    pub fn insert(&mut self, key: CacheKey, value: V, ttl: Duration) {
        self.purge_expired();

        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else {
            while self.entries.len() >= self.capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }

        let expires_at = self.clock.now() + ttl;
        self.order.push_back(key.clone());
        self.entries.insert(key, Entry { value, expires_at });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&mut self) {
        let now = self.clock.now();
        let entries = &mut self.entries;
        entries.retain(|_, e| e.expires_at > now);
        self.order.retain(|k| entries.contains_key(k));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<Instant>>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    fn key(ts: i64) -> CacheKey {
        CacheKey::new(ts, &[Message::user("hello")])
    }

    #[test]
    fn test_key_truncates_last_user_message() {
        let long = "x".repeat(80);
        let messages = vec![Message::user(long), Message::assistant("reply")];
        let key = CacheKey::new(7, &messages);
        assert_eq!(key.content.chars().count(), KEY_CONTENT_CHARS);
        assert_eq!(key.timestamp, 7);
    }

    #[test]
    fn test_entries_expire() {
        let clock = ManualClock(Arc::new(Mutex::new(Instant::now())));
        let mut cache = RequestCache::with_clock(4, Box::new(clock.clone()));

        cache.insert(key(1), "a", Duration::from_secs(30));
        clock.advance(Duration::from_secs(29));
        assert_eq!(cache.get(&key(1)), Some("a"));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get(&key(1)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let mut cache = RequestCache::new(2);
        cache.insert(key(1), 1, Duration::from_secs(30));
        cache.insert(key(2), 2, Duration::from_secs(30));
        cache.insert(key(3), 3, Duration::from_secs(30));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1)), None);
        assert_eq!(cache.get(&key(3)), Some(3));
    }
}
