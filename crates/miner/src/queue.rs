use std::collections::{HashSet, VecDeque};

/// Per-instance frontier. Every URL is mined at most once; discovered links
/// are capped separately from configured and seeded URLs.
pub(crate) struct UrlQueue {
    pending: VecDeque<String>,
    seen: HashSet<String>,
    discovered: usize,
    max_discovered: usize,
}

impl UrlQueue {
    pub(crate) fn new(max_discovered: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            seen: HashSet::new(),
            discovered: 0,
            max_discovered,
        }
    }

    /// Enqueue a configured or seeded URL. Returns `false` for duplicates.
    pub(crate) fn push(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if !self.seen.insert(url.clone()) {
            return false;
        }
        self.pending.push_back(url);
        true
    }

    /// Enqueue a link found on a mined page, while under the discovery cap.
    pub(crate) fn push_discovered(&mut self, url: impl Into<String>) -> bool {
        if self.discovered >= self.max_discovered {
            return false;
        }
        let added = self.push(url);
        if added {
            self.discovered += 1;
        }
        added
    }

    pub(crate) fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_and_caps_discovery() {
        let mut q = UrlQueue::new(2);
        assert!(q.push("https://a.test/"));
        assert!(!q.push("https://a.test/"));
        assert!(!q.push_discovered("https://a.test/"));
        assert!(q.push_discovered("https://a.test/1"));
        assert!(q.push_discovered("https://a.test/2"));
        assert!(!q.push_discovered("https://a.test/3"));
        // seeds are not subject to the discovery cap
        assert!(q.push("https://a.test/4"));

        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, [
            "https://a.test/",
            "https://a.test/1",
            "https://a.test/2",
            "https://a.test/4"
        ]);
    }
}
