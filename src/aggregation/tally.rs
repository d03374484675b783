//! Running vote counts per distinct value

use serde::Serialize;

/// Votes for one distinct value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyEntry<K> {
    pub value: K,
    /// Always at least 1
    pub count: u32,
    pub first_seen_at_frame: u64,
    pub last_seen_at_frame: u64,
}

/// Vote counts kept in first-seen order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally<K> {
    entries: Vec<TallyEntry<K>>,
}

impl<K> Default for Tally<K> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<K: PartialEq> Tally<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one vote for `value` seen at `frame`
    pub fn record(&mut self, value: K, frame: u64) -> &TallyEntry<K> {
        let index = match self.entries.iter().position(|e| e.value == value) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.count += 1;
                entry.last_seen_at_frame = frame;
                index
            }
            None => {
                self.entries.push(TallyEntry {
                    value,
                    count: 1,
                    first_seen_at_frame: frame,
                    last_seen_at_frame: frame,
                });
                self.entries.len() - 1
            }
        };
        &self.entries[index]
    }

    /// Highest count; ties go to the value seen first
    pub fn leader(&self) -> Option<&TallyEntry<K>> {
        rank(self.entries.iter())
    }

    /// Leader among the values with at least `threshold` votes
    pub fn leader_at_least(&self, threshold: u32) -> Option<&TallyEntry<K>> {
        rank(self.entries.iter().filter(|e| e.count >= threshold))
    }

    pub fn entries(&self) -> &[TallyEntry<K>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn rank<'a, K: 'a>(entries: impl Iterator<Item = &'a TallyEntry<K>>) -> Option<&'a TallyEntry<K>> {
    entries.fold(None, |best, entry| match best {
        Some(b)
            if b.count > entry.count
                || (b.count == entry.count && b.first_seen_at_frame <= entry.first_seen_at_frame) =>
        {
            Some(b)
        }
        _ => Some(entry),
    })
}
