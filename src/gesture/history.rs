use std::collections::VecDeque;

/// Fixed-capacity FIFO window; pushing into a full window evicts the oldest entry.
#[derive(Clone, Debug)]
pub struct SlidingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> SlidingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Copy> SlidingWindow<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().copied().collect()
    }
}

/// Most frequent value, oldest to newest.
///
/// Counts are tallied in first-appearance order and only a strictly greater
/// count replaces the current leader, so on a tie the value that entered the
/// tally first wins: `[B, A, A, B]` yields `B`.
pub fn most_common<'a, T, I>(values: I) -> Option<T>
where
    T: PartialEq + Copy + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut tally: Vec<(T, usize)> = Vec::new();
    for value in values {
        match tally.iter_mut().find(|(seen, _)| seen == value) {
            Some((_, count)) => *count += 1,
            None => tally.push((*value, 1)),
        }
    }

    let mut best: Option<(T, usize)> = None;
    for (value, count) in tally {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value)
}
