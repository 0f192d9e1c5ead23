//! Generation-checked slab used to key per-task bookkeeping.
//!
//! Slots are recycled through a free list. Every slot carries a generation
//! counter that is bumped on removal, so a stale [`Key`] never reaches the
//! value that later reuses its slot.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

pub(crate) struct Slab<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Slab<T> {
    pub(crate) fn new() -> Self {
        Self::with_capacity(0)
    }

    pub(crate) fn with_capacity(size: usize) -> Self {
        let slots = (0..size).map(|_| Slot::Vacant { generation: 0 }).collect();
        // Reversed so that low indices are handed out first.
        let free = (0..size).rev().collect();

        Self {
            slots,
            free,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn insert(&mut self, value: T) -> Key {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.slots.len();
            let new_len = if len == 0 { 4 } else { 2 * len };

            self.slots
                .extend((len..new_len).map(|_| Slot::Vacant { generation: 0 }));
            self.free.extend(((len + 1)..new_len).rev());

            len
        };

        let generation = match self.slots[index] {
            Slot::Vacant { generation } => generation,
            Slot::Occupied { .. } => unreachable!("free list pointed at an occupied slot"),
        };

        self.slots[index] = Slot::Occupied { generation, value };
        self.len += 1;

        Key {
            index: index as u32,
            generation,
        }
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.slots.get(key.index as usize)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.slots.get_mut(key.index as usize)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let index = key.index as usize;

        if !self.contains(key) {
            return None;
        }

        let next = Slot::Vacant {
            generation: key.generation.wrapping_add(1),
        };

        match std::mem::replace(&mut self.slots[index], next) {
            Slot::Occupied { value, .. } => {
                self.free.push(index);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut slab = Slab::new();
        let a = slab.insert("a");
        let b = slab.insert("b");

        assert_eq!(slab.get(a), Some(&"a"));
        assert_eq!(slab.get(b), Some(&"b"));
        assert_eq!(slab.len(), 2);
    }

    #[test]
    fn stale_key_misses_reused_slot() {
        let mut slab = Slab::new();
        let first = slab.insert(1);

        assert_eq!(slab.remove(first), Some(1));

        let second = slab.insert(2);

        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert_eq!(slab.get(first), None);
        assert_eq!(slab.remove(first), None);
        assert_eq!(slab.get(second), Some(&2));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut slab = Slab::with_capacity(2);
        let keys: Vec<_> = (0..10).map(|i| slab.insert(i)).collect();

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(slab.get(*key), Some(&i));
        }
        assert_eq!(slab.len(), 10);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut slab = Slab::new();
        let key = slab.insert(String::from("x"));

        slab.get_mut(key).unwrap().push('y');

        assert_eq!(slab.get(key).map(String::as_str), Some("xy"));
    }
}
