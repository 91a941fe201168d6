/// Fixed pool of desk slots.
///
/// A session holds at most one slot and a slot holds at most one session.
/// Reservation is a linear scan for the first free slot.
#[derive(Debug, Clone)]
pub struct DeskPool {
    slots: Vec<Option<String>>,
}

impl DeskPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot held by `session_id`, reserving the first free one if needed.
    /// `None` when the pool is full.
    pub fn reserve(&mut self, session_id: &str) -> Option<usize> {
        if let Some(slot) = self.slot_of(session_id) {
            return Some(slot);
        }
        let free = self.slots.iter().position(Option::is_none)?;
        self.slots[free] = Some(session_id.to_string());
        Some(free)
    }

    pub fn release(&mut self, session_id: &str) -> Option<usize> {
        let slot = self.slot_of(session_id)?;
        self.slots[slot] = None;
        Some(slot)
    }

    pub fn slot_of(&self, session_id: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_deref() == Some(session_id))
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}
