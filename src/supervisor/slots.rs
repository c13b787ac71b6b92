use std::collections::{BTreeMap, HashMap};

/// Numbered seats per worker template, each vacant (0) or held by one pid.
///
/// A template's vector may be longer than its capacity after a reload shrank
/// it; the extra seats are retired as their processes exit.
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: BTreeMap<String, Vec<i32>>,
    capacity: HashMap<String, usize>,
    owners: HashMap<i32, (String, usize)>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of seats for `name`, growing with vacancies.
    pub fn resize(&mut self, name: &str, count: usize) {
        self.capacity.insert(name.to_string(), count);
        let seats = self.slots.entry(name.to_string()).or_default();
        if seats.len() < count {
            seats.resize(count, 0);
        }
        Self::trim(seats, count);
        if count == 0 && seats.is_empty() {
            self.slots.remove(name);
            self.capacity.remove(name);
        }
    }

    /// Vacant seats that should be filled.
    pub fn vacancies(&self, name: &str) -> Vec<usize> {
        let capacity = self.capacity(name);
        self.slots
            .get(name)
            .map(|seats| {
                seats
                    .iter()
                    .take(capacity)
                    .enumerate()
                    .filter(|(_, pid)| **pid == 0)
                    .map(|(slot, _)| slot)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn occupy(&mut self, name: &str, slot: usize, pid: i32) {
        if let Some(seat) = self.slots.get_mut(name).and_then(|seats| seats.get_mut(slot)) {
            *seat = pid;
            self.owners.insert(pid, (name.to_string(), slot));
        }
    }

    /// Frees the seat held by `pid` and returns where it was.
    pub fn release(&mut self, pid: i32) -> Option<(String, usize)> {
        let (name, slot) = self.owners.remove(&pid)?;
        let capacity = self.capacity(&name);
        if let Some(seats) = self.slots.get_mut(&name) {
            if let Some(seat) = seats.get_mut(slot) {
                *seat = 0;
            }
            Self::trim(seats, capacity);
            if seats.is_empty() && capacity == 0 {
                self.slots.remove(&name);
                self.capacity.remove(&name);
            }
        }
        Some((name, slot))
    }

    pub fn owner(&self, pid: i32) -> Option<(&str, usize)> {
        self.owners.get(&pid).map(|(name, slot)| (name.as_str(), *slot))
    }

    pub fn capacity(&self, name: &str) -> usize {
        self.capacity.get(name).copied().unwrap_or(0)
    }

    pub fn occupied(&self, name: &str) -> usize {
        self.slots
            .get(name)
            .map(|seats| seats.iter().filter(|pid| **pid != 0).count())
            .unwrap_or(0)
    }

    pub fn pids(&self) -> Vec<i32> {
        let mut pids: Vec<i32> = self.owners.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn live(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    /// Seats of one template in order, 0 for vacant.
    pub fn seats(&self, name: &str) -> &[i32] {
        self.slots.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.capacity.clear();
        self.owners.clear();
    }

    fn trim(seats: &mut Vec<i32>, capacity: usize) {
        while seats.len() > capacity && seats.last() == Some(&0) {
            seats.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_and_frees_seats() {
        let mut table = SlotTable::new();
        table.resize("web", 2);
        assert_eq!(table.vacancies("web"), vec![0, 1]);

        table.occupy("web", 0, 100);
        table.occupy("web", 1, 101);
        assert!(table.vacancies("web").is_empty());
        assert_eq!(table.owner(101), Some(("web", 1)));

        assert_eq!(table.release(100), Some(("web".to_string(), 0)));
        assert_eq!(table.vacancies("web"), vec![0]);
        assert_eq!(table.release(100), None);
    }

    #[test]
    fn shrinking_retires_seats_as_they_empty() {
        let mut table = SlotTable::new();
        table.resize("web", 3);
        for (slot, pid) in [(0, 10), (1, 11), (2, 12)] {
            table.occupy("web", slot, pid);
        }

        table.resize("web", 1);
        assert_eq!(table.seats("web"), &[10, 11, 12]);

        table.release(12);
        assert_eq!(table.seats("web"), &[10, 11]);
        table.release(10);
        assert_eq!(table.vacancies("web"), vec![0]);
        table.release(11);
        assert_eq!(table.seats("web"), &[0]);
    }

    #[test]
    fn removed_template_disappears_with_its_last_process() {
        let mut table = SlotTable::new();
        table.resize("old", 1);
        table.occupy("old", 0, 7);
        table.resize("old", 0);
        assert_eq!(table.names(), vec!["old".to_string()]);
        table.release(7);
        assert!(table.names().is_empty());
    }
}
