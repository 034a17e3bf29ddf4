//! Pending list ordered by priority, FIFO among equal priorities.
use crate::task::TaskId;
use std::collections::VecDeque;

#[derive(Debug, Default, Clone)]
pub struct PriorityList {
    items: VecDeque<(TaskId, i32)>,
}

impl PriorityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert right before the first entry with a strictly lower priority,
    /// or at the back when there is none.
    pub fn insert(&mut self, id: TaskId, priority: i32) {
        let position = self
            .items
            .iter()
            .position(|(_, queued)| *queued < priority)
            .unwrap_or(self.items.len());
        self.items.insert(position, (id, priority));
    }

    pub fn pop_front(&mut self) -> Option<TaskId> {
        self.items.pop_front().map(|(id, _)| id)
    }

    pub fn remove(&mut self, id: &TaskId) -> bool {
        match self.items.iter().position(|(queued, _)| queued == id) {
            Some(position) => {
                self.items.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.items.iter().any(|(queued, _)| queued == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.items.iter().map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(list: &mut PriorityList) -> Vec<TaskId> {
        std::iter::from_fn(|| list.pop_front()).collect()
    }

    #[test]
    fn higher_priority_goes_first() {
        let mut list = PriorityList::new();
        let a = TaskId::new();
        let b = TaskId::new();
        list.insert(a, 1);
        list.insert(b, 5);

        assert_eq!(drain(&mut list), vec![b, a]);
    }

    #[test]
    fn equal_priorities_keep_insertion_order() {
        let mut list = PriorityList::new();
        let ids: Vec<TaskId> = (0..4).map(|_| TaskId::new()).collect();
        for id in &ids {
            list.insert(*id, 2);
        }
        assert_eq!(drain(&mut list), ids);
    }

    #[test]
    fn mixed_priorities_are_non_increasing() {
        let mut list = PriorityList::new();
        let priorities = [0, 3, -1, 3, 7, 0, 2];
        let ids: Vec<TaskId> = priorities.iter().map(|_| TaskId::new()).collect();
        for (id, priority) in ids.iter().zip(priorities) {
            list.insert(*id, priority);
        }

        let order = drain(&mut list);
        let ordered: Vec<i32> = order
            .iter()
            .map(|id| {
                let index = ids.iter().position(|x| x == id).unwrap();
                priorities[index]
            })
            .collect();
        assert_eq!(ordered, vec![7, 3, 3, 2, 0, 0, -1]);
        // ties resolved by arrival
        assert_eq!(order[1], ids[1]);
        assert_eq!(order[2], ids[3]);
    }

    #[test]
    fn remove_entry() {
        let mut list = PriorityList::new();
        let a = TaskId::new();
        let b = TaskId::new();
        list.insert(a, 0);
        list.insert(b, 0);

        assert!(list.remove(&a));
        assert!(!list.remove(&a));
        assert!(!list.contains(&a));
        assert_eq!(list.len(), 1);
    }
}
