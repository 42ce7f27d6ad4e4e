//! # Conversation History
//!
//! Bounded, append-only log of turns owned by the controller.
//! Modes only ever see a [`HistoryView`].

use crate::domain::types::{ConversationTurn, Role};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Appends a turn, evicting the oldest ones once over capacity.
    ///
    /// The latest system-action turn is skipped during eviction while another
    /// turn older than the new one can go instead, so the result of the last
    /// executed action stays visible to the next prompt. The turn just added
    /// is never evicted.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            let newest = self.turns.len() - 1;
            let protected = self.latest_system_action_index();
            let victim = (0..newest).find(|&i| Some(i) != protected).unwrap_or(0);
            if let Some(evicted) = self.turns.remove(victim) {
                tracing::debug!("Evicted {} turn from history", evicted.role.label());
            }
        }
    }

    pub fn view(&self) -> HistoryView<'_> {
        HistoryView { turns: &self.turns }
    }

    fn latest_system_action_index(&self) -> Option<usize> {
        self.turns.iter().rposition(|t| t.role == Role::SystemAction)
    }
}

/// Read-only window onto the history, handed to the modes during a turn.
#[derive(Debug, Clone, Copy)]
pub struct HistoryView<'a> {
    turns: &'a VecDeque<ConversationTurn>,
}

impl<'a> HistoryView<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a ConversationTurn> + 'a {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&'a ConversationTurn> {
        self.turns.back()
    }

    /// Renders the turns as `Role: content` lines for prompt building.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(history: &ConversationHistory) -> Vec<String> {
        history.view().iter().map(|t| t.content.clone()).collect()
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        for capacity in 1..6 {
            let mut history = ConversationHistory::new(capacity);
            for i in 0..20 {
                let turn = match i % 3 {
                    0 => ConversationTurn::user(format!("u{i}")),
                    1 => ConversationTurn::assistant(format!("a{i}")),
                    _ => ConversationTurn::system_action(format!("s{i}")),
                };
                history.append(turn);
                assert!(history.len() <= capacity);
            }
        }
    }

    #[test]
    fn test_eviction_is_fifo() {
        let mut history = ConversationHistory::new(3);
        for i in 0..5 {
            history.append(ConversationTurn::user(format!("t{i}")));
        }
        assert_eq!(contents(&history), vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn test_latest_system_action_survives_eviction() {
        let mut history = ConversationHistory::new(3);
        history.append(ConversationTurn::system_action("ran ls"));
        history.append(ConversationTurn::user("u1"));
        history.append(ConversationTurn::assistant("a1"));
        history.append(ConversationTurn::user("u2"));

        assert_eq!(contents(&history), vec!["ran ls", "a1", "u2"]);

        // A newer system action loses the protection for the older one.
        history.append(ConversationTurn::system_action("ran pwd"));
        assert_eq!(contents(&history), vec!["a1", "u2", "ran pwd"]);
    }

    #[test]
    fn test_capacity_one_keeps_newest() {
        let mut history = ConversationHistory::new(0);
        assert_eq!(history.capacity(), 1);
        history.append(ConversationTurn::system_action("s"));
        history.append(ConversationTurn::user("u"));
        assert_eq!(contents(&history), vec!["u"]);

        // Later turns keep replacing the single slot.
        history.append(ConversationTurn::assistant("a"));
        assert_eq!(contents(&history), vec!["a"]);
        history.append(ConversationTurn::system_action("s2"));
        history.append(ConversationTurn::user("u2"));
        assert_eq!(contents(&history), vec!["u2"]);
    }

    #[test]
    fn test_newest_turn_is_never_evicted() {
        let mut history = ConversationHistory::new(2);
        history.append(ConversationTurn::user("u1"));
        history.append(ConversationTurn::system_action("ran ls"));
        history.append(ConversationTurn::user("u2"));
        assert_eq!(contents(&history), vec!["ran ls", "u2"]);

        history.append(ConversationTurn::assistant("a2"));
        assert_eq!(contents(&history), vec!["ran ls", "a2"]);
    }

    #[test]
    fn test_render_uses_role_labels() {
        let mut history = ConversationHistory::new(5);
        history.append(ConversationTurn::user("list files"));
        history.append(ConversationTurn::assistant("Sure."));
        history.append(ConversationTurn::system_action("[listed 3 entries]"));
        assert_eq!(
            history.view().render(),
            "User: list files\nAssistant: Sure.\nSystem: [listed 3 entries]"
        );
    }
}
