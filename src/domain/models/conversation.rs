use super::{Role, Turn, WireMessage};
use crate::domain::DomainError;

/// Ordered, append-only conversation history.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    turns: Vec<Turn>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed user/assistant exchange as one unit.
    pub fn append_exchange(&mut self, user: Turn, assistant: Turn) -> Result<(), DomainError> {
        if user.role() != Role::User || assistant.role() != Role::Assistant {
            return Err(DomainError::internal(
                "an exchange must be a user turn followed by an assistant turn",
            ));
        }
        self.turns.reserve(2);
        self.turns.push(user);
        self.turns.push(assistant);
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Wire projection of the history, oldest first. Turns kept out of
    /// context are skipped.
    pub fn wire_history(&self) -> Vec<WireMessage> {
        self.turns
            .iter()
            .filter(|t| t.in_context())
            .map(|t| t.wire().clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> Turn {
        Turn::user(text, vec![], WireMessage::user(text)).unwrap()
    }

    #[test]
    fn exchange_appends_in_order() {
        let mut store = ConversationStore::new();
        store
            .append_exchange(user("hi"), Turn::assistant("hello"))
            .unwrap();
        store
            .append_exchange(user("again"), Turn::assistant("sure"))
            .unwrap();

        let roles: Vec<Role> = store.turns().iter().map(|t| t.role()).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(store.last().unwrap().text(), "sure");
        assert_eq!(store.wire_history().len(), 4);
    }

    #[test]
    fn reversed_exchange_is_rejected_without_partial_append() {
        let mut store = ConversationStore::new();
        let result = store.append_exchange(Turn::assistant("oops"), user("hi"));
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn turns_out_of_context_stay_displayed_but_are_not_resent() {
        let mut store = ConversationStore::new();
        store
            .append_exchange(
                user("bad request").without_context(),
                Turn::assistant("Error invoking model: too large").without_context(),
            )
            .unwrap();
        store
            .append_exchange(user("hi"), Turn::assistant("hello"))
            .unwrap();

        assert_eq!(store.len(), 4);
        let wire = store.wire_history();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].first_text(), Some("hi"));
        assert_eq!(wire[1].role(), Role::Assistant);
    }

    #[test]
    fn clear_drops_everything() {
        let mut store = ConversationStore::new();
        store
            .append_exchange(user("hi"), Turn::assistant("hello"))
            .unwrap();
        store.clear();
        assert_eq!(store.len(), 0);
    }
}
