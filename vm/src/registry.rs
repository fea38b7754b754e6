//! Event handler templates and triggering (spec §4.5).

use std::rc::Rc;

use filly_core::{EventType, Mode, Opcode};

use crate::sequencer::SequencerId;

/// `(event_type, commands, mode, parent, user_id, active)` (spec §3 "Event
/// Handler Template"). Never executed directly; each trigger constructs a
/// fresh [`crate::Sequencer`] from `commands` and `parent`.
pub struct HandlerTemplate {
    pub id: u32,
    pub event_type: EventType,
    pub commands: Rc<[Opcode]>,
    pub mode: Mode,
    pub parent: Option<SequencerId>,
    pub user_id: Option<i64>,
    pub active: bool,
}

#[derive(Default)]
pub struct EventRegistry {
    templates: Vec<HandlerTemplate>,
    next_id: u32,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        event_type: EventType,
        commands: Rc<[Opcode]>,
        mode: Mode,
        parent: Option<SequencerId>,
        user_id: Option<i64>,
    ) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.templates.push(HandlerTemplate {
            id,
            event_type,
            commands,
            mode,
            parent,
            user_id,
            active: true,
        });
        id
    }

    pub fn deactivate(&mut self, id: u32) {
        if let Some(t) = self.templates.iter_mut().find(|t| t.id == id) {
            t.active = false;
        }
    }

    /// Removes every deactivated template. Live sequencers already
    /// instantiated from a template are unaffected (spec §4.5
    /// "Deactivation").
    pub fn cleanup_inactive(&mut self) {
        self.templates.retain(|t| t.active);
    }

    pub fn by_id(&self, id: u32) -> Option<&HandlerTemplate> {
        self.templates.iter().find(|t| t.id == id && t.active)
    }

    pub fn matching(&self, event_type: EventType) -> impl Iterator<Item = &HandlerTemplate> {
        self.templates
            .iter()
            .filter(move |t| t.active && t.event_type == event_type)
    }

    pub fn matching_user(&self, user_id: i64) -> impl Iterator<Item = &HandlerTemplate> {
        self.templates
            .iter()
            .filter(move |t| t.active && t.event_type == EventType::User && t.user_id == Some(user_id))
    }

    /// True if any active template exists for the given mode's continuous
    /// event type. Used by the "all sequences complete" predicate (spec
    /// §4.5) for `MIDI_TIME`.
    pub fn has_active(&self, event_type: EventType) -> bool {
        self.matching(event_type).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deactivate_then_cleanup_removes_template() {
        let mut reg = EventRegistry::new();
        let id = reg.register(EventType::Key, Rc::from(vec![]), Mode::Time, None, None);
        assert_eq!(reg.len(), 1);
        reg.deactivate(id);
        assert_eq!(reg.matching(EventType::Key).count(), 0);
        reg.cleanup_inactive();
        assert!(reg.is_empty());
    }

    #[test]
    fn user_scoped_lookup_filters_by_id() {
        let mut reg = EventRegistry::new();
        reg.register(EventType::User, Rc::from(vec![]), Mode::Time, None, Some(7));
        reg.register(EventType::User, Rc::from(vec![]), Mode::Time, None, Some(8));
        assert_eq!(reg.matching_user(7).count(), 1);
    }
}
