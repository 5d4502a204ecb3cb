use std::collections::VecDeque;

use super::oe_model::EditorState;

/// Linear undo log. Every entry is an owned snapshot, so later live edits
/// can never reach back into it.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<EditorState>,
    cursor: usize,
    limit: Option<usize>,
}

impl HistoryLog {
    pub fn new(initial: EditorState) -> Self { Self::with_limit(initial, None) }

    /// `limit` caps the number of entries kept; the oldest are dropped first.
    pub fn with_limit(initial: EditorState, limit: Option<usize>) -> Self {
        let mut entries: VecDeque<EditorState> = VecDeque::new();
        entries.push_back(initial);
        Self { entries, cursor: 0, limit: limit.map(|l| l.max(1)) }
    }

    /// Drops any redo branch, appends `state` and moves the cursor onto it.
    pub fn commit(&mut self, state: EditorState) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(state);
        if let Some(limit) = self.limit {
            while self.entries.len() > limit { self.entries.pop_front(); }
        }
        self.cursor = self.entries.len() - 1;
        tracing::debug!("History commit: {} entries, cursor {}", self.entries.len(), self.cursor);
    }

    pub fn undo(&mut self) -> Option<&EditorState> {
        if self.cursor == 0 { return None; }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&EditorState> {
        if self.cursor + 1 >= self.entries.len() { return None; }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    /// Replaces the whole log with a single entry.
    pub fn reset(&mut self, state: EditorState) {
        self.entries.clear();
        self.entries.push_back(state);
        self.cursor = 0;
    }

    pub fn current(&self) -> Option<&EditorState> { self.entries.get(self.cursor) }
    pub fn can_undo(&self) -> bool { self.cursor > 0 }
    pub fn can_redo(&self) -> bool { self.cursor + 1 < self.entries.len() }
    #[cfg(test)]
    pub fn len(&self) -> usize { self.entries.len() }
    #[cfg(test)]
    pub fn cursor(&self) -> usize { self.cursor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::overlay_editor::oe_model::{ElementId, ImageFilters, TextElement};

    fn state(n: u64) -> EditorState {
        EditorState { elements: (1..=n).map(|i| TextElement::new(ElementId(i))).collect(), filters: ImageFilters::default() }
    }

    #[test]
    fn undo_then_redo_returns_to_latest() {
        let mut log: HistoryLog = HistoryLog::new(state(0));
        for n in 1..=4 { log.commit(state(n)); }

        for n in (0..4).rev() { assert_eq!(log.undo(), Some(&state(n))); }
        assert_eq!(log.undo(), None);
        assert!(!log.can_undo());

        for n in 1..=4 { assert_eq!(log.redo(), Some(&state(n))); }
        assert_eq!(log.redo(), None);
        assert_eq!(log.current(), Some(&state(4)));
    }

    #[test]
    fn commit_after_undo_discards_redo_branch() {
        let mut log: HistoryLog = HistoryLog::new(state(0));
        log.commit(state(1));
        log.commit(state(2));
        log.undo();
        log.commit(state(7));

        assert!(!log.can_redo());
        assert_eq!(log.redo(), None);
        assert_eq!(log.len(), 3);
        assert_eq!(log.undo(), Some(&state(1)));
    }

    #[test]
    fn snapshots_are_independent_of_later_edits() {
        let mut live: EditorState = state(1);
        let mut log: HistoryLog = HistoryLog::new(live.clone());
        live.elements[0].text = "edited".into();
        assert_eq!(log.current().map(|s| s.elements[0].text.as_str()), Some("New Text"));
        log.commit(live);
        assert_eq!(log.undo().map(|s| s.elements[0].text.as_str()), Some("New Text"));
    }

    #[test]
    fn limit_drops_oldest() {
        let mut log: HistoryLog = HistoryLog::with_limit(state(0), Some(3));
        for n in 1..=5 { log.commit(state(n)); }
        assert_eq!(log.len(), 3);
        assert_eq!(log.cursor(), 2);
        assert_eq!(log.undo(), Some(&state(4)));
        assert_eq!(log.undo(), Some(&state(3)));
        assert_eq!(log.undo(), None);
    }

    #[test]
    fn reset_leaves_single_entry() {
        let mut log: HistoryLog = HistoryLog::new(state(0));
        log.commit(state(1));
        log.reset(state(9));
        assert_eq!((log.len(), log.cursor()), (1, 0));
        assert!(!log.can_undo() && !log.can_redo());
        assert_eq!(log.current(), Some(&state(9)));
    }
}
