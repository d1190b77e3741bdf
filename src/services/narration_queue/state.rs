//! Queue state machine, owned exclusively by the worker task

use super::QueueError;
use crate::domain::narration::{Narration, NarrationId, NarrationStatus};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnqueueReport {
    pub accepted: usize,
    pub failed: usize,
    pub pending: usize,
}

/// What one `next()` did
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Advance {
    pub finished: Option<Narration>,
    pub started: Option<Narration>,
}

/// FIFO of narrations with at most one entry playing.
///
/// Terminal entries stay in place so callers can inspect failures; `head`
/// skips past them so `next()` does not rescan the finished prefix.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    entries: Vec<Narration>,
    index: FxHashMap<NarrationId, usize>,
    current: Option<NarrationId>,
    /// Every entry before `head` is no longer queued
    head: usize,
}

impl QueueState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append in order. Duplicate ids are ignored. Entries carrying a
    /// failure reason go straight to failed.
    pub(crate) fn enqueue(&mut self, batch: Vec<Narration>, now: DateTime<Utc>) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        for mut narration in batch {
            if self.index.contains_key(&narration.id) {
                continue;
            }
            narration.status = NarrationStatus::Queued;
            narration.started_at = None;
            narration.completed_at = None;
            if narration.failure_reason.is_some() {
                narration.apply_status(NarrationStatus::Failed, now);
                report.failed += 1;
            }
            self.index.insert(narration.id, self.entries.len());
            self.entries.push(narration);
            report.accepted += 1;
        }
        report.pending = self.pending_count();
        report
    }

    /// Finish whatever is playing and promote the earliest queued entry.
    ///
    /// The finished entry, if any, moves to completed.
    pub(crate) fn next(&mut self, now: DateTime<Utc>) -> Advance {
        let finished = self.current.take().and_then(|id| {
            let position = *self.index.get(&id)?;
            let entry = &mut self.entries[position];
            entry.apply_status(NarrationStatus::Completed, now);
            Some(entry.clone())
        });
        Advance { finished, started: self.promote_head(now) }
    }

    /// Start `id` only if nothing is playing and it is still the next queued entry
    pub(crate) fn start_if_next(
        &mut self,
        id: NarrationId,
        now: DateTime<Utc>,
    ) -> Result<Narration, QueueError> {
        if let Some(playing) = self.current {
            return Err(QueueError::Busy(playing));
        }
        self.advance_head();
        let head = self.entries.get(self.head).map(|n| n.id);
        if head != Some(id) {
            return Err(QueueError::HeadChanged { expected: id, head });
        }
        self.promote_head(now).ok_or(QueueError::NotFound(id))
    }

    pub(crate) fn update_status(
        &mut self,
        id: NarrationId,
        status: NarrationStatus,
        now: DateTime<Utc>,
    ) -> Result<Narration, QueueError> {
        let position = *self.index.get(&id).ok_or(QueueError::NotFound(id))?;
        let entry = &mut self.entries[position];

        if !entry.status.can_transition_to(status) {
            return Err(QueueError::InvalidTransition {
                id,
                from: entry.status.as_str(),
                to: status.as_str(),
            });
        }
        if status == NarrationStatus::Playing {
            if let Some(playing) = self.current {
                return Err(QueueError::Busy(playing));
            }
        }

        entry.apply_status(status, now);
        let updated = entry.clone();

        if status == NarrationStatus::Playing {
            self.current = Some(id);
        } else if status.is_terminal() && self.current == Some(id) {
            self.current = None;
        }
        Ok(updated)
    }

    pub(crate) fn current(&self) -> Option<&Narration> {
        self.current.and_then(|id| self.get(id))
    }

    pub(crate) fn peek_next(&self) -> Option<&Narration> {
        self.entries[self.head.min(self.entries.len())..]
            .iter()
            .find(|n| n.status == NarrationStatus::Queued)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.entries[self.head.min(self.entries.len())..]
            .iter()
            .filter(|n| n.status == NarrationStatus::Queued)
            .count()
    }

    pub(crate) fn get(&self, id: NarrationId) -> Option<&Narration> {
        self.index.get(&id).map(|&i| &self.entries[i])
    }

    pub(crate) fn entries(&self) -> &[Narration] {
        &self.entries
    }

    /// Drop everything, returning how many entries were discarded
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.index.clear();
        self.current = None;
        self.head = 0;
        dropped
    }

    fn promote_head(&mut self, now: DateTime<Utc>) -> Option<Narration> {
        self.advance_head();
        let entry = self.entries.get_mut(self.head)?;
        entry.apply_status(NarrationStatus::Playing, now);
        self.current = Some(entry.id);
        Some(entry.clone())
    }

    fn advance_head(&mut self) {
        while self
            .entries
            .get(self.head)
            .is_some_and(|n| n.status != NarrationStatus::Queued)
        {
            self.head += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PoiId;

    fn narration(name: &str) -> Narration {
        Narration::new(PoiId::from(name), name, name, "content", 60.0)
    }

    fn state_with(names: &[&str]) -> (QueueState, Vec<NarrationId>) {
        let mut state = QueueState::new();
        let batch: Vec<Narration> = names.iter().map(|n| narration(n)).collect();
        let ids = batch.iter().map(|n| n.id).collect();
        state.enqueue(batch, Utc::now());
        (state, ids)
    }

    #[test]
    fn test_enqueue_reports_pending() {
        let mut state = QueueState::new();
        let now = Utc::now();
        let report = state.enqueue(vec![narration("a"), narration("b")], now);
        assert_eq!((report.accepted, report.pending), (2, 2));
        let report = state.enqueue(vec![narration("c")], now);
        assert_eq!((report.accepted, report.pending), (1, 3));
    }

    #[test]
    fn test_enqueue_ignores_duplicate_ids() {
        let mut state = QueueState::new();
        let n = narration("a");
        state.enqueue(vec![n.clone()], Utc::now());
        assert_eq!(
            state.enqueue(vec![n], Utc::now()),
            EnqueueReport { accepted: 0, failed: 0, pending: 1 }
        );
    }

    #[test]
    fn test_enqueue_failed_placeholder_never_plays() {
        let mut state = QueueState::new();
        let now = Utc::now();
        let broken = Narration::failed(PoiId::from("broken"), "broken", "no content");
        let report = state.enqueue(vec![broken.clone(), narration("ok")], now);
        assert_eq!(report, EnqueueReport { accepted: 2, failed: 1, pending: 1 });

        let entry = state.get(broken.id).unwrap();
        assert_eq!(entry.status, NarrationStatus::Failed);
        assert!(entry.completed_at.is_some());
        assert_eq!(state.next(now).started.unwrap().poi_name, "ok");
    }

    #[test]
    fn test_repeated_next_drains_in_order() {
        let (mut state, ids) = state_with(&["a", "b", "c"]);
        let now = Utc::now();

        let mut started = Vec::new();
        for _ in 0..4 {
            let advance = state.next(now);
            assert!(state.entries().iter().filter(|n| n.status == NarrationStatus::Playing).count() <= 1);
            if let Some(finished) = &advance.finished {
                assert_eq!(finished.status, NarrationStatus::Completed);
                assert!(finished.completed_at.is_some());
            }
            started.push(advance.started.map(|n| n.id));
        }

        assert_eq!(started, vec![Some(ids[0]), Some(ids[1]), Some(ids[2]), None]);
        assert!(state.current().is_none());
        assert!(state.entries().iter().all(|n| n.status == NarrationStatus::Completed));
    }

    #[test]
    fn test_next_after_explicit_finish() {
        let (mut state, ids) = state_with(&["a", "b"]);
        let now = Utc::now();

        let first = state.next(now).started.unwrap();
        assert_eq!(first.id, ids[0]);
        assert_eq!(first.status, NarrationStatus::Playing);
        assert!(first.started_at.is_some());

        state.update_status(ids[0], NarrationStatus::Cancelled, now).unwrap();
        let advance = state.next(now);
        assert!(advance.finished.is_none());
        assert_eq!(advance.started.unwrap().id, ids[1]);
        assert_eq!(state.get(ids[0]).unwrap().status, NarrationStatus::Cancelled);
    }

    #[test]
    fn test_start_if_next_guards_head_and_playing() {
        let (mut state, ids) = state_with(&["a", "b"]);
        let now = Utc::now();

        // Head skipped by someone else: "b" is not started in its place
        state.update_status(ids[0], NarrationStatus::Skipped, now).unwrap();
        assert_eq!(
            state.start_if_next(ids[0], now),
            Err(QueueError::HeadChanged { expected: ids[0], head: Some(ids[1]) })
        );
        assert!(state.current().is_none());

        assert_eq!(state.start_if_next(ids[1], now).unwrap().id, ids[1]);
        assert_eq!(state.start_if_next(ids[1], now), Err(QueueError::Busy(ids[1])));

        state.update_status(ids[1], NarrationStatus::Completed, now).unwrap();
        assert_eq!(
            state.start_if_next(ids[1], now),
            Err(QueueError::HeadChanged { expected: ids[1], head: None })
        );
    }

    #[test]
    fn test_next_on_empty() {
        let mut state = QueueState::new();
        assert_eq!(state.next(Utc::now()), Advance::default());
    }

    #[test]
    fn test_skip_before_playing() {
        let (mut state, ids) = state_with(&["a", "b", "c"]);
        let now = Utc::now();
        state.update_status(ids[1], NarrationStatus::Skipped, now).unwrap();
        assert_eq!(state.pending_count(), 2);

        state.next(now);
        assert_eq!(state.next(now).started.unwrap().id, ids[2]);
    }

    #[test]
    fn test_terminal_entries_are_final() {
        let (mut state, ids) = state_with(&["a"]);
        let now = Utc::now();
        state.update_status(ids[0], NarrationStatus::Failed, now).unwrap();
        let err = state.update_status(ids[0], NarrationStatus::Queued, now).unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { from: "failed", to: "queued", .. }));
        assert!(state.update_status(ids[0], NarrationStatus::Playing, now).is_err());
        assert_eq!(state.get(ids[0]).unwrap().status, NarrationStatus::Failed);
        assert!(state.get(ids[0]).unwrap().completed_at.is_some());
    }

    #[test]
    fn test_playing_only_moves_to_terminal() {
        let (mut state, ids) = state_with(&["a"]);
        let now = Utc::now();
        state.next(now);
        assert!(state.update_status(ids[0], NarrationStatus::Queued, now).is_err());
        assert!(state.update_status(ids[0], NarrationStatus::Playing, now).is_err());
        state.update_status(ids[0], NarrationStatus::Cancelled, now).unwrap();
        assert!(state.current().is_none());
    }

    #[test]
    fn test_second_playing_rejected() {
        let (mut state, ids) = state_with(&["a", "b"]);
        let now = Utc::now();
        state.update_status(ids[1], NarrationStatus::Playing, now).unwrap();
        assert_eq!(state.current().unwrap().id, ids[1]);
        assert_eq!(
            state.update_status(ids[0], NarrationStatus::Playing, now),
            Err(QueueError::Busy(ids[1]))
        );
    }

    #[test]
    fn test_unknown_id() {
        let mut state = QueueState::new();
        let id = NarrationId::new();
        assert_eq!(
            state.update_status(id, NarrationStatus::Completed, Utc::now()),
            Err(QueueError::NotFound(id))
        );
    }

    #[test]
    fn test_peek_does_not_advance() {
        let (mut state, ids) = state_with(&["a", "b"]);
        assert_eq!(state.peek_next().unwrap().id, ids[0]);
        assert_eq!(state.peek_next().unwrap().id, ids[0]);
        state.next(Utc::now());
        assert_eq!(state.peek_next().unwrap().id, ids[1]);
    }

    #[test]
    fn test_clear_resets() {
        let (mut state, _) = state_with(&["a", "b"]);
        state.next(Utc::now());
        assert_eq!(state.clear(), 2);
        assert!(state.current().is_none());
        assert_eq!(state.pending_count(), 0);
        assert!(state.entries().is_empty());
        assert_eq!(state.next(Utc::now()), Advance::default());
    }
}
