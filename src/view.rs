//! Rendered session regions: queue table, match log and status log.
//!
//! Each region sits behind its own lock. The poller only ever replaces the
//! queue table and the realtime link only ever prepends to the match log, so
//! a snapshot and a pushed match can land in any order without one
//! overwriting the other.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::{MatchEvent, QueueSnapshot};

/// The regions an operator sees.
#[derive(Debug)]
pub struct SessionView {
    queue: RwLock<Option<QueueSnapshot>>,
    matches: RwLock<VecDeque<MatchEvent>>,
    log: RwLock<VecDeque<String>>,
    match_capacity: usize,
    log_capacity: usize,
}

impl SessionView {
    /// Capacities below 1 are clamped to 1.
    pub fn new(match_capacity: usize, log_capacity: usize) -> Self {
        Self {
            queue: RwLock::new(None),
            matches: RwLock::new(VecDeque::new()),
            log: RwLock::new(VecDeque::new()),
            match_capacity: match_capacity.max(1),
            log_capacity: log_capacity.max(1),
        }
    }

    // ── Queue table ─────────────────────────────────────────────────

    /// Replace the queue table wholesale.
    pub fn replace_queue(&self, snapshot: QueueSnapshot) {
        *self.queue.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// The last rendered snapshot, if any refresh has succeeded.
    pub fn queue(&self) -> Option<QueueSnapshot> {
        self.queue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Match log ───────────────────────────────────────────────────

    /// Prepend a match result, dropping the oldest beyond capacity.
    pub fn push_match(&self, event: MatchEvent) {
        let mut matches = self.matches.write().unwrap_or_else(PoisonError::into_inner);
        matches.push_front(event);
        matches.truncate(self.match_capacity);
    }

    /// Match results, newest first.
    pub fn matches(&self) -> Vec<MatchEvent> {
        self.matches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    // ── Status log ──────────────────────────────────────────────────

    /// Prepend a `[HH:MM:SS] message` line (UTC).
    pub fn log(&self, message: impl AsRef<str>) {
        let line = format!("[{}] {}", clock_now(), message.as_ref());
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        log.push_front(line);
        log.truncate(self.log_capacity);
    }

    /// Status lines, newest first.
    pub fn log_lines(&self) -> Vec<String> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    // ── Text rendering ──────────────────────────────────────────────

    pub fn render_queue(&self) -> String {
        let Some(snapshot) = self.queue() else {
            return "Queue: (not loaded)\n".to_string();
        };
        let mut out = format!("Queue: {} player(s)\n", snapshot.queue_size);
        let _ = writeln!(
            out,
            "{:>3}  {:<16} {:<16} {:>6}  {:<6} {}",
            "#", "Player ID", "Username", "Elo", "Online", "Last active"
        );
        for (idx, p) in snapshot.players.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}  {:<16} {:<16} {:>6}  {:<6} {}",
                idx + 1,
                p.player_id,
                p.display_name.as_deref().unwrap_or(""),
                p.rating.map(|r| r.to_string()).unwrap_or_default(),
                if p.online { "Yes" } else { "No" },
                p.last_active.as_deref().unwrap_or("")
            );
        }
        out
    }

    pub fn render_matches(&self) -> String {
        let matches = self.matches();
        if matches.is_empty() {
            return "Matches: (none yet)\n".to_string();
        }
        let mut out = format!("Matches: {}\n", matches.len());
        for m in &matches {
            let _ = writeln!(out, "{}", format_match(m));
        }
        out
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::new(50, 200)
    }
}

/// One-line rendering of a match result.
pub fn format_match(m: &MatchEvent) -> String {
    fn rating(r: Option<i32>) -> String {
        r.map(|r| r.to_string()).unwrap_or_default()
    }
    format!(
        "{} {} | {} ({} -> {}) vs {} ({} -> {}) | winner: {}",
        m.played_at.clone().unwrap_or_else(clock_now),
        m.match_id.as_deref().unwrap_or(""),
        m.player_a.as_deref().unwrap_or(""),
        rating(m.old_rating_a),
        rating(m.new_rating_a),
        m.player_b.as_deref().unwrap_or(""),
        rating(m.old_rating_b),
        rating(m.new_rating_b),
        m.winner.as_deref().unwrap_or("")
    )
}

/// Wall-clock `HH:MM:SS` in UTC.
fn clock_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::QueuePlayer;

    fn player(id: &str) -> QueuePlayer {
        QueuePlayer {
            player_id: id.into(),
            display_name: Some(id.into()),
            rating: Some(1200),
            online: true,
            last_active: None,
        }
    }

    fn match_won_by(winner: &str) -> MatchEvent {
        MatchEvent {
            match_id: Some(format!("m-{winner}")),
            player_a: Some("alice".into()),
            player_b: Some("bob".into()),
            old_rating_a: Some(1200),
            old_rating_b: Some(1200),
            new_rating_a: Some(1216),
            new_rating_b: Some(1184),
            winner: Some(winner.into()),
            played_at: None,
        }
    }

    #[test]
    fn queue_is_replaced_not_merged() {
        let view = SessionView::default();
        view.replace_queue(QueueSnapshot {
            queue_size: 2,
            players: vec![player("a"), player("b")],
        });
        view.replace_queue(QueueSnapshot {
            queue_size: 1,
            players: vec![player("c")],
        });
        let snapshot = view.queue().unwrap();
        assert_eq!(snapshot.players.len(), 1);
        assert!(snapshot.contains("c"));
        assert!(!snapshot.contains("a"));
    }

    #[test]
    fn match_log_is_newest_first_and_bounded() {
        let view = SessionView::new(2, 10);
        view.push_match(match_won_by("one"));
        view.push_match(match_won_by("two"));
        view.push_match(match_won_by("three"));

        let winners: Vec<_> = view
            .matches()
            .into_iter()
            .filter_map(|m| m.winner)
            .collect();
        assert_eq!(winners, vec!["three", "two"]);
    }

    #[test]
    fn regions_are_independent() {
        let view = SessionView::default();
        view.push_match(match_won_by("alice"));
        view.replace_queue(QueueSnapshot {
            queue_size: 1,
            players: vec![player("carol")],
        });
        assert_eq!(view.matches().len(), 1);
        assert!(view.queue().unwrap().contains("carol"));
    }

    #[test]
    fn log_lines_are_timestamped() {
        let view = SessionView::new(1, 2);
        view.log("first");
        view.log("second");
        view.log("third");
        let lines = view.log_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("third"));
        assert!(lines[0].starts_with('['));
    }

    #[test]
    fn renders_tables() {
        let view = SessionView::default();
        assert!(view.render_queue().contains("not loaded"));
        view.replace_queue(QueueSnapshot {
            queue_size: 1,
            players: vec![player("alice")],
        });
        let table = view.render_queue();
        assert!(table.contains("alice"));
        assert!(table.contains("1200"));

        view.push_match(match_won_by("alice"));
        assert!(view.render_matches().contains("winner: alice"));
    }
}
