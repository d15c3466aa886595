//! User stats row maintenance.
//!
//! The stats row is mutated exclusively through relative increments so
//! concurrent mutators (two jobs for the same user, a review racing a
//! job) can never clobber each other with a stale read-then-overwrite.
//! A full-scan recalculation exists as the eventual-consistency backstop
//! for drift correction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_opt_ts, parse_ts, StudyStore};
use crate::error::MnemaResult;
use crate::types::{CardState, StatsDelta, UserStats};

/// Apply a delta to the user's stats row on an open connection or
/// transaction. Creates the row if it does not exist yet.
pub(super) fn apply_delta_conn(
    conn: &Connection,
    user_id: &str,
    delta: &StatsDelta,
    now: DateTime<Utc>,
) -> MnemaResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_stats (user_id, last_calculated) VALUES (?1, ?2)",
        params![user_id, now.to_rfc3339()],
    )?;
    conn.execute(
        "UPDATE user_stats SET
            total_cards = total_cards + ?1,
            new_count = new_count + ?2,
            learning_count = learning_count + ?3,
            mature_count = mature_count + ?4,
            due_now_count = due_now_count + ?5,
            last_calculated = ?6
         WHERE user_id = ?7",
        params![
            delta.total_cards,
            delta.new_count,
            delta.learning_count,
            delta.mature_count,
            delta.due_now_count,
            now.to_rfc3339(),
            user_id,
        ],
    )?;
    Ok(())
}

impl StudyStore {
    /// Apply a stats delta as a standalone atomic increment.
    ///
    /// Callers with a triggering mutation should prefer the composite
    /// store operations, which apply the delta in the same transaction.
    pub fn apply_stats_delta(
        &self,
        user_id: &str,
        delta: &StatsDelta,
        now: DateTime<Utc>,
    ) -> MnemaResult<()> {
        if delta.is_empty() {
            return Ok(());
        }
        let conn = self.lock()?;
        apply_delta_conn(&conn, user_id, delta, now)
    }

    /// Read the cached stats row.
    pub fn get_user_stats(&self, user_id: &str) -> MnemaResult<Option<UserStats>> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                "SELECT user_id, total_cards, new_count, learning_count, mature_count,
                        due_now_count, next_review_time, last_calculated
                 FROM user_stats WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserStats {
                        user_id: row.get(0)?,
                        total_cards: row.get(1)?,
                        new_count: row.get(2)?,
                        learning_count: row.get(3)?,
                        mature_count: row.get(4)?,
                        due_now_count: row.get(5)?,
                        next_review_time: parse_opt_ts(row.get(6)?),
                        last_calculated: parse_ts(row.get(7)?),
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Count of currently due concepts for a user.
    ///
    /// Reads the cached row; cards that crossed the due boundary purely
    /// by the passage of time are picked up with an indexed range count
    /// (never a full row scan) that also refreshes the cache.
    pub fn due_count(&self, user_id: &str, now: DateTime<Utc>) -> MnemaResult<i64> {
        let stats = self.get_user_stats(user_id)?;
        // An unknown next_review_time means the cache cannot prove it is
        // current, so recount in that case too.
        let stale = match &stats {
            None => true,
            Some(s) => s.next_review_time.map_or(true, |t| t <= now),
        };
        if let (false, Some(s)) = (stale, &stats) {
            return Ok(s.due_now_count);
        }
        self.refresh_due_count(user_id, now)
    }

    /// Recount due cards over the `(user_id, next_review)` index and
    /// refresh the cached `due_now_count` and `next_review_time`.
    fn refresh_due_count(&self, user_id: &str, now: DateTime<Utc>) -> MnemaResult<i64> {
        let conn = self.lock()?;
        let now_str = now.to_rfc3339();

        let due: i64 = conn.query_row(
            "SELECT COUNT(*) FROM concepts
             WHERE user_id = ?1 AND deleted_at IS NULL AND archived_at IS NULL
               AND next_review <= ?2",
            params![user_id, now_str],
            |row| row.get(0),
        )?;
        let next_upcoming: Option<String> = conn.query_row(
            "SELECT MIN(next_review) FROM concepts
             WHERE user_id = ?1 AND deleted_at IS NULL AND archived_at IS NULL
               AND next_review > ?2",
            params![user_id, now_str],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO user_stats (user_id, last_calculated) VALUES (?1, ?2)",
            params![user_id, now_str],
        )?;
        conn.execute(
            "UPDATE user_stats SET due_now_count = ?1, next_review_time = ?2, last_calculated = ?3
             WHERE user_id = ?4",
            params![due, next_upcoming, now_str, user_id],
        )?;

        Ok(due)
    }

    /// Full-scan recalculation of every counter for a user.
    ///
    /// The drift-correction backstop; normal reads and writes go through
    /// the incremental delta path.
    pub fn recalculate_user_stats(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> MnemaResult<UserStats> {
        let conn = self.lock()?;
        let now_str = now.to_rfc3339();

        let mut stmt = conn.prepare(
            "SELECT card_state, next_review FROM concepts
             WHERE user_id = ?1 AND deleted_at IS NULL AND archived_at IS NULL",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let state: String = row.get(0)?;
                let next_review: String = row.get(1)?;
                Ok((state, next_review))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = UserStats::empty(user_id, now);
        let mut next_upcoming: Option<DateTime<Utc>> = None;
        for (state_str, next_review_str) in rows {
            let state: CardState = state_str.parse().unwrap_or(CardState::New);
            let next_review = parse_ts(next_review_str);

            stats.total_cards += 1;
            match state {
                CardState::New => stats.new_count += 1,
                CardState::Learning | CardState::Relearning => stats.learning_count += 1,
                CardState::Review => stats.mature_count += 1,
            }
            if next_review <= now {
                stats.due_now_count += 1;
            } else if next_upcoming.map_or(true, |t| next_review < t) {
                next_upcoming = Some(next_review);
            }
        }
        stats.next_review_time = next_upcoming;

        conn.execute(
            "INSERT OR REPLACE INTO user_stats
             (user_id, total_cards, new_count, learning_count, mature_count,
              due_now_count, next_review_time, last_calculated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user_id,
                stats.total_cards,
                stats.new_count,
                stats.learning_count,
                stats.mature_count,
                stats.due_now_count,
                stats.next_review_time.map(|t| t.to_rfc3339()),
                now_str,
            ],
        )?;

        Ok(stats)
    }
}
