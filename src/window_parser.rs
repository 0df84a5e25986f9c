//! Decoding of range-with-scores replies.
//!
//! A store answers `range-with-scores` with a flat sequence that alternates member and
//! score (`[member, score, member, score, ...]`), ascending by score. The parser keeps
//! that order, so the first entry returned is always the oldest one in the window.

use crate::{WindowEntry, ZwindowError};

/// Decode a flat `[member, score, ...]` reply into window entries, oldest first.
///
/// An empty reply is an empty window. An odd number of items, or a score that is not a
/// finite number, is a [`ZwindowError::ProtocolError`].
pub fn parse_range_with_scores(reply: Vec<String>) -> Result<Vec<WindowEntry>, ZwindowError> {
    if reply.len() % 2 != 0 {
        return Err(ZwindowError::ProtocolError(format!(
            "range reply has {} items, expected member/score pairs",
            reply.len()
        )));
    }

    let mut entries = Vec::with_capacity(reply.len() / 2);
    let mut items = reply.into_iter();

    while let (Some(token), Some(raw_score)) = (items.next(), items.next()) {
        entries.push(WindowEntry {
            timestamp_micros: parse_score(&raw_score)?,
            token,
        });
    }

    Ok(entries)
}

/// Scores are written as integer microseconds, but a store may echo them back in
/// floating point notation (`1.7e+15`).
fn parse_score(raw: &str) -> Result<i64, ZwindowError> {
    if let Ok(score) = raw.parse::<i64>() {
        return Ok(score);
    }

    match raw.parse::<f64>() {
        Ok(score) if score.is_finite() => Ok(score as i64),
        _ => Err(ZwindowError::ProtocolError(format!(
            "range reply score {raw:?} is not a number"
        ))),
    }
}
