//! Legacy CSV format
//!
//! One colony per line: `id,x,y,activeFlag,,`. Coordinates are whole meters,
//! the flag is `A` for active and a blank for inactive. The two trailing
//! separators are kept on write for compatibility with existing files.

use tracing::{debug, warn};

use crate::model::{Colony, ColonySet};

const SEPARATOR: char = ',';

/// Decode one line. Returns `None` for anything malformed.
pub fn decode_line(line: &str) -> Option<Colony> {
    let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
    if fields.len() < 4 || fields[4..].iter().any(|extra| !extra.is_empty()) {
        return None;
    }

    let id = fields[0].parse().ok()?;
    let x = parse_meters(fields[1])?;
    let y = parse_meters(fields[2])?;
    let active = fields[3].eq_ignore_ascii_case("A");

    Some(Colony::new(id, x, y, active))
}

/// Decode a whole file. Bad lines are skipped; blank lines are ignored.
pub fn decode(text: &str) -> ColonySet {
    let mut colonies = ColonySet::new();
    let mut skipped = 0usize;

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(line) {
            Some(colony) => {
                if let Some(previous) = colonies.insert(colony) {
                    debug!(line = index + 1, id = previous.id(), "Duplicate CSV id replaced");
                }
            }
            None => {
                skipped += 1;
                debug!(line = index + 1, content = line, "Skipping malformed CSV line");
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, decoded = colonies.len(), "CSV contained malformed lines");
    }
    colonies
}

/// Encode one colony, without a line terminator.
pub fn encode_line(colony: &Colony) -> String {
    let active = if colony.is_active() { 'A' } else { ' ' };
    format!(
        "{}{sep}{}{sep}{}{sep}{}{sep}{sep}",
        colony.id(),
        colony.x().round() as i64,
        colony.y().round() as i64,
        active,
        sep = SEPARATOR
    )
}

/// Encode a collection, one line per colony.
pub fn encode(colonies: &ColonySet) -> String {
    let mut out = String::new();
    for colony in colonies {
        out.push_str(&encode_line(colony));
        out.push('\n');
    }
    out
}

fn parse_meters(field: &str) -> Option<f64> {
    if let Ok(whole) = field.parse::<i64>() {
        return Some(whole as f64);
    }
    let value: f64 = field.parse().ok()?;
    value.is_finite().then(|| value.round())
}
