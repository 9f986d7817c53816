// 🅿️ Space - a single parking position
//
// Internally a space is a zero-based (row, column) pair. The store and the
// screens use the 1-based label "F<row>,C<column>" (fila / columna), e.g. the
// top-left space (0, 0) is "F1,C1".

use crate::error::ParkingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Space {
    pub row: usize,
    pub column: usize,
}

impl Space {
    pub fn new(row: usize, column: usize) -> Self {
        Space { row, column }
    }

    /// Encoded label, as stored in occupancy records
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{},C{}", self.row + 1, self.column + 1)
    }
}

impl FromStr for Space {
    type Err = ParkingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || ParkingError::MalformedSpaceEncoding {
            raw: raw.to_string(),
        };

        let (row_part, column_part) = raw.trim().split_once(',').ok_or_else(malformed)?;
        let row = parse_index(row_part, 'F').ok_or_else(malformed)?;
        let column = parse_index(column_part, 'C').ok_or_else(malformed)?;

        Ok(Space { row, column })
    }
}

/// Strip the prefix and the 1-based offset: "F3" -> 2
fn parse_index(part: &str, prefix: char) -> Option<usize> {
    let digits = part.trim().strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok()?.checked_sub(1)
}
