//! Yard positions: the fixed crane drop points and validated saddle slots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rows in the yard and the highest vertical position each one holds.
pub const YARD_ROWS: [(char, u8); 10] = [
    ('A', 15),
    ('B', 9),
    ('C', 9),
    ('D', 18),
    ('E', 9),
    ('F', 12),
    ('O', 12),
    ('R', 5),
    ('P', 17),
    ('N', 8),
];

/// Column letters run `A..=K`.
pub const FIRST_COLUMN: char = 'A';
pub const LAST_COLUMN: char = 'K';

/// Coils stack at most three high.
pub const MAX_STACK: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location must look like ROW-COLn-STACK, got {0:?}")]
    Format(String),
    #[error("unknown yard row {0:?}")]
    UnknownRow(String),
    #[error("column {0:?} outside {FIRST_COLUMN}..={LAST_COLUMN}")]
    Column(char),
    #[error("position {value} outside 1..={max} for row {row}")]
    Vertical { row: char, value: u8, max: u8 },
    #[error("stack level {0} outside 1..={MAX_STACK}")]
    Stack(u8),
    #[error("unknown drop location {0:?}")]
    UnknownDrop(String),
}

// =============================================================================
// DROP LOCATION
// =============================================================================

/// Where a crane task may deliver a coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropLocation {
    #[serde(rename = "Road-1")]
    Road1,
    #[serde(rename = "Road-2")]
    Road2,
    #[serde(rename = "Road-3")]
    Road3,
}

impl DropLocation {
    pub const ALL: [Self; 3] = [Self::Road1, Self::Road2, Self::Road3];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Road1 => "Road-1",
            Self::Road2 => "Road-2",
            Self::Road3 => "Road-3",
        }
    }
}

impl fmt::Display for DropLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DropLocation {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|drop| drop.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| LocationError::UnknownDrop(trimmed.to_owned()))
    }
}

// =============================================================================
// SADDLE LOCATION
// =============================================================================

/// A validated saddle slot such as `A-B3-2` (row A, column B, position 3,
/// stack level 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SaddleLocation {
    row: char,
    column: char,
    position: u8,
    stack: u8,
}

impl SaddleLocation {
    #[must_use]
    pub fn row(self) -> char {
        self.row
    }

    #[must_use]
    pub fn column(self) -> char {
        self.column
    }

    #[must_use]
    pub fn position(self) -> u8 {
        self.position
    }

    #[must_use]
    pub fn stack(self) -> u8 {
        self.stack
    }
}

/// Highest vertical position for a yard row, if the row exists.
#[must_use]
pub fn row_capacity(row: char) -> Option<u8> {
    YARD_ROWS.iter().find(|(name, _)| *name == row).map(|(_, max)| *max)
}

impl FromStr for SaddleLocation {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_err = || LocationError::Format(s.to_owned());

        let mut parts = s.split('-');
        let (Some(row_part), Some(column_part), Some(stack_part), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format_err());
        };

        let mut row_chars = row_part.chars();
        let (Some(row), None) = (row_chars.next(), row_chars.next()) else {
            return Err(LocationError::UnknownRow(row_part.to_owned()));
        };
        let max = row_capacity(row).ok_or_else(|| LocationError::UnknownRow(row_part.to_owned()))?;

        let mut column_chars = column_part.chars();
        let column = column_chars.next().ok_or_else(format_err)?;
        let position = column_chars.as_str().parse::<u8>().map_err(|_| format_err())?;
        let stack = stack_part.parse::<u8>().map_err(|_| format_err())?;

        if !(FIRST_COLUMN..=LAST_COLUMN).contains(&column) {
            return Err(LocationError::Column(column));
        }
        if position < 1 || position > max {
            return Err(LocationError::Vertical { row, value: position, max });
        }
        if stack < 1 || stack > MAX_STACK {
            return Err(LocationError::Stack(stack));
        }

        Ok(Self { row, column, position, stack })
    }
}

impl TryFrom<String> for SaddleLocation {
    type Error = LocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SaddleLocation> for String {
    fn from(value: SaddleLocation) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SaddleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}{}-{}", self.row, self.column, self.position, self.stack)
    }
}

#[cfg(test)]
#[path = "location_test.rs"]
mod tests;
