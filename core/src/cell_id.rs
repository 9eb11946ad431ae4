use std::fmt;

use serde::{Deserialize, Serialize};

pub const CELL_ID_LEN: usize = 7;
pub const CELL_ID_PREFIX: char = 'c';
pub const MAX_CELL_COORD: u32 = 999;

/// Grid coordinate encoded as `c` + 3-digit column + 3-digit row, the way the
/// legacy engine names its `<td>` elements (`c004012` is x=4, y=12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellId {
    pub x: u32,
    pub y: u32,
}

impl CellId {
    pub fn new(x: u32, y: u32) -> Result<Self, CellIdError> {
        if x > MAX_CELL_COORD {
            return Err(CellIdError::OutOfRange { axis: 'x', value: x });
        }
        if y > MAX_CELL_COORD {
            return Err(CellIdError::OutOfRange { axis: 'y', value: y });
        }
        Ok(Self { x, y })
    }

    pub fn parse(value: &str) -> Result<Self, CellIdError> {
        if value.len() != CELL_ID_LEN {
            return Err(CellIdError::InvalidLength {
                expected: CELL_ID_LEN,
                found: value.len(),
            });
        }
        let mut chars = value.chars();
        match chars.next() {
            Some(CELL_ID_PREFIX) => {}
            Some(ch) => return Err(CellIdError::InvalidCharacter { ch, index: 0 }),
            None => {
                return Err(CellIdError::InvalidLength {
                    expected: CELL_ID_LEN,
                    found: 0,
                })
            }
        }
        for (idx, ch) in value.chars().enumerate().skip(1) {
            if !ch.is_ascii_digit() {
                return Err(CellIdError::InvalidCharacter { ch, index: idx });
            }
        }
        let x = value[1..4]
            .parse::<u32>()
            .map_err(|_| CellIdError::InvalidCharacter { ch: '?', index: 1 })?;
        let y = value[4..7]
            .parse::<u32>()
            .map_err(|_| CellIdError::InvalidCharacter { ch: '?', index: 4 })?;
        Ok(Self { x, y })
    }

    pub fn encode(&self) -> String {
        format!("{CELL_ID_PREFIX}{:03}{:03}", self.x, self.y)
    }

    pub fn within(&self, width: u32, height: u32) -> bool {
        self.x < width && self.y < height
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CELL_ID_PREFIX}{:03}{:03}", self.x, self.y)
    }
}

impl std::str::FromStr for CellId {
    type Err = CellIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for CellId {
    type Error = CellIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CellId> for String {
    fn from(value: CellId) -> Self {
        value.encode()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellIdError {
    InvalidLength { expected: usize, found: usize },
    InvalidCharacter { ch: char, index: usize },
    OutOfRange { axis: char, value: u32 },
}

impl fmt::Display for CellIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellIdError::InvalidLength { expected, found } => {
                write!(f, "cell id must be {expected} chars, got {found}")
            }
            CellIdError::InvalidCharacter { ch, index } => {
                write!(f, "invalid character '{ch}' at position {index}")
            }
            CellIdError::OutOfRange { axis, value } => {
                write!(f, "{axis} coordinate {value} exceeds {MAX_CELL_COORD}")
            }
        }
    }
}

impl std::error::Error for CellIdError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_fixed_width() {
        let id = CellId::new(4, 12).unwrap();
        assert_eq!(id.encode(), "c004012");
        assert_eq!(id.to_string(), "c004012");
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert_eq!(
            CellId::parse("c0401"),
            Err(CellIdError::InvalidLength { expected: 7, found: 5 })
        );
        assert_eq!(
            CellId::parse("x004012"),
            Err(CellIdError::InvalidCharacter { ch: 'x', index: 0 })
        );
        assert_eq!(
            CellId::parse("c00a012"),
            Err(CellIdError::InvalidCharacter { ch: 'a', index: 3 })
        );
    }

    #[test]
    fn new_rejects_out_of_range() {
        assert!(CellId::new(1000, 0).is_err());
        assert!(CellId::new(0, 999).is_ok());
    }
}
