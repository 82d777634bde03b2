use std::fmt;
use std::str::FromStr;

use crate::application::errors::StorageError;

/// Primary per-sender fields, as opposed to ephemeral attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SenderId,
    Action,
    Lang,
    LastUse,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::SenderId, Field::Action, Field::Lang, Field::LastUse];

    pub fn column(&self) -> &'static str {
        match self {
            Field::SenderId => "sender_id",
            Field::Action => "action",
            Field::Lang => "lang",
            Field::LastUse => "last_use",
        }
    }
}

impl FromStr for Field {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.column() == s)
            .ok_or_else(|| StorageError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_columns() {
        assert_eq!("lang".parse::<Field>().unwrap(), Field::Lang);
        assert_eq!("last_use".parse::<Field>().unwrap(), Field::LastUse);
    }

    #[test]
    fn rejects_unknown_columns() {
        let err = "action; DROP TABLE".parse::<Field>().unwrap_err();
        assert!(matches!(err, StorageError::UnknownField(_)));
    }
}
