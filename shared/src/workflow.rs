//! Status workflows
//!
//! Every document in the ERP carries a status string. The enums declared with
//! [`string_enum!`] give those strings a type, and [`Workflow`] lists which
//! status may follow which, so guards are checked in one place.

use std::fmt::Display;

use thiserror::Error;

/// A string did not name any variant of the target enum
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// A status change that the workflow does not permit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{entity} cannot move from '{from}' to '{to}'")]
    NotAllowed {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} is '{current}', expected one of: {expected}")]
    UnexpectedStatus {
        entity: &'static str,
        current: String,
        expected: String,
    },

    #[error(transparent)]
    Unknown(#[from] UnknownVariant),
}

/// Declares a status enum backed by fixed strings.
///
/// Generates serde renames, `as_str`, `Display`, `FromStr` and an `ALL` table.
#[macro_export]
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::workflow::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::workflow::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// A status enum with an explicit transition table
pub trait Workflow: Copy + PartialEq + Display + 'static {
    /// Entity name used in error messages
    const ENTITY: &'static str;

    /// Statuses reachable in one step from `self`
    fn allowed_next(&self) -> &'static [Self];

    fn can_transition_to(&self, next: Self) -> bool {
        self.allowed_next().contains(&next)
    }

    fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }
}

/// Check a single transition against the workflow table
pub fn ensure_transition<W: Workflow>(from: W, to: W) -> Result<(), TransitionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError::NotAllowed {
            entity: W::ENTITY,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Check that a document sits in one of the statuses an operation accepts
pub fn ensure_one_of<W: Workflow>(current: W, expected: &[W]) -> Result<(), TransitionError> {
    if expected.contains(&current) {
        Ok(())
    } else {
        Err(TransitionError::UnexpectedStatus {
            entity: W::ENTITY,
            current: current.to_string(),
            expected: expected
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Parse a stored status string
pub fn parse_status<W>(value: &str) -> Result<W, TransitionError>
where
    W: Workflow + std::str::FromStr<Err = UnknownVariant>,
{
    value.parse::<W>().map_err(TransitionError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::string_enum! {
        pub enum Door ("door status") {
            Open => "open",
            Closed => "closed",
            Locked => "locked",
        }
    }

    impl Workflow for Door {
        const ENTITY: &'static str = "door";

        fn allowed_next(&self) -> &'static [Self] {
            match self {
                Door::Open => &[Door::Closed],
                Door::Closed => &[Door::Open, Door::Locked],
                Door::Locked => &[],
            }
        }
    }

    #[test]
    fn test_round_trip_strings() {
        for door in Door::ALL {
            assert_eq!(door.as_str().parse::<Door>().unwrap(), *door);
        }
        assert!("ajar".parse::<Door>().is_err());
    }

    #[test]
    fn test_transition_table() {
        assert!(ensure_transition(Door::Open, Door::Closed).is_ok());
        assert!(ensure_transition(Door::Open, Door::Locked).is_err());
        assert!(Door::Locked.is_terminal());
    }

    #[test]
    fn test_error_messages() {
        let err = ensure_transition(Door::Locked, Door::Open).unwrap_err();
        assert_eq!(err.to_string(), "door cannot move from 'locked' to 'open'");

        let err = ensure_one_of(Door::Open, &[Door::Closed, Door::Locked]).unwrap_err();
        assert_eq!(err.to_string(), "door is 'open', expected one of: closed, locked");
    }

    #[test]
    fn test_parse_status_unknown() {
        let err = parse_status::<Door>("ajar").unwrap_err();
        assert!(matches!(err, TransitionError::Unknown(_)));
    }
}
