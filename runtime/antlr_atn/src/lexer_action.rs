//! Lexer actions referenced by action transitions in lexer ATNs.

use std::fmt;

/// Serialized lexer action type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LexerActionType {
    Channel = 0,
    Custom = 1,
    Mode = 2,
    More = 3,
    PopMode = 4,
    PushMode = 5,
    Skip = 6,
    Type = 7,
}

impl LexerActionType {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => LexerActionType::Channel,
            1 => LexerActionType::Custom,
            2 => LexerActionType::Mode,
            3 => LexerActionType::More,
            4 => LexerActionType::PopMode,
            5 => LexerActionType::PushMode,
            6 => LexerActionType::Skip,
            7 => LexerActionType::Type,
            _ => return None,
        })
    }

    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// A command the lexer runs when a token is matched.
///
/// The payload-free actions (`More`, `PopMode`, `Skip`) are plain values,
/// so every table entry of that kind compares equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LexerAction {
    /// `-> channel(n)`
    Channel(i32),
    /// Embedded target-language action, dispatched to the generated lexer.
    Custom { rule_index: i32, action_index: i32 },
    /// `-> mode(n)`
    Mode(i32),
    /// `-> more`
    More,
    /// `-> popMode`
    PopMode,
    /// `-> pushMode(n)`
    PushMode(i32),
    /// `-> skip`
    Skip,
    /// `-> type(n)`
    Type(i32),
}

impl LexerAction {
    /// Build an action from its serialized form.
    pub fn from_parts(action_type: LexerActionType, data1: i32, data2: i32) -> Self {
        match action_type {
            LexerActionType::Channel => LexerAction::Channel(data1),
            LexerActionType::Custom => LexerAction::Custom {
                rule_index: data1,
                action_index: data2,
            },
            LexerActionType::Mode => LexerAction::Mode(data1),
            LexerActionType::More => LexerAction::More,
            LexerActionType::PopMode => LexerAction::PopMode,
            LexerActionType::PushMode => LexerAction::PushMode(data1),
            LexerActionType::Skip => LexerAction::Skip,
            LexerActionType::Type => LexerAction::Type(data1),
        }
    }

    pub fn action_type(&self) -> LexerActionType {
        match self {
            LexerAction::Channel(_) => LexerActionType::Channel,
            LexerAction::Custom { .. } => LexerActionType::Custom,
            LexerAction::Mode(_) => LexerActionType::Mode,
            LexerAction::More => LexerActionType::More,
            LexerAction::PopMode => LexerActionType::PopMode,
            LexerAction::PushMode(_) => LexerActionType::PushMode,
            LexerAction::Skip => LexerActionType::Skip,
            LexerAction::Type(_) => LexerActionType::Type,
        }
    }

    /// The two serialized data fields, `-1` where unused.
    pub fn data(&self) -> (i32, i32) {
        match *self {
            LexerAction::Channel(n)
            | LexerAction::Mode(n)
            | LexerAction::PushMode(n)
            | LexerAction::Type(n) => (n, -1),
            LexerAction::Custom {
                rule_index,
                action_index,
            } => (rule_index, action_index),
            LexerAction::More | LexerAction::PopMode | LexerAction::Skip => (-1, -1),
        }
    }

    /// Whether the action depends on the input position it runs at.
    ///
    /// Only custom actions do; they must run at the end of the token.
    pub fn is_position_dependent(&self) -> bool {
        matches!(self, LexerAction::Custom { .. })
    }
}

impl fmt::Display for LexerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerAction::Channel(n) => write!(f, "channel({n})"),
            LexerAction::Custom {
                rule_index,
                action_index,
            } => write!(f, "custom({rule_index}, {action_index})"),
            LexerAction::Mode(n) => write!(f, "mode({n})"),
            LexerAction::More => write!(f, "more"),
            LexerAction::PopMode => write!(f, "popMode"),
            LexerAction::PushMode(n) => write!(f, "pushMode({n})"),
            LexerAction::Skip => write!(f, "skip"),
            LexerAction::Type(n) => write!(f, "type({n})"),
        }
    }
}
