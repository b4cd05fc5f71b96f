//! Reserved token types shared by the ATN and the lookahead analysis.

/// End of input.
pub const EOF: i32 = -1;

/// Marker for "reached the end of the rule without consuming input".
///
/// Only ever appears inside lookahead sets, never in a token stream.
pub const EPSILON: i32 = -2;

/// No token type. Also used as the "hit a predicate" marker in lookahead sets.
pub const INVALID_TYPE: i32 = 0;

/// Smallest token type a grammar may define.
pub const MIN_USER_TOKEN_TYPE: i32 = 1;
