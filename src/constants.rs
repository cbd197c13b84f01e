//! Namespace, index, and identifier constants for the confirmation core.

/// Cache namespace for all pending-action keys.
///
/// Every key this crate writes is prefixed `confirmation:` by the cache
/// provider, isolating the subsystem from other cache consumers.
pub const CONFIRMATION_NAMESPACE: &str = "confirmation";

/// Secondary index mapping a user to the set of their pending action ids.
///
/// The physical index key is `confirmation:user_actions:<user_id>`.
pub const USER_ACTIONS_INDEX: &str = "user_actions";

/// Prefix for generated action identifiers.
pub const ACTION_ID_PREFIX: &str = "action_";

/// Number of lowercase hex characters in an action identifier.
///
/// 12 hex chars carry 48 random bits; collision probability is treated
/// as zero at expected concurrency and no explicit check is performed.
pub const ACTION_ID_HEX_LEN: usize = 12;

/// Default time-to-live for pending actions, in seconds (10 minutes).
pub const DEFAULT_ACTION_TTL_SECS: u64 = 600;

/// Default time-to-live for cache entries when the caller does not pass
/// one, in seconds (15 minutes).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 900;
