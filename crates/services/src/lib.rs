//! # services
//!
//! The identity & trust policy engine: trust tiers, rate limits, the vote
//! ledger, report moderation, recovery codes, and the [`facade::ActionFacade`]
//! that sequences them for every client action.

pub mod content;
pub mod facade;
pub mod identity;
pub mod media;
pub mod moderation;
pub mod rate_limit;
pub mod recovery;
pub mod trust;
pub mod votes;

pub use facade::{ActionError, ActionFacade, ActionResult, FacadePorts};
pub use moderation::{FixedThreshold, ModerationPolicy, TrustWeighted};
pub use rate_limit::RateLimitTable;
