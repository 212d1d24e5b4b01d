//! Trust classifier: maps an externally maintained trust score to a tier.

use domains::models::TrustTier;

/// Score at or above which a user is tier2.
pub const TIER2_MIN_SCORE: i32 = 2;
/// Score at or above which a user is tier3.
pub const TIER3_MIN_SCORE: i32 = 5;

/// Pure and total: every score, including negative ones, maps to a tier.
pub fn classify(trust_score: i32) -> TrustTier {
    if trust_score >= TIER3_MIN_SCORE {
        TrustTier::Tier3
    } else if trust_score >= TIER2_MIN_SCORE {
        TrustTier::Tier2
    } else {
        TrustTier::Tier1
    }
}

/// Weight a reporter of this tier carries in trust-weighted moderation.
pub fn report_weight(tier: TrustTier) -> u64 {
    match tier {
        TrustTier::Tier1 => 1,
        TrustTier::Tier2 => 2,
        TrustTier::Tier3 => 3,
    }
}
