//! Waitlist score formula
//!
//! Lower scores are better. The best attainable score is 1.

use crate::models::{Entrant, ReferralConfig};

/// Upper bound applied to `positions_per_referral` before use
pub const MAX_POSITIONS_PER_REFERRAL: i64 = 100;

/// Best attainable score
pub const MIN_SCORE: i64 = 1;

/// Map signup order and referral counts to an ordinal score.
///
/// `positions_per_referral` is clamped to `[0, 100]` and the result is floored
/// at 1. Saturating arithmetic keeps absurd referral counts from overflowing.
pub fn score(
    original_position: i64,
    referral_count: i64,
    verified_referral_count: i64,
    positions_per_referral: i64,
    verified_only: bool,
) -> i64 {
    let effective_referrals = if verified_only {
        verified_referral_count
    } else {
        referral_count
    }
    .max(0);
    let per_referral = positions_per_referral.clamp(0, MAX_POSITIONS_PER_REFERRAL);

    original_position
        .saturating_sub(effective_referrals.saturating_mul(per_referral))
        .max(MIN_SCORE)
}

/// Score of `entrant` under a campaign's referral config
pub fn entrant_score(entrant: &Entrant, config: &ReferralConfig) -> i64 {
    score(
        entrant.original_position,
        entrant.referral_count,
        entrant.verified_referral_count,
        config.positions_per_referral,
        config.verified_only,
    )
}
