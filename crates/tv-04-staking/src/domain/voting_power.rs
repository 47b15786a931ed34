//! # Voting Power
//!
//! ```text
//! vp = ceil( vel² · p² · s · log2(1 + t/180) )
//!
//! vel = s1 / s2        max daily stake, last 10 vs last 90 snapshots (1 without data)
//! p   = 1 − 1/(1 + 4·n) n = number of delegators of the candidate
//! s   = min(pct, cap) · total_tokens · d.shares / c.shares
//! t   = min(average staking date, 180)  in days
//! ```
//!
//! Everything is exact rational arithmetic; the only approximation is
//! [`log2_ratio`], which truncates at a fixed number of bits and is therefore
//! identical on every node.

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use shared_types::{ceil_ratio, log2_ratio, ratio_of, wei_per_token, Amount, Ratio};

/// Upper bound on the staking-age term, in days.
pub const MAX_STAKING_DAYS: i64 = 180;

/// Snapshot windows of the stake-velocity term.
pub const SHORT_VELOCITY_WINDOW: usize = 10;
pub const LONG_VELOCITY_WINDOW: usize = 90;

/// Candidate-level inputs shared by all of its delegations.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFactors {
    /// `min(shares / total, cap)`.
    pub capped_pct: Ratio,
    pub shares: Amount,
    /// `vel²`.
    pub velocity_sq: Ratio,
    /// `p²`.
    pub popularity_sq: Ratio,
}

/// `min(shares / total_shares, cap)`.
pub fn capped_percentage(shares: &Amount, total_shares: &Amount, cap: &Ratio) -> Ratio {
    let pct = ratio_of(shares, total_shares);
    if &pct > cap {
        cap.clone()
    } else {
        pct
    }
}

/// `s1 / s2` from daily snapshots ordered oldest first.
pub fn stake_velocity(daily_amounts: &[Amount]) -> Ratio {
    let max_of = |window: usize| {
        let start = daily_amounts.len().saturating_sub(window);
        daily_amounts[start..]
            .iter()
            .max()
            .cloned()
            .unwrap_or_else(BigInt::zero)
    };
    let s1 = max_of(SHORT_VELOCITY_WINDOW);
    let s2 = max_of(LONG_VELOCITY_WINDOW);
    if s2.is_positive() {
        ratio_of(&s1, &s2)
    } else {
        Ratio::one()
    }
}

/// `1 − 1/(1 + 4·n)`.
pub fn popularity(num_of_delegators: u64) -> Ratio {
    let n = BigInt::from(num_of_delegators);
    Ratio::one() - Ratio::new(BigInt::one(), BigInt::one() + n * 4)
}

impl CandidateFactors {
    pub fn new(
        shares: &Amount,
        total_shares: &Amount,
        cap: &Ratio,
        daily_amounts: &[Amount],
        num_of_delegators: u64,
    ) -> Self {
        let velocity = stake_velocity(daily_amounts);
        let p = popularity(num_of_delegators);
        Self {
            capped_pct: capped_percentage(shares, total_shares, cap),
            shares: shares.clone(),
            velocity_sq: &velocity * &velocity,
            popularity_sq: &p * &p,
        }
    }
}

/// Voting power of one delegation.
///
/// `total_shares` is the stake of every ranked candidate, in wei.
/// Delegations under `min_staking_tokens` whole tokens have no power.
pub fn delegation_voting_power(
    factors: &CandidateFactors,
    total_shares: &Amount,
    delegation_shares: &Amount,
    average_staking_date: i64,
    min_staking_tokens: i64,
) -> i64 {
    if !delegation_shares.is_positive() || !factors.shares.is_positive() {
        return 0;
    }
    if delegation_shares < &(BigInt::from(min_staking_tokens) * wei_per_token()) {
        return 0;
    }

    let total_tokens = Ratio::new(total_shares.clone(), wei_per_token());
    let s = &factors.capped_pct * total_tokens * ratio_of(delegation_shares, &factors.shares);

    let days = average_staking_date.clamp(0, MAX_STAKING_DAYS);
    let age = log2_ratio(
        &(Ratio::one() + Ratio::new(BigInt::from(days), BigInt::from(MAX_STAKING_DAYS))),
    );

    let vp = &factors.velocity_sq * &factors.popularity_sq * s * age;
    ceil_ratio(&vp).to_i64().unwrap_or(i64::MAX)
}
