//! Membership oracle contract and the per-update verification sweep.

use async_trait::async_trait;

use crate::storage::settings::RequiredChannel;

/// Callback action that re-triggers the membership check. The gate lets this
/// one action through even while denying, because its handler performs the
/// identical check and is the only way a user can self-heal.
pub const CONFIRM_ACTION: &str = "membership:confirm";

/// The oracle's answer for one (identity, channel) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Present in the channel (member, admin, owner, or restricted-but-present)
    Member,
    /// Confirmed not present (left or kicked)
    Absent,
    /// The channel itself no longer exists or is permanently inaccessible.
    /// The requirement can never be satisfied; counted as missing and surfaced
    /// to operators so the stale entry can be pruned.
    Gone,
    /// Could not be verified (missing bot rights, network failure, timeout).
    /// Never treated as a pass.
    Indeterminate,
}

/// Queries an external service for a user's status in a channel.
///
/// One call per (identity, channel) per gate evaluation. No caching across
/// evaluations: membership changes between updates, and a stale "allowed" is
/// a worse failure mode than an extra call. No internal retry; the verdict
/// taxonomy is the whole contract and callers decide policy.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn check(&self, identity: i64, channel: i64) -> Verdict;
}

/// Result of sweeping every required channel for one identity.
#[derive(Debug, Default)]
pub struct MembershipReport {
    /// Channels the user is confirmed not to be in (plus unreachable ones)
    pub missing: Vec<RequiredChannel>,
    /// Channels whose membership could not be verified
    pub unverifiable: Vec<RequiredChannel>,
    /// Channels the user is confirmed to be in
    pub satisfied: Vec<RequiredChannel>,
}

impl MembershipReport {
    /// True when every required channel is confirmed satisfied.
    pub fn all_satisfied(&self) -> bool {
        self.missing.is_empty() && self.unverifiable.is_empty()
    }
}

/// Checks the identity against every required channel, one oracle call each.
///
/// Shared between the gate's subscription stage and the confirm-action
/// handler so both produce the same verdict for the same facts.
pub async fn verify_membership(
    oracle: &dyn MembershipOracle,
    identity: i64,
    channels: &[RequiredChannel],
) -> MembershipReport {
    let mut report = MembershipReport::default();

    for channel in channels {
        match oracle.check(identity, channel.channel_id).await {
            Verdict::Member => report.satisfied.push(channel.clone()),
            Verdict::Absent => report.missing.push(channel.clone()),
            Verdict::Gone => {
                log::warn!(
                    "required channel {} ({}) is unreachable — prune it from the list",
                    channel.channel_id,
                    channel.label()
                );
                report.missing.push(channel.clone());
            }
            Verdict::Indeterminate => report.unverifiable.push(channel.clone()),
        }
    }

    report
}
