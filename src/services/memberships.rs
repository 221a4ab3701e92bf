//! Membership lifecycle and quota bookkeeping

use chrono::Utc;
use rust_decimal::Decimal;

use crate::{
    error::AppResult,
    ledger::{next_recurrence, LedgerPolicy},
    models::{
        membership::{CreateMembership, Membership, MembershipDetails, MembershipInfo},
        user::UserClaims,
    },
    repository::Repository,
};

/// Price of a membership period when none is given
fn default_price() -> Decimal {
    Decimal::new(3500, 2)
}

/// Attach the payments recorded against a membership
pub(crate) async fn with_payments(repository: &Repository, membership: Membership) -> AppResult<MembershipDetails> {
    let transaction_history = repository.payments_list_for_membership(membership.id).await?;
    Ok(MembershipDetails {
        membership,
        transaction_history,
    })
}

#[derive(Clone)]
pub struct MembershipsService {
    repository: Repository,
    policy: LedgerPolicy,
}

impl MembershipsService {
    pub fn new(repository: Repository, policy: LedgerPolicy) -> Self {
        Self { repository, policy }
    }

    /// Member status and quota usage of a user
    pub async fn info(&self, user_id: i32) -> AppResult<MembershipInfo> {
        let membership = self.repository.memberships_get_active(user_id).await?;
        let monthly_books = membership.as_ref().map(|m| m.monthly_books).unwrap_or(0);
        Ok(MembershipInfo {
            member_status: membership.is_some(),
            monthly_books,
            monthly_quota: self.policy.monthly_quota,
            remaining_books: match membership {
                Some(_) => self.policy.remaining_quota(monthly_books),
                None => 0,
            },
            membership,
        })
    }

    /// Open a membership for the caller, or for any user when staff
    pub async fn create(&self, claims: &UserClaims, request: CreateMembership) -> AppResult<Membership> {
        let user_id = request.user_id.unwrap_or(claims.user_id);
        claims.require_self_or_staff(user_id)?;
        // surfaces a 404 for unknown users instead of a foreign key error
        self.repository.users_get_by_id(user_id).await?;

        let start_date = request.start_date.unwrap_or_else(|| Utc::now().date_naive());
        let recurrence = request
            .recurrence
            .unwrap_or_else(|| next_recurrence(start_date, None, self.policy.recurrence_days));

        let membership = self
            .repository
            .memberships_create(
                user_id,
                start_date,
                Some(recurrence),
                request.membership_price.unwrap_or_else(default_price),
            )
            .await?;

        tracing::info!(user_id, membership_id = membership.id, "Membership created");
        Ok(membership)
    }

    /// Move the next billing date one period forward
    pub async fn advance_recurrence(&self, membership_id: i32) -> AppResult<Membership> {
        let membership = self.repository.memberships_get_by_id(membership_id).await?;
        let next = next_recurrence(
            membership.start_date,
            membership.recurrence,
            self.policy.recurrence_days,
        );
        self.repository.memberships_set_recurrence(membership_id, next).await
    }

    pub async fn deactivate(&self, membership_id: i32) -> AppResult<Membership> {
        let membership = self
            .repository
            .memberships_deactivate(membership_id, Utc::now().date_naive())
            .await?;
        tracing::info!(
            user_id = membership.user_id,
            membership_id,
            "Membership deactivated"
        );
        Ok(membership)
    }

    /// Month-end reset of every active membership's free-book counter
    pub async fn reset_quota(&self) -> AppResult<u64> {
        let reset = self.repository.memberships_reset_quota().await?;
        tracing::info!(reset, "Monthly quotas reset");
        Ok(reset)
    }
}
