use crate::collaborators::{Collaborators, Destination};
use crate::config::PolicyConfig;
use crate::errors::{CollaboratorError, DispatchError, ValidationError};
use crate::metrics_defs::{COLLABORATOR_ERROR, DECISION};
use refdata::campaigns::CampaignCache;
use refdata::types::{Campaign, CampaignId, CarrierInfo};
use shared::counter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub enum FailReason {
    UnknownCampaign,
    UnsupportedCarrier,
    /// The subscriber went through every campaign in rotation.
    Rejected,
    /// The subscriber was rejected but no partner destination is available.
    RedirectUnavailable,
    Invalid(ValidationError),
}

impl FailReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FailReason::UnknownCampaign => "unknown_campaign",
            FailReason::UnsupportedCarrier => "unsupported_carrier",
            FailReason::Rejected => "rejected",
            FailReason::RedirectUnavailable => "redirect_unavailable",
            FailReason::Invalid(_) => "invalid",
        }
    }
}

/// Terminal outcome of dispatching one request.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    ServeCampaign(Arc<Campaign>),
    RedirectToCampaign(Arc<Campaign>),
    RedirectExternal(Destination),
    Fail(FailReason),
}

impl Decision {
    pub const fn outcome(&self) -> &'static str {
        match self {
            Decision::ServeCampaign(_) => "serve",
            Decision::RedirectToCampaign(_) => "redirect_campaign",
            Decision::RedirectExternal(_) => "redirect_external",
            Decision::Fail(reason) => reason.as_str(),
        }
    }
}

/// Everything known about a request once the boundary resolved it.
#[derive(Clone, Debug)]
pub struct DispatchContext {
    pub transaction_id: Uuid,
    pub msisdn: Option<String>,
    pub carrier: CarrierInfo,
    pub campaign: Option<Arc<Campaign>>,
    pub error: Option<ValidationError>,
}

impl DispatchContext {
    pub fn new(carrier: CarrierInfo) -> Self {
        DispatchContext {
            transaction_id: Uuid::new_v4(),
            msisdn: None,
            carrier,
            campaign: None,
            error: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Policy {
    pub rejection_enabled: bool,
    pub campaign_redirect_enabled: bool,
    pub collaborator_timeout: Duration,
}

impl From<&PolicyConfig> for Policy {
    fn from(config: &PolicyConfig) -> Self {
        Policy {
            rejection_enabled: config.rejection_enabled,
            campaign_redirect_enabled: config.campaign_redirect_enabled,
            collaborator_timeout: Duration::from_millis(config.collaborator_timeout_ms),
        }
    }
}

/// Decides what to do with a resolved request.
///
/// Collaborator lookups only ever steer traffic away from the resolved
/// campaign on a definite answer. Errors and timeouts are logged and
/// counted, then the request is served as if the collaborator said nothing.
#[derive(Clone)]
pub struct Dispatcher {
    campaigns: Arc<CampaignCache>,
    collaborators: Collaborators,
    policy: Policy,
}

impl Dispatcher {
    pub fn new(campaigns: Arc<CampaignCache>, collaborators: Collaborators, policy: Policy) -> Self {
        Dispatcher {
            campaigns,
            collaborators,
            policy,
        }
    }

    pub async fn decide(&self, ctx: &DispatchContext) -> Decision {
        let decision = self.decide_inner(ctx).await;
        counter!(DECISION, "outcome" => decision.outcome()).increment(1);
        tracing::debug!(
            transaction_id = %ctx.transaction_id,
            outcome = decision.outcome(),
            operator_code = ctx.carrier.operator_code,
            "Dispatch decision"
        );
        decision
    }

    async fn decide_inner(&self, ctx: &DispatchContext) -> Decision {
        if let Some(error) = &ctx.error {
            return Decision::Fail(FailReason::Invalid(error.clone()));
        }
        let Some(campaign) = ctx.campaign.clone() else {
            return Decision::Fail(FailReason::UnknownCampaign);
        };
        if !ctx.carrier.supported {
            return Decision::Fail(FailReason::UnsupportedCarrier);
        }
        // Both policies are keyed by subscriber.
        let Some(msisdn) = ctx.msisdn.as_deref() else {
            return Decision::ServeCampaign(campaign);
        };

        if self.policy.rejection_enabled {
            let key = campaign.rejection_key();
            let rejected = self
                .call("rejection", self.collaborators.rejection.is_rejected(&key, msisdn))
                .await;

            if let Ok(true) = rejected {
                let destination = self
                    .call(
                        "partner",
                        self.collaborators
                            .partner
                            .get_destination(ctx.carrier.country_code, ctx.carrier.operator_code),
                    )
                    .await;

                return match destination {
                    Ok(Some(destination)) => Decision::RedirectExternal(destination),
                    Ok(None) | Err(_) => Decision::Fail(FailReason::RedirectUnavailable),
                };
            }
        }

        if self.policy.campaign_redirect_enabled {
            let next = self
                .call(
                    "campaign_redirect",
                    self.collaborators
                        .campaign_redirect
                        .get_next_campaign(campaign.id, msisdn),
                )
                .await;

            match next {
                Ok(0) => return Decision::Fail(FailReason::Rejected),
                Ok(id) if id != campaign.id => match self.campaigns.resolve_by_id(id) {
                    Some(other) => return Decision::RedirectToCampaign(other),
                    None => {
                        tracing::warn!(
                            transaction_id = %ctx.transaction_id,
                            campaign_id = id,
                            "Redirect names a campaign that is not active"
                        );
                    }
                },
                Ok(_) | Err(_) => {}
            }
        }

        Decision::ServeCampaign(campaign)
    }

    /// Records a successful serve so the rotation moves on next time.
    ///
    /// Callers await this before answering, so the subscriber's next request
    /// sees the write. The wait is bounded by the collaborator timeout, and a
    /// failed write is only logged and counted.
    pub async fn record_served(&self, ctx: &DispatchContext, campaign: &Campaign) {
        let Some(msisdn) = ctx.msisdn.as_deref() else {
            return;
        };
        if !self.policy.campaign_redirect_enabled {
            return;
        }
        let _ = self
            .call(
                "campaign_redirect",
                self.collaborators
                    .campaign_redirect
                    .set_last_campaign(campaign.id, msisdn),
            )
            .await;
    }

    /// Marks the subscriber as having gone through the campaign's service.
    /// Called by the subscription pipeline once the subscriber is processed.
    pub async fn record_processed(
        &self,
        campaign: &Campaign,
        msisdn: Option<&str>,
    ) -> Result<(), DispatchError> {
        let msisdn = msisdn
            .filter(|m| !m.is_empty())
            .ok_or(ValidationError::MissingMsisdn)?;
        let key = campaign.rejection_key();
        self.call("rejection", self.collaborators.rejection.set_seen(&key, msisdn))
            .await?;
        Ok(())
    }

    /// Same as [`Dispatcher::record_processed`] for callers that only hold
    /// the campaign id.
    pub async fn record_processed_by_id(
        &self,
        campaign_id: CampaignId,
        msisdn: Option<&str>,
    ) -> Result<(), DispatchError> {
        let campaign = self
            .campaigns
            .resolve_by_id(campaign_id)
            .ok_or(DispatchError::NotFound)?;
        self.record_processed(&campaign, msisdn).await
    }

    async fn call<T, F>(&self, collaborator: &'static str, fut: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        let result = tokio::time::timeout(self.policy.collaborator_timeout, fut)
            .await
            .unwrap_or(Err(CollaboratorError::Timeout(collaborator)));

        if let Err(e) = &result {
            counter!(COLLABORATOR_ERROR, "collaborator" => collaborator, "kind" => e.kind())
                .increment(1);
            tracing::warn!(collaborator, error = %e, "Collaborator call failed");
        }
        result
    }
}
