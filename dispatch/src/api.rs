use crate::config::Config;
use crate::decision::{Decision, DispatchContext, Dispatcher};
use crate::metrics_defs::REQUEST_DURATION;
use crate::request::{candidate_ips, header_msisdn, normalize_msisdn, validate_hash};
use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use refdata::campaigns::CampaignCache;
use refdata::carrier::CarrierResolver;
use refdata::types::{Campaign, CampaignId, CarrierInfo, CountryCode, OperatorCode};
use serde::{Deserialize, Serialize};
use shared::histogram;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use url::Url;
use uuid::Uuid;

const TRANSACTION_ID_HEADER: &str = "x-transaction-id";

/// Settings the handlers need from the dispatch configuration.
#[derive(Debug)]
pub struct Settings {
    pub campaign_hash_length: usize,
    pub fallback_url: Url,
    pub msisdn_headers: Vec<String>,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Settings {
            campaign_hash_length: config.campaign_hash_length,
            fallback_url: config.fallback_url.clone(),
            msisdn_headers: config.msisdn_headers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub resolver: CarrierResolver,
    pub campaigns: Arc<CampaignCache>,
    pub dispatcher: Dispatcher,
    pub settings: Arc<Settings>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/lp/{link}", get(link_handler))
        .route("/h/{hash}", get(hash_handler))
        .route("/processed/{campaign_id}", post(processed_handler))
        .with_state(state)
}

#[derive(Deserialize, Debug, Default)]
struct Params {
    msisdn: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ProcessedBody {
    msisdn: Option<String>,
}

#[derive(Serialize)]
struct ServeResponse {
    transaction_id: Uuid,
    msisdn: Option<String>,
    campaign: CampaignBody,
    carrier: CarrierBody,
}

#[derive(Serialize)]
struct CampaignBody {
    id: CampaignId,
    link: String,
    hash: String,
    welcome_page_id: u64,
    success_page_id: u64,
    error_page_id: u64,
    can_auto_click: bool,
}

impl From<&Campaign> for CampaignBody {
    fn from(campaign: &Campaign) -> Self {
        CampaignBody {
            id: campaign.id,
            link: campaign.link.clone(),
            hash: campaign.hash.clone(),
            welcome_page_id: campaign.welcome_page_id,
            success_page_id: campaign.success_page_id,
            error_page_id: campaign.error_page_id,
            can_auto_click: campaign.can_auto_click,
        }
    }
}

#[derive(Serialize)]
struct CarrierBody {
    ip: Option<Ipv4Addr>,
    operator_code: OperatorCode,
    country_code: CountryCode,
    resolved_via: &'static str,
}

impl From<&CarrierInfo> for CarrierBody {
    fn from(carrier: &CarrierInfo) -> Self {
        CarrierBody {
            ip: carrier.ip,
            operator_code: carrier.operator_code,
            country_code: carrier.country_code,
            resolved_via: carrier.resolved_via.as_str(),
        }
    }
}

enum Lookup {
    Link(String),
    Hash(String),
}

async fn link_handler(
    State(state): State<AppState>,
    Path(link): Path<String>,
    Query(params): Query<Params>,
    request: Request,
) -> Response {
    dispatch(state, Lookup::Link(link), params, request).await
}

async fn hash_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Query(params): Query<Params>,
    request: Request,
) -> Response {
    dispatch(state, Lookup::Hash(hash), params, request).await
}

/// Called by the subscription pipeline once a subscriber went through the
/// campaign's service.
async fn processed_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<CampaignId>,
    Json(body): Json<ProcessedBody>,
) -> Response {
    let msisdn = body.msisdn.as_deref().and_then(normalize_msisdn);
    match state
        .dispatcher
        .record_processed_by_id(campaign_id, msisdn.as_deref())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::debug!(campaign_id, error = %e, "Could not record processed subscriber");
            e.status_code().into_response()
        }
    }
}

async fn dispatch(state: AppState, lookup: Lookup, params: Params, request: Request) -> Response {
    let started = Instant::now();
    let ctx = build_context(&state, lookup, params, request.headers(), peer_addr(&request));
    let decision = state.dispatcher.decide(&ctx).await;

    if let Decision::ServeCampaign(campaign) = &decision {
        state.dispatcher.record_served(&ctx, campaign).await;
    }

    histogram!(REQUEST_DURATION, "outcome" => decision.outcome())
        .record(started.elapsed().as_secs_f64());

    respond(&state.settings, &ctx, decision)
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn build_context(
    state: &AppState,
    lookup: Lookup,
    params: Params,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> DispatchContext {
    let ips = candidate_ips(headers, peer);
    let (carrier, msisdn) = state.resolver.resolve_with(&ips, |range_headers| {
        header_msisdn(headers, range_headers)
            .or_else(|| header_msisdn(headers, &state.settings.msisdn_headers))
            .or_else(|| params.msisdn.as_deref().and_then(normalize_msisdn))
    });

    let mut ctx = DispatchContext {
        msisdn,
        ..DispatchContext::new(carrier)
    };
    match lookup {
        Lookup::Link(link) => ctx.campaign = state.campaigns.resolve_by_link(&link),
        Lookup::Hash(hash) => match validate_hash(&hash, state.settings.campaign_hash_length) {
            Ok(()) => ctx.campaign = state.campaigns.resolve_by_hash(&hash),
            Err(e) => ctx.error = Some(e),
        },
    }
    ctx
}

fn respond(settings: &Settings, ctx: &DispatchContext, decision: Decision) -> Response {
    let mut response = match decision {
        Decision::ServeCampaign(campaign) => {
            let body = ServeResponse {
                transaction_id: ctx.transaction_id,
                msisdn: ctx.msisdn.clone(),
                campaign: campaign.as_ref().into(),
                carrier: (&ctx.carrier).into(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Decision::RedirectToCampaign(campaign) => match landing_path(&campaign.link) {
            Some(path) => redirect(&path),
            None => redirect(settings.fallback_url.as_str()),
        },
        Decision::RedirectExternal(destination) => redirect(&destination.url),
        Decision::Fail(reason) => {
            tracing::debug!(
                transaction_id = %ctx.transaction_id,
                reason = reason.as_str(),
                "Sending request to fallback"
            );
            redirect(settings.fallback_url.as_str())
        }
    };

    if let Ok(value) = HeaderValue::from_str(&ctx.transaction_id.to_string()) {
        response.headers_mut().insert(TRANSACTION_ID_HEADER, value);
    }
    response
}

/// Landing page path of `link`, percent-encoded as a single path segment.
fn landing_path(link: &str) -> Option<String> {
    let mut url = Url::parse("http://localhost/lp").ok()?;
    url.path_segments_mut().ok()?.push(link);
    Some(url.path().to_string())
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::warn!(location, "Redirect location is not a valid header value");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
