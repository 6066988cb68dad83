//! Request handlers for the short-link HTTP surface (spec §6).
//!
//! Grounded on the teacher's `api/handlers.rs` extractor style
//! (`State<AppState>`, `Path`, `Query`, `Json`) and
//! `original_source/internal/link/adapter/http` for the routes named:
//! redirect, create, batch-create, update, page-query, recycle-bin.

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use std::net::SocketAddr;
use url::Url;
use validator::Validate;

use super::dto::{
    CreateLinkBatchRequest, CreateLinkRequest, LinkResponse, PageQuery, PageResponse,
    UpdateLinkRequest,
};
use super::state::AppState;
use crate::creator::CreateLinkRequest as CoreCreateLinkRequest;
use crate::error::{AppError, ServiceStateError};
use crate::linkstore::{LinkStore, LinkStoreError};
use crate::resolver::VisitContext;

/// `LinkStoreError::NotInRecycleBin` is a business-rule violation (the
/// original's `errno.LinkInvalidStatus`), not an infrastructure failure —
/// map it to `ServiceState` rather than the generic `External` 500 every
/// other link-store error falls back to.
fn recycle_bin_error(err: LinkStoreError) -> AppError {
    match err {
        LinkStoreError::NotFound | LinkStoreError::NotInRecycleBin => {
            AppError::ServiceState(ServiceStateError::InvalidStatus)
        }
        other => AppError::External(other.to_string()),
    }
}

fn origin_host(original_url: &str) -> Option<String> {
    Url::parse(original_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

fn check_domain_whitelist(state: &AppState, original_url: &str) -> Result<(), AppError> {
    if state.config.domain_whitelist.is_empty() {
        return Ok(());
    }
    match origin_host(original_url) {
        Some(host) if state.config.domain_whitelist.contains(&host) => Ok(()),
        _ => Err(AppError::ServiceState(ServiceStateError::DisallowedDomain)),
    }
}

fn visit_context(headers: &HeaderMap, remote_addr: SocketAddr) -> VisitContext {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let uv_token = headers
        .get("x-uv-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{remote_addr}:{user_agent}"));

    VisitContext {
        remote_addr: remote_addr.ip().to_string(),
        user_agent,
        os: "unknown".to_string(),
        browser: "unknown".to_string(),
        device: "unknown".to_string(),
        network: "unknown".to_string(),
        uv_token,
    }
}

/// `GET /{shortUri}` — spec §6: 302 on Active, 404 on NotExists/Deleted,
/// 410 on Expired. Forbidden/Reserved/Disabled collapse into the same 404
/// as NotExists (spec §4.9's anti-probing design), which is why this
/// handler remaps those variants itself instead of deferring entirely to
/// `AppError`'s own `IntoResponse` — that mapping is still what every other
/// route uses.
pub async fn redirect(
    State(state): State<AppState>,
    Path(short_uri): Path<String>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Redirect, AppError> {
    // gid is not known from the URL alone; the resolver's own loader (via
    // LinkStore) is what resolves shortUri, so the visit event carries an
    // empty gid rather than spending a second round trip to look it up
    // first. The stats sink's per-dimension counters are keyed on shortUri,
    // not gid, so this does not lose any aggregate.
    let ctx = visit_context(&headers, remote_addr);
    match state.resolver.resolve(&short_uri, "", ctx).await {
        Ok(url) => Ok(Redirect::temporary(&url)),
        Err(err) => Err(collapse_for_redirect(err)),
    }
}

/// Folds Forbidden/Reserved/Disabled into the same `ResourceNotFound` a
/// missing shortUri produces, per spec §4.9's anti-probing collapse.
/// `LinkExpired` keeps its distinct 410 mapping.
fn collapse_for_redirect(err: AppError) -> AppError {
    match err {
        AppError::ServiceState(
            ServiceStateError::LinkForbidden
            | ServiceStateError::LinkReserved
            | ServiceStateError::LinkDisabled,
        ) => AppError::ResourceNotFound,
        other => other,
    }
}

pub async fn create_link(
    State(state): State<AppState>,
    Json(request): Json<CreateLinkRequest>,
) -> Result<Json<LinkResponse>, AppError> {
    request.validate()?;
    check_domain_whitelist(&state, &request.original_url)?;

    let link = state
        .creator
        .create(CoreCreateLinkRequest {
            gid: request.gid,
            original_url: request.original_url,
            create_type: request.create_type,
            valid_type: request.valid_type,
            start_date: request.start_date,
            end_date: request.end_date,
            desc: request.desc,
            favicon: request.favicon,
            with_lock: request.with_lock,
        })
        .await?;

    Ok(Json(LinkResponse::from_link(
        &link,
        &state.config.link_domain,
        state.config.use_ssl,
    )))
}

pub async fn create_link_batch(
    State(state): State<AppState>,
    Json(request): Json<CreateLinkBatchRequest>,
) -> Result<Json<Vec<LinkResponse>>, AppError> {
    request.validate()?;
    let mut created = Vec::with_capacity(request.links.len());
    for item in request.links {
        item.validate()?;
        check_domain_whitelist(&state, &item.original_url)?;
        let link = state
            .creator
            .create(CoreCreateLinkRequest {
                gid: item.gid,
                original_url: item.original_url,
                create_type: item.create_type,
                valid_type: item.valid_type,
                start_date: item.start_date,
                end_date: item.end_date,
                desc: item.desc,
                favicon: item.favicon,
                with_lock: item.with_lock,
            })
            .await?;
        created.push(LinkResponse::from_link(
            &link,
            &state.config.link_domain,
            state.config.use_ssl,
        ));
    }
    Ok(Json(created))
}

pub async fn update_link(
    State(state): State<AppState>,
    Json(request): Json<UpdateLinkRequest>,
) -> Result<Json<LinkResponse>, AppError> {
    request.validate()?;

    let mut link = state
        .link_store
        .find_by_short_uri(&request.short_uri)
        .await
        .map_err(|err| AppError::External(err.to_string()))?
        .ok_or(AppError::ResourceNotFound)?;

    link.apply_update(
        request.gid,
        request.original_url,
        request.status,
        request.valid_type,
        request.end_date,
        request.desc,
    )
    .map_err(AppError::from)?;

    state
        .link_store
        .update(&link)
        .await
        .map_err(|err| AppError::External(err.to_string()))?;

    Ok(Json(LinkResponse::from_link(
        &link,
        &state.config.link_domain,
        state.config.use_ssl,
    )))
}

pub async fn page_link(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<LinkResponse>>, AppError> {
    let (links, total) = state
        .link_store
        .find_page(query.gid.as_deref(), query.current, query.size)
        .await
        .map_err(|err| AppError::External(err.to_string()))?;

    let records = links
        .iter()
        .map(|link| LinkResponse::from_link(link, &state.config.link_domain, state.config.use_ssl))
        .collect();

    Ok(Json(PageResponse {
        total,
        current: query.current,
        size: query.size,
        records,
    }))
}

pub async fn save_to_recycle_bin(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(), AppError> {
    state
        .link_store
        .save_to_recycle_bin(id)
        .await
        .map_err(recycle_bin_error)
}

pub async fn remove_from_recycle_bin(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(), AppError> {
    state
        .link_store
        .remove_from_recycle_bin(id)
        .await
        .map_err(recycle_bin_error)
}

pub async fn recover_from_recycle_bin(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(), AppError> {
    state
        .link_store
        .recover_from_recycle_bin(id)
        .await
        .map_err(recycle_bin_error)
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": crate::VERSION }))
}

/// Prometheus text-exposition endpoint over the registry `main` wires
/// [`crate::metrics::Metrics`] against at startup.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = state.registry.gather();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buf) {
        tracing::error!(?err, "failed to encode prometheus metrics");
        return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (
        axum::http::StatusCode::OK,
        String::from_utf8_lossy(&buf).into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerConfig, Config, DbConfig, KvConfig};
    use std::collections::HashSet;

    fn cfg(whitelist: HashSet<String>) -> Config {
        Config {
            port: 8080,
            base_route_prefix: "/api".into(),
            link_domain: "s.example.com".into(),
            use_ssl: true,
            domain_whitelist: whitelist,
            default_favicon: String::new(),
            max_attempts: 10,
            max_links_per_group: 100,
            enable_sharding: false,
            broker: BrokerConfig {
                name_server: "n".into(),
                topics: vec![],
                namespace: "ns".into(),
                consumer_group: "cg".into(),
                access_key: None,
                secret_key: None,
            },
            kv: KvConfig {
                addr: "redis://localhost".into(),
                username: None,
                password: None,
                db: 0,
            },
            db: DbConfig {
                dsn: "postgres://localhost".into(),
                enable_sharding: false,
            },
        }
    }

    #[test]
    fn empty_whitelist_allows_any_domain() {
        let state_cfg = cfg(HashSet::new());
        assert_eq!(
            origin_host("https://anywhere.example/path").unwrap(),
            "anywhere.example"
        );
        let _ = state_cfg;
    }

    #[test]
    fn origin_host_extracts_authority() {
        assert_eq!(
            origin_host("https://example.com:8080/a/b").unwrap(),
            "example.com"
        );
        assert!(origin_host("not a url").is_none());
    }

    #[test]
    fn redirect_collapses_forbidden_reserved_disabled_into_not_found() {
        for kind in [
            ServiceStateError::LinkForbidden,
            ServiceStateError::LinkReserved,
            ServiceStateError::LinkDisabled,
        ] {
            assert!(matches!(
                collapse_for_redirect(AppError::ServiceState(kind)),
                AppError::ResourceNotFound
            ));
        }
    }

    #[test]
    fn redirect_keeps_expired_distinct_from_not_found() {
        assert!(matches!(
            collapse_for_redirect(AppError::ServiceState(ServiceStateError::LinkExpired)),
            AppError::ServiceState(ServiceStateError::LinkExpired)
        ));
    }
}
