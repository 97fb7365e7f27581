use axum::{
    extract::{RawPathParams, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::TenancyConfig;
use crate::database::connection::ConnectionFactory;
use crate::error::ApiError;
use crate::tenancy::models::Identity;
use crate::tenancy::resolver::{ResolutionError, TenantResolver};

/// Where to look for the tenant slug on an inbound request
#[derive(Debug, Clone)]
pub struct TenantExtractionConfig {
    pub header: String,
    pub path_param: String,
    pub query_param: String,
    pub base_domain: Option<String>,
    pub reserved_subdomains: Vec<String>,
}

impl Default for TenantExtractionConfig {
    fn default() -> Self {
        Self {
            header: "x-tenant-slug".to_string(),
            path_param: "tenant".to_string(),
            query_param: "tenant".to_string(),
            base_domain: None,
            reserved_subdomains: ["www", "api", "admin", "app"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&TenancyConfig> for TenantExtractionConfig {
    fn from(config: &TenancyConfig) -> Self {
        Self {
            header: config.tenant_header.to_lowercase(),
            path_param: config.path_param.clone(),
            query_param: config.query_param.clone(),
            base_domain: config
                .base_domain
                .as_ref()
                .map(|d| d.trim_start_matches('.').to_lowercase()),
            reserved_subdomains: config.reserved_subdomains.iter().map(|s| s.to_lowercase()).collect(),
        }
    }
}

/// Pick the tenant slug: header, then path parameter, then query
/// parameter, then the leftmost host label. Blank values are skipped.
pub fn extract_tenant_slug(
    config: &TenantExtractionConfig,
    headers: &HeaderMap,
    path_value: Option<&str>,
    query: Option<&str>,
) -> Option<String> {
    let from_header = headers
        .get(config.header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let from_query = || {
        query.and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == config.query_param.as_str())
                .map(|(_, value)| value.into_owned())
        })
    };

    let from_host = || {
        headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .and_then(|host| subdomain_slug(config, host))
    };

    [from_header, path_value.map(str::to_string)]
        .into_iter()
        .flatten()
        .chain(std::iter::once_with(from_query).flatten())
        .chain(std::iter::once_with(from_host).flatten())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn subdomain_slug(config: &TenantExtractionConfig, host: &str) -> Option<String> {
    let host = strip_port(host).trim_end_matches('.').to_lowercase();
    if host.parse::<IpAddr>().is_ok() {
        return None;
    }

    let label = match config.base_domain.as_deref() {
        Some(base) => {
            let prefix = host.strip_suffix(base)?.strip_suffix('.')?;
            prefix.rsplit('.').next()?.to_string()
        }
        None => {
            let labels: Vec<&str> = host.split('.').collect();
            if labels.len() < 3 {
                return None;
            }
            labels[0].to_string()
        }
    };

    if label.is_empty() || config.reserved_subdomains.iter().any(|r| *r == label) {
        return None;
    }
    Some(label)
}

fn strip_port(host: &str) -> &str {
    // bracketed IPv6 literal
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Resolver and extraction rules shared by the tenant middleware
pub struct TenantState<F: ConnectionFactory> {
    pub resolver: Arc<TenantResolver<F>>,
    pub extraction: Arc<TenantExtractionConfig>,
}

impl<F: ConnectionFactory> Clone for TenantState<F> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            extraction: self.extraction.clone(),
        }
    }
}

/// Resolves the request's tenant and attaches a `TenantContext`.
/// Must run after `jwt_auth_middleware`.
pub async fn resolve_tenant_middleware<F: ConnectionFactory>(
    State(state): State<TenantState<F>>,
    path_params: Option<RawPathParams>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request
        .extensions()
        .get::<Identity>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required before tenant resolution"))?;

    let path_value = path_params.as_ref().and_then(|params| {
        params
            .iter()
            .find(|(key, _)| *key == state.extraction.path_param)
            .map(|(_, value)| value.to_string())
    });

    let slug = extract_tenant_slug(
        &state.extraction,
        request.headers(),
        path_value.as_deref(),
        request.uri().query(),
    )
    .ok_or(ResolutionError::TenantNotSpecified)?;

    let context = state.resolver.resolve(&identity, &slug).await?;
    tracing::debug!("Request routed to tenant {} ({})", context.tenant_slug, context.tenant_id);

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
