use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use switchboard_channel::ChannelId;
use switchboard_core::RequestIdentity;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const GROUP_HEADER: &str = "x-switchboard-group";
pub const USER_HEADER: &str = "x-switchboard-user";
pub const CHANNEL_HEADER: &str = "x-switchboard-channel";

const DEFAULT_GROUP: &str = "default";

/// Who is calling, which group they route through, and an optional pin
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub identity: RequestIdentity,
    pub group: String,
    /// Channel the caller pinned the request to
    pub pinned: Option<ChannelId>,
}

/// Build a [`CallerContext`] from the request headers
///
/// A channel pin is honoured only together with the admin bearer token;
/// without one the header is ignored.
pub async fn identity_middleware(admin_token: Option<SecretString>, mut request: Request, next: Next) -> Response {
    let context = caller_context(request.headers(), admin_token.as_ref());
    request.extensions_mut().insert(context);

    next.run(request).await
}

fn caller_context(headers: &HeaderMap, admin_token: Option<&SecretString>) -> CallerContext {
    let mut identity = match header(headers, REQUEST_ID_HEADER) {
        Some(id) => RequestIdentity::with_request_id(id),
        None => RequestIdentity::anonymous(),
    };
    identity.user_id = header(headers, USER_HEADER).map(str::to_owned);

    let group = header(headers, GROUP_HEADER).unwrap_or(DEFAULT_GROUP).to_owned();

    let pinned = header(headers, CHANNEL_HEADER).and_then(|raw| {
        if !is_admin(headers, admin_token) {
            tracing::debug!(request_id = %identity.request_id, "channel pin without admin token ignored");
            return None;
        }
        raw.parse::<u32>().ok().map(ChannelId::new)
    });

    CallerContext {
        identity,
        group,
        pinned,
    }
}

/// Whether the request carries the configured admin bearer token
pub fn is_admin(headers: &HeaderMap, admin_token: Option<&SecretString>) -> bool {
    let Some(expected) = admin_token else {
        return false;
    };

    let token = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    token == Some(expected.expose_secret())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
