use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use switchboard_channel::ChannelRegistry;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    status: &'static str,
    channels: usize,
    /// Channels currently in rotation
    enabled: usize,
}

/// Health check handler
pub async fn health_handler(State(registry): State<Arc<ChannelRegistry>>) -> Json<HealthReport> {
    let enabled = registry.slots().filter(|slot| slot.status().is_enabled()).count();

    Json(HealthReport {
        status: "ok",
        channels: registry.len(),
        enabled,
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::{Router, routing};
    use http::Request;
    use switchboard_config::{ChannelConfig, ChannelKind, InitialStatus};
    use tower::ServiceExt;

    use super::*;

    fn channel(id: u32, status: InitialStatus) -> ChannelConfig {
        ChannelConfig {
            id,
            name: format!("channel-{id}"),
            kind: ChannelKind::Openai,
            base_url: None,
            api_key: None,
            groups: vec!["default".to_owned()],
            models: vec!["m".to_owned()],
            priority: 0,
            weight: 1,
            auto_ban: true,
            quota_limit: None,
            count_limit: None,
            rpm_limit: None,
            auto_reset: None,
            status,
        }
    }

    #[tokio::test]
    async fn reports_enabled_channels() {
        let registry = ChannelRegistry::from_config(&[
            channel(1, InitialStatus::Enabled),
            channel(2, InitialStatus::ManuallyDisabled),
        ])
        .unwrap();
        let app = Router::new()
            .route("/health", routing::get(health_handler))
            .with_state(Arc::new(registry));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report, serde_json::json!({"status": "ok", "channels": 2, "enabled": 1}));
    }
}
