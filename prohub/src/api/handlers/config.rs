//! HTTP handler for the public frontend configuration.

use axum::{Json, extract::State};

use crate::{AppState, api::models::config::PublicConfig};

#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    summary = "Get config",
    description = "Feature switches for the frontend. Public.",
    responses(
        (status = 200, description = "Public configuration", body = PublicConfig),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_config(State(state): State<AppState>) -> Json<PublicConfig> {
    let config = &state.config;
    Json(PublicConfig {
        google_oauth_enabled: config.auth.google.enabled,
        payments_enabled: config.payment.is_some(),
        chatbot_enabled: config.chatbot.enabled && config.chatbot.base_url.is_some(),
        registration_enabled: config.auth.native.enabled && config.auth.native.allow_registration,
    })
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{create_test_app, create_test_app_with_config, create_test_config};
    use serde_json::Value;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_get_config_is_public(pool: PgPool) {
        let app = create_test_app(pool).await;

        let response = app.get("/config").await;
        response.assert_status_ok();
        let json: Value = response.json();
        assert_eq!(json["paymentsEnabled"], true);
        assert_eq!(json["googleOAuthEnabled"], false);
        assert_eq!(json["chatbotEnabled"], false);
        assert_eq!(json["registrationEnabled"], true);
    }

    #[sqlx::test]
    async fn test_get_config_reflects_settings(pool: PgPool) {
        let mut config = create_test_config();
        config.payment = None;
        config.auth.native.allow_registration = false;
        let app = create_test_app_with_config(pool, config).await;

        let json: Value = app.get("/config").await.json();
        assert_eq!(json["paymentsEnabled"], false);
        assert_eq!(json["registrationEnabled"], false);
    }
}
