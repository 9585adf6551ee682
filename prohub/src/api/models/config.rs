//! Public configuration exposed to the frontend.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Feature switches the frontend needs before anyone signs in
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    #[serde(rename = "googleOAuthEnabled")]
    pub google_oauth_enabled: bool,
    pub payments_enabled: bool,
    pub chatbot_enabled: bool,
    pub registration_enabled: bool,
}
