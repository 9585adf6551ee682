//! Typed client for the REST API.
//!
//! Wraps the endpoints a frontend or integration script needs, attaching the
//! session token once logged in and turning error responses into
//! [`ClientError::Api`] with the server's message.
//!
//! ```no_run
//! # async fn run() -> Result<(), prohub::client::ClientError> {
//! use prohub::client::{ProfessionalSearch, ProhubClient};
//!
//! let mut client = ProhubClient::new("http://localhost:3001".parse()?);
//! client.login("ana@example.com", "correct horse battery").await?;
//!
//! let search = ProfessionalSearch::builder().lat(40.4168).lng(-3.7038).radius_km(5.0).build();
//! let nearby = client.search_professionals(&search).await?;
//! println!("{} professionals within 5 km", nearby.total_count);
//! # Ok(())
//! # }
//! ```

use bon::Builder;
use reqwest::{
    Method, RequestBuilder, StatusCode,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    api::models::{
        auth::{AuthResponse, LoginRequest, MeResponse, RegisterRequest},
        availability::AvailabilityResponse,
        chatbot::{ChatTurn, ChatbotAskRequest, ChatbotAskResponse},
        config::PublicConfig,
        images::ProfileImageResponse,
        messaging::{ConversationCreate, ConversationResponse, MessageCreate, MessageResponse},
        pagination::PaginatedResponse,
        professionals::ProfessionalResponse,
        reservations::{ReservationCreate, ReservationResponse, ReservationUpdate},
        reviews::{ReviewCreate, ReviewResponse},
        services::ServiceResponse,
    },
    types::{CategoryId, ConversationId, ProfessionalId, ReservationId},
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The server answered with a non-success status
    #[error("{status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        /// Field-level messages of a validation failure
        errors: Vec<String>,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http(e) => e.status(),
            ClientError::Url(_) => None,
            ClientError::Api { status, .. } => Some(*status),
        }
    }
}

/// JSON error body. Some errors come back as plain text instead.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    errors: Vec<String>,
}

/// Filters for [`ProhubClient::search_professionals`]
#[derive(Debug, Clone, Default, Builder)]
pub struct ProfessionalSearch {
    #[builder(into)]
    pub q: Option<String>,
    #[builder(into)]
    pub speciality: Option<String>,
    pub category_id: Option<CategoryId>,
    pub min_rating: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl ProfessionalSearch {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(q) = &self.q {
            pairs.push(("q", q.clone()));
        }
        if let Some(speciality) = &self.speciality {
            pairs.push(("speciality", speciality.clone()));
        }
        if let Some(category_id) = self.category_id {
            pairs.push(("categoryId", category_id.to_string()));
        }
        let numbers = [
            ("minRating", self.min_rating),
            ("lat", self.lat),
            ("lng", self.lng),
            ("radiusKm", self.radius_km),
        ];
        pairs.extend(numbers.into_iter().filter_map(|(key, value)| value.map(|v| (key, v.to_string()))));
        if let Some(skip) = self.skip {
            pairs.push(("skip", skip.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Serialize)]
struct Empty {}

pub struct ProhubClient {
    base_url: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl ProhubClient {
    pub fn new(mut base_url: Url) -> Self {
        // `join` replaces the last path segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Self {
            base_url,
            token: None,
            http: crate::http_client(),
        }
    }

    /// Use an existing session token, e.g. one handed over after Google sign-in
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await?;
        debug!(%status, "API request failed");
        let (message, errors) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => (parsed.message, parsed.errors),
            Err(_) if body.trim().is_empty() => (status.canonical_reason().unwrap_or("Request failed").to_string(), Vec::new()),
            Err(_) => (body, Vec::new()),
        };
        Err(ClientError::Api { status, message, errors })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Self::send(self.request(Method::GET, self.url(path)?)).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError> {
        Self::send(self.request(method, self.url(path)?).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let response = self.request(Method::DELETE, self.url(path)?).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status,
            message,
            errors: Vec::new(),
        })
    }

    /// Register and keep the returned session token
    #[instrument(skip_all)]
    pub async fn register(&mut self, request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        let auth: AuthResponse = self.send_json(Method::POST, "/auth/register", request).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    /// Log in and keep the returned session token
    #[instrument(skip_all)]
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self.send_json(Method::POST, "/auth/login", &request).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub fn logout(&mut self) {
        self.token = None;
    }

    pub async fn me(&self) -> Result<MeResponse, ClientError> {
        self.get("/auth/me").await
    }

    pub async fn config(&self) -> Result<PublicConfig, ClientError> {
        self.get("/config").await
    }

    pub async fn search_professionals(
        &self,
        search: &ProfessionalSearch,
    ) -> Result<PaginatedResponse<ProfessionalResponse>, ClientError> {
        let mut url = self.url("/professional")?;
        let pairs = search.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Self::send(self.request(Method::GET, url)).await
    }

    pub async fn get_professional(&self, id: ProfessionalId) -> Result<ProfessionalResponse, ClientError> {
        self.get(&format!("/professional/{id}")).await
    }

    pub async fn list_services(&self, professional_id: ProfessionalId) -> Result<PaginatedResponse<ServiceResponse>, ClientError> {
        let mut url = self.url("/services")?;
        url.query_pairs_mut().append_pair("professionalId", &professional_id.to_string());
        Self::send(self.request(Method::GET, url)).await
    }

    pub async fn list_availability(&self, professional_id: ProfessionalId) -> Result<Vec<AvailabilityResponse>, ClientError> {
        self.get(&format!("/available/professional/{professional_id}")).await
    }

    #[instrument(skip_all)]
    pub async fn create_reservation(&self, reservation: &ReservationCreate) -> Result<ReservationResponse, ClientError> {
        self.send_json(Method::POST, "/reservations", reservation).await
    }

    pub async fn my_reservations(&self) -> Result<PaginatedResponse<ReservationResponse>, ClientError> {
        self.get("/reservations/me").await
    }

    #[instrument(skip_all, fields(reservation_id = %id))]
    pub async fn update_reservation(&self, id: ReservationId, update: &ReservationUpdate) -> Result<ReservationResponse, ClientError> {
        self.send_json(Method::PUT, &format!("/reservations/{id}"), update).await
    }

    pub async fn delete_reservation(&self, id: ReservationId) -> Result<(), ClientError> {
        self.delete(&format!("/reservations/{id}")).await
    }

    pub async fn create_review(&self, review: &ReviewCreate) -> Result<ReviewResponse, ClientError> {
        self.send_json(Method::POST, "/reviews", review).await
    }

    pub async fn professional_reviews(&self, professional_id: ProfessionalId) -> Result<PaginatedResponse<ReviewResponse>, ClientError> {
        self.get(&format!("/professional/{professional_id}/reviews")).await
    }

    pub async fn open_conversation(&self, professional_id: ProfessionalId) -> Result<ConversationResponse, ClientError> {
        self.send_json(Method::POST, "/conversations", &ConversationCreate { professional_id })
            .await
    }

    pub async fn conversations(&self) -> Result<PaginatedResponse<ConversationResponse>, ClientError> {
        self.get("/conversations").await
    }

    pub async fn messages(&self, conversation_id: ConversationId) -> Result<PaginatedResponse<MessageResponse>, ClientError> {
        self.get(&format!("/conversations/{conversation_id}/messages")).await
    }

    pub async fn send_message(&self, conversation_id: ConversationId, body: &str) -> Result<MessageResponse, ClientError> {
        let message = MessageCreate { body: body.to_string() };
        self.send_json(Method::POST, &format!("/conversations/{conversation_id}/messages"), &message)
            .await
    }

    pub async fn mark_read(&self, conversation_id: ConversationId) -> Result<i64, ClientError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Marked {
            marked_read: i64,
        }
        let marked: Marked = self
            .send_json(Method::POST, &format!("/conversations/{conversation_id}/read"), &Empty {})
            .await?;
        Ok(marked.marked_read)
    }

    /// Replace a professional's profile image. `content_type` is the image's MIME
    /// type, e.g. `image/png`.
    #[instrument(skip(self, data), fields(professional_id = %professional_id, size = data.len()))]
    pub async fn upload_profile_image(
        &self,
        professional_id: ProfessionalId,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<ProfileImageResponse, ClientError> {
        let part = Part::bytes(data).file_name(file_name.to_string()).mime_str(content_type)?;
        let form = Form::new().part("file", part);
        let url = self.url(&format!("/upload-img/{professional_id}/profile-image"))?;
        Self::send(self.request(Method::PUT, url).multipart(form)).await
    }

    pub async fn ask_chatbot(&self, question: &str, history: Vec<ChatTurn>) -> Result<String, ClientError> {
        let request = ChatbotAskRequest {
            question: question.to_string(),
            history,
        };
        let response: ChatbotAskResponse = self.send_json(Method::POST, "/chatbot/ask", &request).await?;
        Ok(response.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header, header_regex, method, path, query_param},
    };

    fn user_json() -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "email": "ana@example.com",
            "displayName": "Ana",
            "avatarUrl": null,
            "phone": null,
            "role": "customer",
            "authSource": "native",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z",
            "lastLogin": null,
            "hasPaymentProviderId": false
        })
    }

    #[tokio::test]
    async fn test_login_keeps_token_for_later_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": user_json(),
                "token": "session-token",
                "message": "Login successful"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("authorization", "Bearer session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": user_json(),
                "professional": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = ProhubClient::new(server.uri().parse().unwrap());
        client.login("ana@example.com", "correct horse battery").await.unwrap();
        assert_eq!(client.token(), Some("session-token"));

        let me = client.me().await.unwrap();
        assert_eq!(me.user.email, "ana@example.com");
        assert!(me.professional.is_none());
    }

    #[tokio::test]
    async fn test_error_bodies_are_normalised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reservations"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Invalid reservation",
                "errors": ["serviceId is required", "date is required"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Authentication required"))
            .mount(&server)
            .await;

        let client = ProhubClient::new(server.uri().parse().unwrap()).with_token("stale");

        match client.create_reservation(&ReservationCreate::default()).await {
            Err(ClientError::Api { status, message, errors }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Invalid reservation");
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected API error, got {other:?}"),
        }

        let err = client.me().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(err.to_string(), "401 Unauthorized: Authentication required");
    }

    #[tokio::test]
    async fn test_search_sends_camel_case_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/professional"))
            .and(query_param("q", "plumber"))
            .and(query_param("lat", "40.4168"))
            .and(query_param("lng", "-3.7038"))
            .and(query_param("radiusKm", "5"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [],
                "totalCount": 0,
                "skip": 0,
                "limit": 20
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProhubClient::new(server.uri().parse().unwrap());
        let search = ProfessionalSearch::builder()
            .q("plumber")
            .lat(40.4168)
            .lng(-3.7038)
            .radius_km(5.0)
            .limit(20)
            .build();
        let page = client.search_professionals(&search).await.unwrap();
        assert_eq!(page.total_count, 0);
        assert_eq!(page.limit, 20);
    }

    #[tokio::test]
    async fn test_profile_image_is_sent_as_multipart_file() {
        let server = MockServer::start().await;
        let professional_id = Uuid::new_v4();
        Mock::given(method("PUT"))
            .and(path(format!("/upload-img/{professional_id}/profile-image")))
            .and(header("authorization", "Bearer session-token"))
            .and(header_regex("content-type", "^multipart/form-data; boundary="))
            .and(body_string_contains(r#"name="file"; filename="avatar.png""#))
            .and(body_string_contains("Content-Type: image/png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "professionalId": professional_id,
                "profileImageUrl": "http://localhost:3001/uploads/avatar.png"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("/upload-img/{}/profile-image", Uuid::nil())))
            .respond_with(ResponseTemplate::new(413).set_body_json(json!({ "message": "Image too large" })))
            .mount(&server)
            .await;

        let client = ProhubClient::new(server.uri().parse().unwrap()).with_token("session-token");
        let png = b"\x89PNG\r\n\x1a\n".to_vec();
        let uploaded = client
            .upload_profile_image(professional_id, "avatar.png", "image/png", png.clone())
            .await
            .unwrap();
        assert_eq!(uploaded.professional_id, professional_id);
        assert!(uploaded.profile_image_url.ends_with("avatar.png"));

        let err = client
            .upload_profile_image(Uuid::nil(), "avatar.png", "image/png", png)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::PAYLOAD_TOO_LARGE));
    }

    #[tokio::test]
    async fn test_profile_image_rejects_malformed_content_type() {
        let client = ProhubClient::new("http://localhost:3001".parse().unwrap());
        let err = client
            .upload_profile_image(Uuid::new_v4(), "avatar.png", "not a mime type", vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
    }
}
