//! HTTP handler for the assistant proxy.

use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::chatbot::{ChatbotAskRequest, ChatbotAskResponse},
    chatbot::ChatbotClient,
    errors::Result,
};

#[utoipa::path(
    post,
    path = "/chatbot/ask",
    tag = "chatbot",
    summary = "Ask the assistant",
    description = "Forwards the question, with recent history, to the configured chat-completions API.",
    request_body = ChatbotAskRequest,
    responses(
        (status = 200, description = "Assistant answer", body = ChatbotAskResponse),
        (status = 400, description = "Empty or oversized question"),
        (status = 503, description = "Assistant disabled or unavailable"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn ask(State(state): State<AppState>, Json(request): Json<ChatbotAskRequest>) -> Result<Json<ChatbotAskResponse>> {
    let client = ChatbotClient::from_config(&state.config.chatbot)?;
    let answer = client.ask(&request.question, &request.history).await?;
    Ok(Json(ChatbotAskResponse { answer }))
}
