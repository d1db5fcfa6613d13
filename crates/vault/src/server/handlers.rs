//! Axum request handlers for all service endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use common::protocol::{
    ErrorResponse, FieldsRequest, FieldsResponse, MasterKeyRotationResponse,
    RotationCheckRequest, RotationCheckResponse, StatusResponse,
};

use super::{error::ApiError, state::AppState};

/// `POST /fields/encrypt`: replace the named fields with serialized envelopes.
pub async fn encrypt_fields(
    State(state): State<AppState>,
    Json(req): Json<FieldsRequest>,
) -> Result<Json<FieldsResponse>, ApiError> {
    let record = state.fields.encrypt_fields(&req.record, &req.fields).await?;
    Ok(Json(FieldsResponse { record }))
}

/// `POST /fields/decrypt`: restore fields that carry a `_encrypted` marker.
pub async fn decrypt_fields(
    State(state): State<AppState>,
    Json(req): Json<FieldsRequest>,
) -> Result<Json<FieldsResponse>, ApiError> {
    let record = state.fields.decrypt_fields(&req.record, &req.fields).await?;
    Ok(Json(FieldsResponse { record }))
}

/// `GET /status`: configuration snapshot. Always `200 OK`.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse::clone(&state.status))
}

/// `POST /rotation/check`: evaluate the rotation policy for a given creation time.
pub async fn rotation_check(
    State(state): State<AppState>,
    Json(req): Json<RotationCheckRequest>,
) -> Json<RotationCheckResponse> {
    let verdict = state.policy.evaluate(req.created_at, Utc::now());
    Json(RotationCheckResponse {
        age_days: verdict.age_days,
        threshold_days: verdict.threshold_days,
        due: verdict.due,
    })
}

/// `GET /rotation/master-key`: describe the master key and evaluate its age.
///
/// A key service that does not report a creation date is never due.
pub async fn master_key_rotation(
    State(state): State<AppState>,
) -> Result<Json<MasterKeyRotationResponse>, ApiError> {
    let info = state.kms().describe_master_key().await?;
    let verdict = info
        .created_at
        .map(|created| state.policy.evaluate(created, Utc::now()));
    Ok(Json(MasterKeyRotationResponse {
        key_id: info.key_id,
        created_at: info.created_at,
        age_days: verdict.map(|v| v.age_days),
        threshold_days: state.policy.threshold_days,
        due: verdict.is_some_and(|v| v.due),
    }))
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum_test::TestServer;
    use chrono::Duration;
    use envelope::crypto::{EncryptedEnvelope, NONCE_LEN};
    use envelope::kms::{
        DataKeyPair, KeyService, KeyServiceError, LocalKeyService, MasterKeyInfo, UnwrappedKey,
    };
    use serde_json::{json, Value};

    use crate::server::router;

    fn server(state: AppState) -> TestServer {
        TestServer::new(router::build(state)).unwrap()
    }

    /// Key service whose every call fails at the transport level.
    struct Unreachable;

    #[async_trait]
    impl KeyService for Unreachable {
        async fn generate_data_key(&self) -> Result<DataKeyPair, KeyServiceError> {
            Err(KeyServiceError::Unavailable("connection refused".into()))
        }
        async fn unwrap_data_key(&self, _: &[u8]) -> Result<UnwrappedKey, KeyServiceError> {
            Err(KeyServiceError::Unavailable("connection refused".into()))
        }
        async fn describe_master_key(&self) -> Result<MasterKeyInfo, KeyServiceError> {
            Err(KeyServiceError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_round_trip() {
        let server = server(AppState::default());
        let record = json!({ "name": "Avery", "ssn": "123-45-6789", "visits": 3 });

        let encrypted = server
            .post("/fields/encrypt")
            .json(&json!({ "record": record, "fields": ["ssn", "visits"] }))
            .await;
        encrypted.assert_status_ok();
        let stored: FieldsResponse = encrypted.json();
        assert_eq!(stored.record["ssn_encrypted"], true);
        assert_eq!(stored.record["visits_encrypted"], true);
        assert_eq!(stored.record["name"], "Avery");

        let decrypted = server
            .post("/fields/decrypt")
            .json(&json!({ "record": stored.record, "fields": ["ssn", "visits"] }))
            .await;
        decrypted.assert_status_ok();
        let restored: FieldsResponse = decrypted.json();
        assert_eq!(Value::Object(restored.record), record);
    }

    #[tokio::test]
    async fn unsupported_value_is_bad_request() {
        let server = server(AppState::default());
        let resp = server
            .post("/fields/encrypt")
            .json(&json!({ "record": { "tags": ["a", "b"] }, "fields": ["tags"] }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = resp.json();
        assert_eq!(body.code, "invalid_input");
        assert!(!body.retryable);
    }

    #[tokio::test]
    async fn tampered_envelope_is_500_without_plaintext() {
        let state = AppState::default();
        let stored = state
            .fields
            .encrypt_fields(
                json!({ "ssn": "123-45-6789" }).as_object().unwrap(),
                &["ssn"],
            )
            .await
            .unwrap();
        let mut env =
            EncryptedEnvelope::from_wire_str(stored["ssn"].as_str().unwrap()).unwrap();
        env.ciphertext[0] ^= 0x01;
        let tampered = json!({ "ssn": env.to_wire_string().unwrap(), "ssn_encrypted": true });

        let resp = server(state)
            .post("/fields/decrypt")
            .json(&json!({ "record": tampered, "fields": ["ssn"] }))
            .await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!resp.text().contains("6789"));
        let body: ErrorResponse = resp.json();
        assert_eq!(body.code, "crypto_failure");
    }

    #[tokio::test]
    async fn unsupported_envelope_version_is_bad_request() {
        let mut env = EncryptedEnvelope::new(vec![1; 60], [0u8; NONCE_LEN], vec![2; 32]);
        env.version = "2.0".into();
        let record = json!({ "ssn": env.to_wire_string().unwrap(), "ssn_encrypted": true });

        let resp = server(AppState::default())
            .post("/fields/decrypt")
            .json(&json!({ "record": record, "fields": ["ssn"] }))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn key_service_outage_is_503_and_retryable() {
        let server = server(AppState::with_key_service(Arc::new(Unreachable), "alias/pii"));
        let resp = server
            .post("/fields/encrypt")
            .json(&json!({ "record": { "ssn": "123-45-6789" }, "fields": ["ssn"] }))
            .await;
        resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorResponse = resp.json();
        assert_eq!(body.code, "key_service_unavailable");
        assert!(body.retryable);

        server
            .get("/rotation/master-key")
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_reports_configuration() {
        let resp = server(AppState::with_key_service(
            Arc::new(LocalKeyService::new()),
            "local/dev",
        ))
        .get("/status")
        .await;
        resp.assert_status_ok();
        let body: StatusResponse = resp.json();
        assert_eq!(body.key_service, "local");
        assert_eq!(body.master_key_id, "local/dev");
        assert_eq!(body.rotation_threshold_days, 90);
        assert!(!body.kms_configured);
    }

    #[tokio::test]
    async fn rotation_check_applies_policy() {
        let server = server(AppState::default());
        let resp = server
            .post("/rotation/check")
            .json(&json!({ "created_at": Utc::now() - Duration::days(91) }))
            .await;
        resp.assert_status_ok();
        let body: RotationCheckResponse = resp.json();
        assert_eq!(
            body,
            RotationCheckResponse {
                age_days: 91,
                threshold_days: 90,
                due: true
            }
        );

        let body: RotationCheckResponse = server
            .post("/rotation/check")
            .json(&json!({ "created_at": Utc::now() - Duration::days(89) }))
            .await
            .json();
        assert!(!body.due);
    }

    #[tokio::test]
    async fn master_key_rotation_uses_reported_creation_date() {
        let local = LocalKeyService::new().created_at(Utc::now() - Duration::days(120));
        let key_id = local.key_id().to_owned();
        let resp = server(AppState::with_key_service(Arc::new(local), &key_id))
            .get("/rotation/master-key")
            .await;
        resp.assert_status_ok();
        let body: MasterKeyRotationResponse = resp.json();
        assert_eq!(body.key_id, key_id);
        assert_eq!(body.age_days, Some(120));
        assert!(body.due);
    }

    #[tokio::test]
    async fn unknown_route_has_error_body() {
        let resp = server(AppState::default()).get("/nope").await;
        resp.assert_status(StatusCode::NOT_FOUND);
        let body: ErrorResponse = resp.json();
        assert_eq!(body.code, "not_found");
    }
}
