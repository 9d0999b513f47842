use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{UserEnvelope, Valid, expected_version};
use crate::user::User;

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 500,
        message = "First name must be provided and not be more than 500 characters long."
    ))]
    pub fname: Option<String>,
    #[validate(length(
        max = 500,
        message = "Second name must not be more than 500 characters long."
    ))]
    pub sname: Option<String>,
    #[validate(email(message = "Email must be formatted."))]
    pub email: Option<String>,
}

/// Handler to partially update a user.
pub async fn handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Valid(body): Valid<Body>,
) -> Result<Json<UserEnvelope>> {
    let expected = expected_version(&headers)?;
    let mut user = state.users.get(id).await?;

    if expected.is_some_and(|version| version != user.version) {
        return Err(ServerError::EditConflict);
    }

    if let Some(fname) = body.fname {
        user.fname = fname;
    }
    if let Some(sname) = body.sname {
        user.sname = sname;
    }
    if let Some(email) = body.email {
        user.email = email;
    }

    state.users.update(&mut user).await?;

    tracing::info!(user_id = id, updated_by = actor.id, version = user.version, "user updated");

    Ok(Json(UserEnvelope { user }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::util::ServiceExt;

    use crate::*;

    #[tokio::test]
    async fn test_update_handler() {
        let ctx = router::state();
        let app = app(ctx.state.clone());
        let (id, token) = ctx.activated_user("grace@example.com").await;

        let body = json!({ "fname": "Admiral" }).to_string();
        let response = make_request(
            app.clone(),
            Method::PATCH,
            &format!("/v1/users/{id}"),
            body,
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["user"]["fname"], "Admiral");
        assert_eq!(json["user"]["sname"], "Johnson");
        assert_eq!(json["user"]["version"], 2);
    }

    #[tokio::test]
    async fn test_duplicate_email_on_update() {
        let ctx = router::state();
        let app = app(ctx.state.clone());
        ctx.activated_user("taken@example.com").await;
        let (id, token) = ctx.activated_user("grace@example.com").await;

        let body = json!({ "email": "taken@example.com" }).to_string();
        let response =
            make_request(app, Method::PATCH, &format!("/v1/users/{id}"), body, Some(&token)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_edit_conflict() {
        let ctx = router::state();
        let app = app(ctx.state.clone());
        let (id, token) = ctx.activated_user("grace@example.com").await;

        let request = |version: &str| {
            axum::extract::Request::builder()
                .method(Method::PATCH)
                .uri(format!("/v1/users/{id}"))
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
                .header(router::EXPECTED_VERSION, version)
                .body(axum::body::Body::from(json!({ "sname": "H." }).to_string()))
                .unwrap()
        };

        let response = app.clone().oneshot(request("1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Version is now 2.
        let response = app.clone().oneshot(request("1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Retrying with the version just read goes through.
        let response = app.oneshot(request("2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["user"]["version"], 3);
        assert_eq!(json["user"]["sname"], "H.");
    }

    #[tokio::test]
    async fn test_malformed_expected_version() {
        let ctx = router::state();
        let app = app(ctx.state.clone());
        let (id, token) = ctx.activated_user("grace@example.com").await;

        let request = axum::extract::Request::builder()
            .method(Method::PATCH)
            .uri(format!("/v1/users/{id}"))
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
            .header(router::EXPECTED_VERSION, "latest")
            .body(axum::body::Body::from(json!({ "sname": "H." }).to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["errors"][0]["field"], router::EXPECTED_VERSION);

        // Nothing was written.
        let user = ctx.state.users.get(id).await.unwrap();
        assert_eq!(user.version, 1);
        assert_eq!(user.sname, "Johnson");
    }

    #[tokio::test]
    async fn test_concurrent_requests_one_conflict() {
        let ctx = router::state();
        let app = app(ctx.state.clone());
        let (id, token) = ctx.activated_user("grace@example.com").await;

        let request = |sname: &str| {
            axum::extract::Request::builder()
                .method(Method::PATCH)
                .uri(format!("/v1/users/{id}"))
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
                .header(router::EXPECTED_VERSION, "1")
                .body(axum::body::Body::from(json!({ "sname": sname }).to_string()))
                .unwrap()
        };

        let (left, right) = tokio::join!(
            app.clone().oneshot(request("Left")),
            app.clone().oneshot(request("Right"))
        );
        let mut statuses = [left.unwrap().status(), right.unwrap().status()];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

        let user = ctx.state.users.get(id).await.unwrap();
        assert_eq!(user.version, 2);
    }
}
