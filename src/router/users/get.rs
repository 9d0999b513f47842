use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::AppState;
use crate::error::Result;
use crate::router::UserEnvelope;
use crate::user::User;

#[derive(Debug, Serialize)]
pub struct UsersEnvelope {
    pub users: Vec<User>,
}

/// Handler returning every user.
pub async fn list(State(state): State<AppState>) -> Result<Json<UsersEnvelope>> {
    let users = state.users.list().await?;
    Ok(Json(UsersEnvelope { users }))
}

/// Handler returning one user.
pub async fn handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserEnvelope>> {
    let user = state.users.get(id).await?;
    Ok(Json(UserEnvelope { user }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode, header};
    use chrono::Duration;

    use crate::token::Scope;
    use crate::user::{Credential, User, UserRepository};
    use crate::*;

    #[tokio::test]
    async fn test_get_handler() {
        let ctx = router::state();
        let app = app(ctx.state.clone());
        let (id, token) = ctx.activated_user("grace@example.com").await;

        let response = make_request(
            app.clone(),
            Method::GET,
            &format!("/v1/users/{id}"),
            String::default(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["user"]["email"], "grace@example.com");

        for missing in ["/v1/users/0", "/v1/users/999"] {
            let response = make_request(
                app.clone(),
                Method::GET,
                missing,
                String::default(),
                Some(&token),
            )
            .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let response =
            make_request(app, Method::GET, "/v1/users", String::default(), Some(&token)).await;
        let json = body_json(response).await;
        assert_eq!(json["users"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_authentication_required() {
        let ctx = router::state();
        let app = app(ctx.state.clone());

        let response =
            make_request(app.clone(), Method::GET, "/v1/users", String::default(), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let response = make_request(
            app,
            Method::GET,
            "/v1/users",
            String::default(),
            Some("AAAAAAAAAAAAAAAAAAAAAAAAAA"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_session() {
        let ctx = router::state();
        let app = app(ctx.state.clone());
        let (_, token) = ctx.activated_user("grace@example.com").await;

        ctx.clock.advance(Duration::hours(2));
        let response =
            make_request(app, Method::GET, "/v1/users", String::default(), Some(&token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_inactive_account() {
        let ctx = router::state();
        let app = app(ctx.state.clone());

        let mut user = User::new(
            "Mary".into(),
            "Jackson".into(),
            "mary@example.com".into(),
            Credential::pending("pa55word-long").seal(&ctx.state.pwd).unwrap(),
        );
        ctx.state.users.insert(&mut user).await.unwrap();
        let token = ctx
            .state
            .tokens
            .issue(user.id, Duration::hours(1), Scope::Authentication)
            .await
            .unwrap();

        let response = make_request(
            app,
            Method::GET,
            "/v1/users",
            String::default(),
            Some(&token.plaintext),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
