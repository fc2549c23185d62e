use std::net::SocketAddr;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, chat, groups, metrics, users};

/// Photos travel inline as base64, so bodies get a generous cap.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(metrics::router())
        .merge(chat::router())
        .merge(groups::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "3001".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::{ai::fallback::testing::ScriptedClient, error::COACH_BUSY_REPLY, seed};

    const BOUNDARY: &str = "coachhub-test-boundary";

    struct Harness {
        state: AppState,
        app: Router,
    }

    async fn harness(ai: ScriptedClient) -> Harness {
        let state = AppState::fake(Arc::new(ai));
        seed::ensure_defaults(&state).await.unwrap();
        let app = build_app(state.clone());
        Harness { state, app }
    }

    fn multipart_file(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    impl Harness {
        async fn send_raw(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            content_type: Option<&str>,
            body: Vec<u8>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                req = req.header("authorization", format!("Bearer {t}"));
            }
            if let Some(ct) = content_type {
                req = req.header("content-type", ct);
            }
            let res = self
                .app
                .clone()
                .oneshot(req.body(Body::from(body)).unwrap())
                .await
                .unwrap();
            let status = res.status();
            let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            match body {
                Some(v) => {
                    let bytes = v.to_string().into_bytes();
                    self.send_raw(method, uri, token, Some("application/json"), bytes)
                        .await
                }
                None => self.send_raw(method, uri, token, None, Vec::new()).await,
            }
        }

        async fn send_text(&self, token: &str, to: &str, content: &str) -> StatusCode {
            let body = json!({ "to": to, "content": content });
            self.call(Method::POST, "/api/chat/send", Some(token), Some(body))
                .await
                .0
        }

        async fn register(&self, username: &str) -> (StatusCode, Value) {
            let body = json!({
                "username": username,
                "password": "secret1",
                "fullname": format!("{username} full"),
                "birthday": "1994-02-03",
                "height": 170,
                "gender": "male"
            });
            self.call(Method::POST, "/dangky", None, Some(body)).await
        }

        /// Register then log in; returns (user id, access token).
        async fn sign_up(&self, username: &str) -> (String, String) {
            let (status, _) = self.register(username).await;
            assert_eq!(status, StatusCode::CREATED);
            self.login(username, "secret1").await
        }

        async fn try_login(&self, username: &str, password: &str) -> (StatusCode, Value) {
            let body = json!({ "username": username, "password": password });
            self.call(Method::POST, "/dangnhap", None, Some(body)).await
        }

        async fn login(&self, username: &str, password: &str) -> (String, String) {
            let (status, body) = self.try_login(username, password).await;
            assert_eq!(status, StatusCode::OK, "{body}");
            (
                body["user"]["id"].as_str().unwrap().to_string(),
                body["access_token"].as_str().unwrap().to_string(),
            )
        }

        async fn admin(&self) -> (String, String) {
            seed::reset_admin(&self.state).await.unwrap();
            self.login("admin", "admin").await
        }

        async fn group_id(&self, name: &str) -> String {
            let group = self.state.groups.find_group_by_name(name).await.unwrap();
            group.unwrap().id.to_string()
        }
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn health_is_open() {
        let h = harness(ScriptedClient::default()).await;
        let (status, _) = h.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn request_logs_never_carry_credentials() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let h = harness(ScriptedClient::default()).await;
        let (_, admin) = h.admin().await;
        let form = format!("multipart/form-data; boundary={BOUNDARY}");
        let png = multipart_file("avatar", "image/png", b"\x89PNG");
        let (status, _) = h
            .send_raw(Method::POST, "/api/account/avatar", Some(&admin), Some(&form), png)
            .await;
        assert_eq!(status, StatusCode::OK);
        let metric = json!({ "measured_on": "2024-06-01", "weight_kg": 72.5 });
        let (status, _) = h
            .call(Method::POST, "/api/body-metrics", Some(&admin), Some(metric))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = h.call(Method::GET, "/admin/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);

        let out = logs.text();
        assert!(out.contains("body metric recorded"), "{out}");
        assert!(!out.contains("$argon2"), "{out}");
        assert!(!out.contains("base64,"), "{out}");
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let h = harness(ScriptedClient::default()).await;
        assert_eq!(h.register("lan").await.0, StatusCode::CREATED);

        let (status, body) = h.register("LAN").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Username already taken");
    }

    #[tokio::test]
    async fn login_returns_role_and_hides_hash() {
        let h = harness(ScriptedClient::default()).await;
        h.register("quang").await;

        let (status, body) = h.try_login("quang", "secret1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "member");
        assert_eq!(body["user"]["group_name"], seed::MEMBER_GROUP);
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn bad_credentials_get_one_uniform_answer() {
        let h = harness(ScriptedClient::default()).await;
        h.register("thu").await;

        let wrong_password = h.try_login("thu", "nope123").await;
        let unknown_user = h.try_login("ghost", "secret1").await;

        assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password, unknown_user);
        assert_eq!(wrong_password.1["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn refresh_token_renews_the_pair() {
        let h = harness(ScriptedClient::default()).await;
        h.register("phuong").await;
        let (_, login) = h.try_login("phuong", "secret1").await;
        let refresh = login["refresh_token"].as_str().unwrap();
        let access = login["access_token"].as_str().unwrap();

        let (status, body) = h
            .call(
                Method::POST,
                "/auth/refresh",
                None,
                Some(json!({ "refresh_token": refresh })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "phuong");
        let renewed = body["access_token"].as_str().unwrap();
        let (status, _) = h
            .call(Method::GET, "/api/account/profile", Some(renewed), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = h
            .call(
                Method::POST,
                "/auth/refresh",
                None,
                Some(json!({ "refresh_token": access })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Not signed in");

        // refresh tokens do not open the API
        let (status, _) = h
            .call(Method::GET, "/api/account/profile", Some(refresh), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_or_null_identity_is_unauthenticated() {
        let h = harness(ScriptedClient::default()).await;
        let (status, body) = h.call(Method::GET, "/api/account/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Not signed in");

        let res = h
            .app
            .clone()
            .oneshot(
                Request::get("/api/body-metrics/all")
                    .header("x-user-id", "null")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn legacy_header_carries_token() {
        let h = harness(ScriptedClient::default()).await;
        let (id, token) = h.sign_up("vy").await;

        let res = h
            .app
            .clone()
            .oneshot(
                Request::get("/api/account/profile")
                    .header("x-user-id", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["id"], id.as_str());
    }

    #[tokio::test]
    async fn profile_update_validates_and_persists() {
        let h = harness(ScriptedClient::default()).await;
        let (_, token) = h.sign_up("ngoc").await;

        let changes = json!({
            "fullname": "  Ngoc Pham ",
            "height": 165.5,
            "birthday": "1993-11-02"
        });
        let (status, body) = h
            .call(Method::PUT, "/api/account/profile", Some(&token), Some(changes))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fullname"], "Ngoc Pham");
        assert_eq!(body["height"], 165.5);
        assert_eq!(body["birthday"], "1993-11-02");
        assert_eq!(body["gender"], "male");

        let (status, body) = h
            .call(
                Method::PUT,
                "/api/account/profile",
                Some(&token),
                Some(json!({ "height": 400 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Height"));

        let (_, body) = h.call(Method::GET, "/api/account/profile", Some(&token), None).await;
        assert_eq!(body["fullname"], "Ngoc Pham");
        assert_eq!(body["height"], 165.5);
    }

    #[tokio::test]
    async fn password_change_requires_current_password() {
        let h = harness(ScriptedClient::default()).await;
        let (_, token) = h.sign_up("son").await;

        let wrong = json!({ "current_password": "guess12", "new_password": "better1" });
        let (status, body) = h
            .call(Method::PUT, "/api/account/password", Some(&token), Some(wrong))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");

        let short = json!({ "current_password": "secret1", "new_password": "abc" });
        let (status, _) = h
            .call(Method::PUT, "/api/account/password", Some(&token), Some(short))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let good = json!({ "current_password": "secret1", "new_password": "better1" });
        let (status, _) = h
            .call(Method::PUT, "/api/account/password", Some(&token), Some(good))
            .await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(h.try_login("son", "secret1").await.0, StatusCode::UNAUTHORIZED);
        h.login("son", "better1").await;
    }

    #[tokio::test]
    async fn avatar_upload_stores_data_url() {
        let h = harness(ScriptedClient::default()).await;
        let (_, token) = h.sign_up("yen").await;
        let form = format!("multipart/form-data; boundary={BOUNDARY}");

        let png = multipart_file("avatar", "image/png", b"\x89PNG");
        let (status, body) = h
            .send_raw(Method::POST, "/api/account/avatar", Some(&token), Some(&form), png)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["avatar"], "data:image/png;base64,iVBORw==");

        let text = multipart_file("avatar", "text/plain", b"hello");
        let (status, body) = h
            .send_raw(Method::POST, "/api/account/avatar", Some(&token), Some(&form), text)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Avatar must be an image");

        let other = multipart_file("photo", "image/png", b"\x89PNG");
        let (status, body) = h
            .send_raw(Method::POST, "/api/account/avatar", Some(&token), Some(&form), other)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "avatar file is required");

        let (_, profile) = h.call(Method::GET, "/api/account/profile", Some(&token), None).await;
        assert_eq!(profile["avatar"], "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn malformed_input_answers_with_json_message() {
        let h = harness(ScriptedClient::default()).await;
        let (_, token) = h.sign_up("kim").await;

        let (status, body) = h
            .call(Method::GET, "/api/chat/history/not-a-uuid", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let uri = format!("/api/chat/history/{}?limit=lots", uuid::Uuid::new_v4());
        let (status, body) = h.call(Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let (status, body) = h
            .send_raw(
                Method::POST,
                "/api/chat/send",
                Some(&token),
                Some("application/json"),
                b"{\"to\": ".to_vec(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let (status, body) = h
            .send_raw(
                Method::POST,
                "/api/account/avatar",
                Some(&token),
                Some("application/json"),
                b"{}".to_vec(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn members_cannot_reach_admin_routes() {
        let h = harness(ScriptedClient::default()).await;
        let (_, token) = h.sign_up("binh").await;

        let (status, body) = h.call(Method::GET, "/admin/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Administrators only");

        let (_, admin) = h.admin().await;
        let (status, body) = h.call(Method::GET, "/admin/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().len() >= 3);
    }

    #[tokio::test]
    async fn admin_creates_users_in_groups() {
        let h = harness(ScriptedClient::default()).await;
        let (_, admin) = h.admin().await;
        let person = |username: &str| {
            json!({
                "username": username,
                "password": "secret1",
                "fullname": "Created By Admin",
                "birthday": "1988-08-08",
                "height": 175,
                "gender": "male"
            })
        };

        let (status, body) = h
            .call(Method::POST, "/admin/users", Some(&admin), Some(person("viet")))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["group_name"], seed::MEMBER_GROUP);
        assert_eq!(body["role"], "member");

        let mut in_admins = person("trang");
        in_admins["group_id"] = json!(h.group_id(seed::ADMIN_GROUP).await);
        let (status, body) = h
            .call(Method::POST, "/admin/users", Some(&admin), Some(in_admins))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["role"], "administrator");

        let mut lost = person("hung");
        lost["group_id"] = json!(uuid::Uuid::new_v4());
        let (status, body) = h
            .call(Method::POST, "/admin/users", Some(&admin), Some(lost))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Group not found");

        let (status, _) = h
            .call(Method::POST, "/admin/users", Some(&admin), Some(person("viet")))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        h.login("viet", "secret1").await;
    }

    #[tokio::test]
    async fn admin_edits_move_group_and_reset_password() {
        let h = harness(ScriptedClient::default()).await;
        let (_, admin) = h.admin().await;
        let (member_id, _) = h.sign_up("duc").await;
        let uri = format!("/admin/users/{member_id}");

        let changes = json!({
            "group_id": h.group_id(seed::ADMIN_GROUP).await,
            "password": "fresh123",
            "fullname": "Duc Tran"
        });
        let (status, body) = h.call(Method::PUT, &uri, Some(&admin), Some(changes)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "administrator");
        assert_eq!(body["group_name"], seed::ADMIN_GROUP);
        assert_eq!(body["fullname"], "Duc Tran");

        assert_eq!(h.try_login("duc", "secret1").await.0, StatusCode::UNAUTHORIZED);
        let (_, token) = h.login("duc", "fresh123").await;
        let (status, _) = h.call(Method::GET, "/admin/groups", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let missing = format!("/admin/users/{}", uuid::Uuid::new_v4());
        let (status, _) = h
            .call(Method::PUT, &missing, Some(&admin), Some(json!({ "fullname": "x" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_fans_in_coach_replies_newest_first() {
        let h = harness(ScriptedClient::new(&[("m1", Ok("eat more greens"))])).await;
        let (admin_id, admin) = h.admin().await;
        let (member_id, member) = h.sign_up("an").await;
        let (_, outsider) = h.sign_up("chi").await;

        assert_eq!(h.send_text(&member, &admin_id, "hello coach").await, StatusCode::CREATED);
        assert_eq!(h.send_text(&admin, &member_id, "hi an").await, StatusCode::CREATED);
        let meal = json!({ "to": admin_id, "image_base64": "data:image/jpeg;base64,AAAA" });
        let (status, body) = h
            .call(Method::POST, "/api/chat/send-meal", Some(&member), Some(meal))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["ai_reply"]["content"], "eat more greens");
        assert_eq!(body["ai_reply"]["recipient_id"], member_id.as_str());

        // unrelated traffic to the admin
        assert_eq!(h.send_text(&outsider, &admin_id, "other").await, StatusCode::CREATED);

        let uri = format!("/api/chat/history/{admin_id}");
        let (status, body) = h.call(Method::GET, &uri, Some(&member), None).await;
        assert_eq!(status, StatusCode::OK);
        let contents: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, ["eat more greens", "[Meal photo]", "hi an", "hello coach"]);
        assert_eq!(body[0]["sender_name"], "AI Coach");

        let uri = format!("/api/chat/history/{admin_id}?limit=1&offset=1");
        let (_, body) = h.call(Method::GET, &uri, Some(&member), None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["content"], "[Meal photo]");
    }

    #[tokio::test]
    async fn meal_reply_falls_back_to_busy_message() {
        let h = harness(ScriptedClient::new(&[("m1", Err(429))])).await;
        let (_, member) = h.sign_up("dung").await;
        let bot_id = seed::find_bot(&h.state).await.unwrap().unwrap().id.to_string();

        let meal = json!({ "to": bot_id, "imageBase64": "AAAA" });
        let (status, body) = h
            .call(Method::POST, "/api/chat/send-meal", Some(&member), Some(meal))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["ai_reply"]["content"], COACH_BUSY_REPLY);
    }

    #[tokio::test]
    async fn members_cannot_message_each_other() {
        let h = harness(ScriptedClient::default()).await;
        let (_, a) = h.sign_up("hai").await;
        let (b_id, _) = h.sign_up("hien").await;

        assert_eq!(h.send_text(&a, &b_id, "psst").await, StatusCode::FORBIDDEN);

        let (_, partners) = h.call(Method::GET, "/api/chat/users", Some(&a), None).await;
        let names: Vec<&str> = partners
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["username"].as_str().unwrap())
            .collect();
        assert!(!names.contains(&"hien"));
        assert!(!names.contains(&"coach-ai"));
    }

    #[tokio::test]
    async fn analyze_image_reports_ai_outage_as_503() {
        let h = harness(ScriptedClient::new(&[("m1", Err(500))])).await;
        let (_, member) = h.sign_up("khoa").await;

        let scan = json!({ "image_base64": "AAAA" });
        let (status, body) = h
            .call(Method::POST, "/api/body-metrics/analyze-image", Some(&member), Some(scan))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["message"], COACH_BUSY_REPLY);
    }

    #[tokio::test]
    async fn analyze_image_uses_next_model_when_first_is_missing() {
        let h = harness(ScriptedClient::new(&[("m2", Ok("{\"weight_kg\": 60}"))])).await;
        let (_, member) = h.sign_up("long").await;

        let scan = json!({ "image_base64": "AAAA", "age": 30 });
        let (status, body) = h
            .call(Method::POST, "/api/body-metrics/analyze-image", Some(&member), Some(scan))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"], "m2");
        assert_eq!(body["text"], "{\"weight_kg\": 60}");
    }

    #[tokio::test]
    async fn metrics_latest_with_previous_and_notes() {
        let h = harness(ScriptedClient::default()).await;
        let (member_id, member) = h.sign_up("mai").await;
        let (_, other) = h.sign_up("nam").await;

        for (day, weight) in [("2024-01-10", 61.0), ("2024-03-10", 59.5), ("2024-02-10", 60.2)] {
            let metric = json!({ "measured_on": day, "weight_kg": weight, "body_fat_pct": 25 });
            let (status, _) = h
                .call(Method::POST, "/api/body-metrics", Some(&member), Some(metric))
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let uri = "/api/body-metrics/latest-with-previous";
        let (_, body) = h.call(Method::GET, uri, Some(&member), None).await;
        assert_eq!(body["latest"]["measured_on"], "2024-03-10");
        assert_eq!(body["previous"]["measured_on"], "2024-02-10");

        let (_, all) = h.call(Method::GET, "/api/body-metrics/all", Some(&member), None).await;
        assert_eq!(all[0]["measured_on"], "2024-01-10");
        let metric_id = all[0]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/body-metrics/{metric_id}/note");
        let nosy = json!({ "note": "nosy" });
        let (status, _) = h.call(Method::PUT, &uri, Some(&other), Some(nosy)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let foreign = format!("/api/body-metrics/user/{member_id}");
        let (status, _) = h.call(Method::GET, &foreign, Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, admin) = h.admin().await;
        let praise = json!({ "note": "great progress" });
        let (status, body) = h.call(Method::PUT, &uri, Some(&admin), Some(praise)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["note"], "great progress");

        let missing = format!("/api/body-metrics/{}/note", uuid::Uuid::new_v4());
        let (status, _) = h
            .call(Method::PUT, &missing, Some(&admin), Some(json!({ "note": "x" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_a_user_keeps_their_history() {
        let h = harness(ScriptedClient::default()).await;
        let (admin_id, admin) = h.admin().await;
        let (member_id, member) = h.sign_up("tuan").await;

        assert_eq!(h.send_text(&member, &admin_id, "bye").await, StatusCode::CREATED);
        let metric = json!({ "measured_on": "2024-04-01", "weight_kg": 70 });
        h.call(Method::POST, "/api/body-metrics", Some(&member), Some(metric))
            .await;

        let uri = format!("/admin/users/{member_id}");
        let (status, _) = h.call(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, users) = h.call(Method::GET, "/admin/users", Some(&admin), None).await;
        assert!(users
            .as_array()
            .unwrap()
            .iter()
            .all(|u| u["id"] != member_id.as_str()));

        let uri = format!("/api/chat/history/{member_id}");
        let (_, history) = h.call(Method::GET, &uri, Some(&admin), None).await;
        assert_eq!(history[0]["content"], "bye");
        assert!(history[0]["sender_name"].is_null());

        let uri = format!("/api/body-metrics/user/{member_id}");
        let (_, metrics) = h.call(Method::GET, &uri, Some(&admin), None).await;
        assert_eq!(metrics.as_array().unwrap().len(), 1);

        let uri = format!("/admin/users/{admin_id}");
        let (status, _) = h.call(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn group_management() {
        let h = harness(ScriptedClient::default()).await;
        let (_, admin) = h.admin().await;

        let coaches = json!({
            "name": "Coaches",
            "permissions": { "note": true, "message": true }
        });
        let (status, group) = h
            .call(Method::POST, "/admin/groups", Some(&admin), Some(coaches))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(group["role"], "member");

        let (status, _) = h
            .call(Method::POST, "/admin/groups", Some(&admin), Some(json!({ "name": "Coaches" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, groups) = h.call(Method::GET, "/admin/groups", Some(&admin), None).await;
        for g in groups.as_array().unwrap() {
            let uri = format!("/admin/groups/{}", g["id"].as_str().unwrap());
            let (status, _) = h.call(Method::DELETE, &uri, Some(&admin), None).await;
            if seed::is_seeded_group(g["name"].as_str().unwrap()) {
                assert_eq!(status, StatusCode::CONFLICT);
            } else {
                assert_eq!(status, StatusCode::OK);
            }
        }
    }

    #[tokio::test]
    async fn group_edits_keep_builtin_names_and_grant_permissions() {
        let h = harness(ScriptedClient::default()).await;
        let (_, admin) = h.admin().await;
        let (_, a) = h.sign_up("lien").await;
        let (b_id, _) = h.sign_up("loc").await;
        let members = format!("/admin/groups/{}", h.group_id(seed::MEMBER_GROUP).await);

        let rename = json!({ "name": "Everyone" });
        let (status, body) = h.call(Method::PUT, &members, Some(&admin), Some(rename)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Built-in groups cannot be renamed");

        assert_eq!(h.send_text(&a, &b_id, "hey").await, StatusCode::FORBIDDEN);
        let open_chat = json!({
            "description": "Members who may chat",
            "permissions": { "note": false, "message": true }
        });
        let (status, body) = h
            .call(Method::PUT, &members, Some(&admin), Some(open_chat))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], seed::MEMBER_GROUP);
        assert_eq!(body["permissions"]["message"], true);
        assert_eq!(h.send_text(&a, &b_id, "hey").await, StatusCode::CREATED);

        let missing = format!("/admin/groups/{}", uuid::Uuid::new_v4());
        let (status, _) = h
            .call(Method::PUT, &missing, Some(&admin), Some(json!({ "name": "Ghosts" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_reset_can_be_disabled() {
        let h = harness(ScriptedClient::default()).await;
        let (status, _) = h.call(Method::GET, "/adminreset", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let mut config = (*h.state.config).clone();
        config.admin_reset_enabled = false;
        let mut state = h.state.clone();
        state.config = Arc::new(config);
        let app = build_app(state);
        let res = app
            .oneshot(Request::get("/adminreset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
