use std::collections::HashMap;
use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::{PasswordHasher, SaltString};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use auth_hub::app::{build_router, wire};
use auth_hub::config::Config;
use auth_hub::repos::error::RepoResult;
use auth_hub::services::audit::TracingAuditSink;
use auth_hub::services::auth::directory::{ApplicationInfo, Directory, PrincipalCredentials};
use auth_hub::services::cache::InMemoryCache;
use auth_hub::services::rbac::catalog::BoxFuture;
use auth_hub::services::rbac::{InMemoryRoleCatalog, Permission};

struct Fixture {
    router: Router,
    catalog: InMemoryRoleCatalog,
    alice: Uuid,
    crm: Uuid,
    billing: Uuid,
}

#[derive(Default)]
struct FixedDirectory {
    principals: HashMap<String, PrincipalCredentials>,
    applications: HashMap<Uuid, ApplicationInfo>,
}

impl Directory for FixedDirectory {
    fn find_principal_by_login<'a>(
        &'a self,
        login: &'a str,
    ) -> BoxFuture<'a, RepoResult<Option<PrincipalCredentials>>> {
        Box::pin(async move { Ok(self.principals.get(login).cloned()) })
    }

    fn find_principal_by_id(&self, id: Uuid) -> BoxFuture<'_, RepoResult<Option<PrincipalCredentials>>> {
        Box::pin(async move { Ok(self.principals.values().find(|p| p.id == id).cloned()) })
    }

    fn find_application(&self, id: Uuid) -> BoxFuture<'_, RepoResult<Option<ApplicationInfo>>> {
        Box::pin(async move { Ok(self.applications.get(&id).cloned()) })
    }
}

fn config() -> Config {
    let vars = HashMap::from([
        ("DATABASE_URL", "postgres://unused/auth"),
        ("AUTH_ISSUER", "https://auth.integration.test"),
        ("JWT_SECRET", "integration-secret-integration-secret"),
        ("TOKEN_LEEWAY_SECONDS", "0"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

fn hash(password: &str) -> String {
    let salt = SaltString::encode_b64(b"integration-salt").unwrap();
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

async fn fixture() -> Fixture {
    let alice = Uuid::new_v4();
    let (crm, billing) = (Uuid::new_v4(), Uuid::new_v4());

    let mut directory = FixedDirectory::default();
    directory.principals.insert(
        "alice".to_string(),
        PrincipalCredentials {
            id: alice,
            password_hash: hash("s3cret"),
            active: true,
        },
    );
    for (id, name) in [(crm, "crm"), (billing, "billing")] {
        directory.applications.insert(
            id,
            ApplicationInfo {
                id,
                name: name.to_string(),
                system: false,
            },
        );
    }

    let catalog = InMemoryRoleCatalog::new();
    let viewer = catalog
        .add_role(crm, [Permission::new("contacts", "read")])
        .await;
    let editor = catalog
        .add_role(
            crm,
            [
                Permission::new("contacts", "read"),
                Permission::new("contacts", "update"),
            ],
        )
        .await;
    let clerk = catalog
        .add_role(billing, [Permission::new("invoices", "read")])
        .await;
    catalog.assign(alice, viewer, crm).await.unwrap();
    catalog.assign(alice, editor, crm).await.unwrap();
    catalog.assign(alice, clerk, billing).await.unwrap();

    let config = config();
    let state = wire(
        &config,
        InMemoryCache::new(),
        Arc::new(directory),
        Arc::new(catalog.clone()),
        Arc::new(TracingAuditSink),
    )
    .unwrap();

    Fixture {
        router: build_router(state, &config),
        catalog,
        alice,
        crm,
        billing,
    }
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), 64 * 1024).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn login(f: &Fixture, application_id: Uuid) -> Value {
    let (status, body) = call(
        &f.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"login": "alice", "password": "s3cret", "application_id": application_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

async fn validate(f: &Fixture, token: &str) -> Value {
    let (status, body) = call(
        &f.router,
        "POST",
        "/api/v1/auth/validate",
        None,
        Some(json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

fn token<'a>(pair: &'a Value, field: &str) -> &'a str {
    pair[field].as_str().unwrap()
}

#[tokio::test]
async fn health_is_public_and_not_cached() {
    let f = fixture().await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let res = f.router.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CACHE_CONTROL], "no-store");
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn login_returns_deduplicated_permissions_for_the_application() {
    let f = fixture().await;

    let pair = login(&f, f.crm).await;

    assert_eq!(pair["token_type"], "Bearer");
    assert_eq!(pair["permissions"], json!(["contacts:read", "contacts:update"]));
    assert!(pair["expires_in"].as_u64().unwrap() > 0);

    let verdict = validate(&f, token(&pair, "access_token")).await;
    assert_eq!(verdict["valid"], true);
    assert_eq!(verdict["claims"]["principal_id"], f.alice.to_string());
    assert_eq!(verdict["claims"]["application_id"], f.crm.to_string());
    assert_eq!(verdict["claims"]["kind"], "access");
}

#[tokio::test]
async fn wrong_password_and_unknown_user_get_the_same_answer() {
    let f = fixture().await;

    let (s1, b1) = call(
        &f.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"login": "alice", "password": "nope", "application_id": f.crm})),
    )
    .await;
    let (s2, b2) = call(
        &f.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"login": "mallory", "password": "nope", "application_id": f.crm})),
    )
    .await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!((s1, b1), (s2, b2));
}

#[tokio::test]
async fn validate_does_not_say_why() {
    let f = fixture().await;
    let pair = login(&f, f.crm).await;
    let access = token(&pair, "access_token");

    let (status, _) = call(&f.router, "POST", "/api/v1/auth/logout", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);

    let revoked = validate(&f, access).await;
    let garbage = validate(&f, "definitely.not.valid").await;

    assert_eq!(revoked, json!({"valid": false}));
    assert_eq!(revoked, garbage);
}

#[tokio::test]
async fn logout_leaves_other_applications_alone() {
    let f = fixture().await;
    let crm = login(&f, f.crm).await;
    let billing = login(&f, f.billing).await;

    let (status, body) = call(
        &f.router,
        "POST",
        "/api/v1/auth/logout",
        Some(token(&crm, "access_token")),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 2);
    assert_eq!(validate(&f, token(&crm, "refresh_token")).await["valid"], false);
    assert_eq!(validate(&f, token(&billing, "access_token")).await["valid"], true);
}

#[tokio::test]
async fn logout_all_ends_every_application() {
    let f = fixture().await;
    let crm = login(&f, f.crm).await;
    let billing = login(&f, f.billing).await;

    let (status, body) = call(
        &f.router,
        "POST",
        "/api/v1/auth/logout-all",
        Some(token(&billing, "access_token")),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 4);
    for t in [
        token(&crm, "access_token"),
        token(&crm, "refresh_token"),
        token(&billing, "refresh_token"),
    ] {
        assert_eq!(validate(&f, t).await["valid"], false);
    }
}

#[tokio::test]
async fn refresh_rotates_and_recomputes_permissions() {
    let f = fixture().await;
    let pair = login(&f, f.billing).await;
    let old_refresh = token(&pair, "refresh_token").to_string();

    let approver = f
        .catalog
        .add_role(f.billing, [Permission::new("invoices", "approve")])
        .await;
    f.catalog.assign(f.alice, approver, f.billing).await.unwrap();

    let (status, rotated) = call(
        &f.router,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": old_refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rotated["permissions"], json!(["invoices:approve", "invoices:read"]));

    let (replay, body) = call(
        &f.router,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": old_refresh })),
    )
    .await;
    assert_eq!(replay, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(validate(&f, token(&rotated, "refresh_token")).await["valid"], true);
}

#[tokio::test]
async fn access_token_is_not_a_refresh_token() {
    let f = fixture().await;
    let pair = login(&f, f.crm).await;

    let (status, _) = call(
        &f.router,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": token(&pair, "access_token") })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(validate(&f, token(&pair, "access_token")).await["valid"], true);
}

#[tokio::test]
async fn logout_without_bearer_is_unauthorized() {
    let f = fixture().await;

    let (status, body) = call(&f.router, "POST", "/api/v1/auth/logout", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn unknown_application_is_a_bad_request() {
    let f = fixture().await;

    let (status, body) = call(
        &f.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({"login": "alice", "password": "s3cret", "application_id": Uuid::new_v4()})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "UNKNOWN_APPLICATION");
}
