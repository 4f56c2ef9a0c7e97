//! End-to-end tests of the HTTP API against an in-memory drive.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{redirect, Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use drivegate_common::{AuthError, Error, Result, SessionUser};
use drivegate_server::{router, AllowList, AppState};
use drivegate_storage::{
    AuthSettings, Credential, CredentialManager, CredentialStore, DriveFactory, LoginFlow,
    MemoryDrive, OAuthClientConfig, RemoteDrive, ServiceAccountKey, TokenIssuer,
};

struct NoRefresh;

#[async_trait]
impl TokenIssuer for NoRefresh {
    async fn refresh(&self, _refresh_token: &str) -> Result<Credential> {
        Err(AuthError::Rejected("invalid_grant".to_string()).into())
    }

    async fn service_token(
        &self,
        _key: &ServiceAccountKey,
        _subject: Option<&str>,
    ) -> Result<Credential> {
        Err(AuthError::Rejected("no service account".to_string()).into())
    }
}

struct FakeLogin {
    email: String,
}

#[async_trait]
impl LoginFlow for FakeLogin {
    fn authorization_url(&self) -> Result<(String, String)> {
        Ok((
            "https://accounts.example.com/o/oauth2/auth?state=csrf-1".to_string(),
            "csrf-1".to_string(),
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<Credential> {
        if code != "good-code" {
            return Err(Error::Validation("invalid code".to_string()));
        }
        Ok(Credential::from_token(
            "fresh-token",
            Some("refresh".to_string()),
            Some(Duration::from_secs(3600)),
            None,
        ))
    }

    async fn fetch_user(&self, _credential: &Credential) -> Result<SessionUser> {
        Ok(SessionUser {
            email: self.email.clone(),
            name: "Ana".to_string(),
            picture: None,
        })
    }
}

struct TestServer {
    _dir: TempDir,
    base: String,
    state: AppState,
    drive: Arc<MemoryDrive>,
    http: Client,
}

struct Setup {
    credential: Option<Credential>,
    root: Option<&'static str>,
    allowed: &'static str,
    email: &'static str,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            credential: Some(Credential::from_token(
                "stored-token",
                Some("refresh".to_string()),
                Some(Duration::from_secs(3600)),
                None,
            )),
            root: Some("root"),
            allowed: "",
            email: "ana@example.com",
        }
    }
}

async fn start(setup: Setup) -> TestServer {
    let dir = TempDir::new().unwrap();
    let mut settings = AuthSettings::new(dir.path().join("token.json"));
    settings.oauth = Some(OAuthClientConfig {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        redirect_url: "http://localhost/oauth2callback".to_string(),
    });

    if let Some(credential) = &setup.credential {
        CredentialStore::new(settings.credential_path.clone())
            .save(credential)
            .await
            .unwrap();
    }

    let drive = Arc::new(MemoryDrive::new("root"));
    let shared = drive.clone();
    let factory: DriveFactory =
        Box::new(move |_: &Credential| Ok(shared.clone() as Arc<dyn RemoteDrive>));

    let credentials = Arc::new(CredentialManager::new(settings, Arc::new(NoRefresh), factory));
    let login = Arc::new(FakeLogin {
        email: setup.email.to_string(),
    });
    let state = AppState::new(
        credentials,
        login,
        setup.root.map(str::to_string),
        AllowList::parse(setup.allowed),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let http = Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap();

    TestServer {
        _dir: dir,
        base: format!("http://{}", addr),
        state,
        drive,
        http,
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn session(&self) -> String {
        let id = self
            .state
            .sessions
            .create(SessionUser {
                email: "ana@example.com".to_string(),
                name: "Ana".to_string(),
                picture: None,
            })
            .await;
        format!("drivegate_session={}", id)
    }
}

#[tokio::test]
async fn test_me_requires_session() {
    let server = start(Setup::default()).await;

    let response = server.http.get(server.url("/me")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let cookie = server.session().await;
    let body: Value = server
        .http
        .get(server.url("/me"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["user"]["email"], "ana@example.com");
}

#[tokio::test]
async fn test_protected_routes_reject_without_session() {
    let server = start(Setup::default()).await;

    for path in ["/folders", "/files", "/download/x", "/service-account-email"] {
        let response = server.http.get(server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", path);
    }

    let response = server
        .http
        .get(server.url("/folders"))
        .header("cookie", "drivegate_session=unknown")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_folder_lifecycle() {
    let server = start(Setup::default()).await;
    let cookie = server.session().await;

    let response = server
        .http
        .post(server.url("/folders"))
        .header("cookie", &cookie)
        .json(&serde_json::json!({ "name": "  Reports " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let folder_id = created["folder"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["folder"]["name"], "Reports");

    let listing: Value = server
        .http
        .get(server.url("/folders"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["rootFolderId"], "root");
    assert_eq!(listing["currentFolder"]["id"], "root");
    assert_eq!(listing["folders"][0]["id"], folder_id.as_str());

    let response = server
        .http
        .patch(server.url(&format!("/folders/{}", folder_id)))
        .header("cookie", &cookie)
        .json(&serde_json::json!({ "name": "Archive" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let renamed: Value = response.json().await.unwrap();
    assert_eq!(renamed["folder"]["name"], "Archive");

    let listing: Value = server
        .http
        .get(server.url(&format!("/folders?parentId={}", folder_id)))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["currentFolder"]["name"], "Archive");
    assert_eq!(listing["folders"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_folder_name_required() {
    let server = start(Setup::default()).await;
    let cookie = server.session().await;

    let response = server
        .http
        .post(server.url("/folders"))
        .header("cookie", &cookie)
        .json(&serde_json::json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Folder name is required.");

    let response = server
        .http
        .patch(server.url("/folders/root"))
        .header("cookie", &cookie)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_folder_is_not_found() {
    let server = start(Setup::default()).await;
    let cookie = server.session().await;

    let response = server
        .http
        .get(server.url("/folders?parentId=missing"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_list_download_delete() {
    let server = start(Setup::default()).await;
    let cookie = server.session().await;
    let folder = server.drive.create_folder("Inbox", "root").await.unwrap();

    let data = vec![7u8; 200 * 1024];
    let form = Form::new().percent_encode_noop().text("folderId", folder.id.clone()).part(
        "file",
        Part::bytes(data.clone())
            .file_name("Año final.bin")
            .mime_str("application/octet-stream")
            .unwrap(),
    );
    let response = server
        .http
        .post(server.url("/upload"))
        .header("cookie", &cookie)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let uploaded: Value = response.json().await.unwrap();
    assert_eq!(uploaded["success"], true);
    let file_id = uploaded["file"]["id"].as_str().unwrap().to_string();

    let listing: Value = server
        .http
        .get(server.url(&format!("/files?folderId={}", folder.id)))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["folderId"], folder.id.as_str());
    assert_eq!(listing["files"][0]["name"], "Año final.bin");

    let response = server
        .http
        .get(server.url(&format!("/download/{}", file_id)))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.content_length(), Some(data.len() as u64));
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("filename*=UTF-8''A%C3%B1o%20final.bin"));
    assert_eq!(response.bytes().await.unwrap().as_ref(), data.as_slice());

    let response = server
        .http
        .delete(server.url(&format!("/files/{}", file_id)))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    let response = server
        .http
        .get(server.url(&format!("/download/{}", file_id)))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_without_folder_goes_to_root() {
    let server = start(Setup::default()).await;
    let cookie = server.session().await;

    let form = Form::new().part("file", Part::bytes(b"hi".to_vec()).file_name("hi.txt"));
    let response = server
        .http
        .post(server.url("/upload"))
        .header("cookie", &cookie)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let files = server.drive.list_files("root").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "hi.txt");
}

#[tokio::test]
async fn test_upload_without_file() {
    let server = start(Setup::default()).await;
    let cookie = server.session().await;

    let form = Form::new().text("folderId", "root");
    let response = server
        .http
        .post(server.url("/upload"))
        .header("cookie", &cookie)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No file uploaded.");
}

#[tokio::test]
async fn test_missing_root_is_server_error() {
    let server = start(Setup {
        root: None,
        ..Setup::default()
    })
    .await;
    let cookie = server.session().await;

    let response = server
        .http
        .get(server.url("/folders"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_rejected_credential_ends_session() {
    let expired = Credential::from_token("old", None, Some(Duration::from_secs(1)), None);
    let server = start(Setup {
        credential: Some(expired),
        ..Setup::default()
    })
    .await;
    let cookie = server.session().await;
    assert_eq!(server.state.sessions.len().await, 1);

    let response = server
        .http
        .get(server.url("/folders"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("set-cookie"));
    assert_eq!(server.state.sessions.len().await, 0);

    let response = server
        .http
        .get(server.url("/me"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_flow() {
    let server = start(Setup {
        credential: None,
        ..Setup::default()
    })
    .await;

    let body: Value = server
        .http
        .get(server.url("/auth"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["authUrl"].as_str().unwrap().contains("state=csrf-1"));

    let response = server
        .http
        .get(server.url("/oauth2callback?code=good-code&state=forged"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server
        .http
        .get(server.url("/oauth2callback?code=good-code&state=csrf-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], "/?login=success");

    let set_cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
    let session = set_cookie.split(';').next().unwrap().to_string();
    assert!(session.starts_with("drivegate_session="));

    // Credential persisted, so the drive is reachable now
    let response = server
        .http
        .get(server.url("/folders"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let home = server
        .http
        .get(server.url("/"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let id = session.trim_start_matches("drivegate_session=");
    assert!(home.contains(&format!("drivegate --session {}", id)));

    // States are single use
    let response = server
        .http
        .get(server.url("/oauth2callback?code=good-code&state=csrf-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_outside_allow_list() {
    let server = start(Setup {
        allowed: "bo@example.com",
        email: "eve@example.com",
        ..Setup::default()
    })
    .await;

    server.http.get(server.url("/auth")).send().await.unwrap();
    let response = server
        .http
        .get(server.url("/oauth2callback?code=good-code&state=csrf-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(server.state.sessions.len().await, 0);
}

#[tokio::test]
async fn test_logout() {
    let server = start(Setup::default()).await;
    let cookie = server.session().await;

    let body: Value = server
        .http
        .post(server.url("/logout"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(server.state.sessions.len().await, 0);

    let response = server
        .http
        .get(server.url("/files"))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
