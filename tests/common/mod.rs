#![allow(dead_code)]

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use feishu_tapd_relay::config::Config;
use feishu_tapd_relay::forwarder::{Forwarder, ForwarderSettings};
use feishu_tapd_relay::server::{AppState, build_router};
use feishu_tapd_relay::tapd::TapdClient;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Created,
    RejectedInEnvelope,
    ServerError,
    Stall,
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub form: HashMap<String, String>,
}

pub struct MockTapd {
    behavior: Behavior,
    hits: AtomicUsize,
    requests: Mutex<Vec<CapturedRequest>>,
}

impl MockTapd {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

async fn mock_create(
    State(state): State<Arc<MockTapd>>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    };
    state.requests.lock().expect("requests lock").push(CapturedRequest {
        path: uri.path().to_string(),
        authorization: header("authorization"),
        content_type: header("content-type"),
        form,
    });

    let entity = if uri.path() == "/bugs" { "Bug" } else { "Story" };
    match state.behavior {
        Behavior::Created => (
            StatusCode::OK,
            Json(json!({"status": 1, "data": {entity: {"id": format!("11418279970010{hit:05}")}}, "info": "success"})),
        ),
        Behavior::RejectedInEnvelope => (
            StatusCode::OK,
            Json(json!({"status": 422, "data": null, "info": "owner does not exist"})),
        ),
        Behavior::ServerError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": 0, "info": "internal error"})),
        ),
        Behavior::Stall => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            (StatusCode::OK, Json(json!({"status": 1, "data": {}})))
        }
    }
}

pub async fn start_mock_tapd(behavior: Behavior) -> (SocketAddr, Arc<MockTapd>) {
    let state = Arc::new(MockTapd {
        behavior,
        hits: AtomicUsize::new(0),
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/stories", post(mock_create))
        .route("/bugs", post(mock_create))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock tapd");
    let addr = listener.local_addr().expect("mock tapd addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock tapd");
    });

    (addr, state)
}

pub async fn start_truncating_tapd() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind truncating tapd");
    let addr = listener.local_addr().expect("truncating tapd addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                read_request(&mut stream).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"status\":1,",
                    )
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, hits)
}

async fn read_request(stream: &mut TcpStream) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let Ok(read) = stream.read(&mut chunk).await else {
            return;
        };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buffer).to_string();
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buffer.len() >= header_end + 4 + content_length {
            return;
        }
    }
}

pub fn relay_config(tapd_addr: SocketAddr, extra: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        ("TAPD_API_USER".to_string(), "user".to_string()),
        ("TAPD_API_PASSWORD".to_string(), "pw".to_string()),
        ("TAPD_API_BASE".to_string(), format!("http://{tapd_addr}")),
        ("TAPD_HTTP_TIMEOUT_MS".to_string(), "300".to_string()),
        ("TAPD_RETRY_DELAY_MS".to_string(), "10".to_string()),
    ]);
    for (name, value) in extra {
        vars.insert(name.to_string(), value.to_string());
    }
    Config::from_lookup(|name| vars.get(name).cloned()).expect("relay config")
}

pub fn forwarder_for(config: &Config) -> Forwarder {
    let client = TapdClient::from_config(config).expect("tapd client");
    let mappings = config.load_mappings().expect("mappings");
    Forwarder::new(
        Arc::new(client),
        Arc::new(mappings),
        ForwarderSettings::from_config(config),
    )
}

pub async fn start_relay(config: Config) -> SocketAddr {
    let forwarder = forwarder_for(&config);
    let state = Arc::new(AppState { config, forwarder });
    let app = build_router(state).expect("router");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let addr = listener.local_addr().expect("relay addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve relay");
    });

    addr
}
