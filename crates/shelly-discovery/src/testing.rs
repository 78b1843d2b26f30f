//! Local HTTP server standing in for a Shelly device in tests

use axum::{http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Canned responses for `/shelly` and `/settings`, with per-endpoint call counters
pub(crate) struct MockDevice {
    addr: SocketAddr,
    shelly_calls: Arc<AtomicUsize>,
    settings_calls: Arc<AtomicUsize>,
}

impl MockDevice {
    pub(crate) async fn spawn(
        shelly: (StatusCode, &'static str),
        settings: (StatusCode, &'static str),
    ) -> Self {
        let shelly_calls = Arc::new(AtomicUsize::new(0));
        let settings_calls = Arc::new(AtomicUsize::new(0));

        let app = Router::new()
            .route("/shelly", get(canned(shelly, shelly_calls.clone())))
            .route("/settings", get(canned(settings, settings_calls.clone())));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            shelly_calls,
            settings_calls,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn shelly_calls(&self) -> usize {
        self.shelly_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn settings_calls(&self) -> usize {
        self.settings_calls.load(Ordering::SeqCst)
    }
}

fn canned(
    response: (StatusCode, &'static str),
    calls: Arc<AtomicUsize>,
) -> impl Fn() -> std::future::Ready<(StatusCode, &'static str)> + Clone + Send + Sync + 'static {
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(response)
    }
}

/// A local port with nothing listening on it
pub(crate) async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
