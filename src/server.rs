use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::health::HealthChecker;

pub struct HealthServer {
    health_checker: Arc<HealthChecker>,
    port: u16,
}

impl HealthServer {
    pub fn new(health_checker: Arc<HealthChecker>, port: u16) -> Self {
        Self { health_checker, port }
    }

    pub async fn start(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(("127.0.0.1", self.port)).await?;
        tracing::info!(port = self.port, "health server listening");
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (mut socket, peer) = listener.accept().await?;
            let health_checker = Arc::clone(&self.health_checker);

            tokio::spawn(async move {
                let mut buffer = [0; 1024];
                let n = match socket.read(&mut buffer).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };

                let request = String::from_utf8_lossy(&buffer[..n]);
                let response = Self::handle_request(&request, &health_checker);

                if let Err(e) = socket.write_all(response.as_bytes()).await {
                    tracing::debug!(%peer, error = %e, "health response not delivered");
                }
            });
        }
    }

    pub fn handle_request(request: &str, health_checker: &HealthChecker) -> String {
        let Some(request_line) = request.lines().next() else {
            return Self::error_response(400, "Bad Request");
        };
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            return Self::error_response(400, "Bad Request");
        };

        match (method, path) {
            ("GET", "/health") => Self::json_or_500(&health_checker.get_health()),
            ("GET", "/metrics") => {
                let prometheus = health_checker.collector().prometheus();
                prometheus.update_from_metrics(&health_checker.collector().get_metrics());
                match prometheus.export_metrics() {
                    Ok(text) => Self::response(200, "OK", "text/plain; version=0.0.4", &text),
                    Err(_) => Self::error_response(500, "Internal Server Error"),
                }
            }
            ("GET", "/metrics.json") => Self::json_or_500(&health_checker.get_metrics()),
            ("GET", "/status") => Self::json_or_500(&health_checker.get_detailed_status()),
            ("GET", "/") => Self::response(200, "OK", "text/html", INDEX_HTML),
            _ => Self::error_response(404, "Not Found"),
        }
    }

    fn json_or_500<T: serde::Serialize>(value: &T) -> String {
        match serde_json::to_string(value) {
            Ok(json) => Self::response(200, "OK", "application/json", &json),
            Err(_) => Self::error_response(500, "Internal Server Error"),
        }
    }

    fn response(status: u16, reason: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn error_response(status: u16, message: &str) -> String {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::response(status, message, "application/json", &body)
    }
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>entry-bridge</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .endpoint { margin: 20px 0; padding: 10px; background: #f5f5f5; }
        .endpoint h3 { margin: 0 0 10px 0; }
    </style>
</head>
<body>
    <h1>entry-bridge</h1>
    <div class="endpoint"><h3><a href="/health">/health</a></h3><p>Health status and uptime</p></div>
    <div class="endpoint"><h3><a href="/metrics">/metrics</a></h3><p>Prometheus exposition</p></div>
    <div class="endpoint"><h3><a href="/metrics.json">/metrics.json</a></h3><p>Metrics snapshot as JSON</p></div>
    <div class="endpoint"><h3><a href="/status">/status</a></h3><p>Outcome counts, error counts and configuration</p></div>
</body>
</html>
"#;
