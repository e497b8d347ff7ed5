use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

const ERROR_BODY_PREVIEW_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RequestPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(8),
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum HttpError {
    #[error("HTTP status {status}{}", preview_suffix(.preview))]
    Status { status: u16, preview: String },
    #[error("HTTP status {status}{} after {attempts} attempt(s)", preview_suffix(.preview))]
    StatusExhausted {
        status: u16,
        preview: String,
        attempts: usize,
    },
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport { message: String, attempts: usize },
    #[error("response decode failed: {0}")]
    Body(#[source] std::io::Error),
}

fn preview_suffix(preview: &str) -> String {
    if preview.is_empty() {
        String::new()
    } else {
        format!(" ({preview})")
    }
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

fn body_preview(response: ureq::Response) -> String {
    let body = response.into_string().ok().unwrap_or_default();
    body.trim().chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
}

/// Issues a GET and returns the body, retrying 408/429/5xx statuses and
/// transport failures up to `policy.attempts` times.
pub(crate) fn get_text_with_retries(
    url: &str,
    headers: &[(&str, String)],
    query: &[(&str, String)],
    policy: &RequestPolicy,
) -> Result<String, HttpError> {
    let attempts = policy.attempts.max(1);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .build();

    let mut attempt = 1;
    loop {
        let mut request = agent.get(url).set("Accept", "application/json");
        for (name, value) in headers {
            request = request.set(name, value);
        }
        for (key, value) in query {
            request = request.query(key, value);
        }

        debug!(url, attempt, "catalog request");
        let retry_reason = match request.call() {
            Ok(response) => return response.into_string().map_err(HttpError::Body),
            Err(ureq::Error::Status(status, response)) => {
                let preview = body_preview(response);
                if !should_retry_http_status(status) {
                    return Err(HttpError::Status { status, preview });
                }
                if attempt >= attempts {
                    return Err(HttpError::StatusExhausted {
                        status,
                        preview,
                        attempts,
                    });
                }
                format!("HTTP status {status}")
            }
            Err(ureq::Error::Transport(err)) => {
                if attempt >= attempts {
                    return Err(HttpError::Transport {
                        message: err.to_string(),
                        attempts,
                    });
                }
                err.to_string()
            }
        };

        warn!(url, attempt, attempts, reason = %retry_reason, "retrying catalog request");
        thread::sleep(policy.retry_delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    enum Reply {
        Status(u16, String),
        Slow(Duration, u16, String),
    }

    struct StubCatalog {
        base_url: String,
        seen: Arc<Mutex<Vec<String>>>,
        shutdown_tx: mpsc::Sender<()>,
        join_handle: Option<std::thread::JoinHandle<()>>,
    }

    impl StubCatalog {
        fn start(replies: Vec<Reply>) -> Self {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind stub catalog");
            listener.set_nonblocking(true).expect("set nonblocking");
            let addr = listener.local_addr().expect("local addr");

            let seen = Arc::new(Mutex::new(Vec::new()));
            let seen_clone = Arc::clone(&seen);
            let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

            let join_handle = std::thread::spawn(move || {
                while shutdown_rx.try_recv().is_err() {
                    match listener.accept() {
                        Ok((mut stream, _)) => {
                            let reply = replies
                                .lock()
                                .expect("lock replies")
                                .pop_front()
                                .unwrap_or_else(|| Reply::Status(200, "{}".to_string()));
                            let seen = Arc::clone(&seen_clone);
                            std::thread::spawn(move || {
                                let head = read_request_head(&mut stream);
                                seen.lock().expect("lock seen").push(head);
                                answer(&mut stream, reply);
                            });
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            });

            Self {
                base_url: format!("http://{addr}"),
                seen,
                shutdown_tx,
                join_handle: Some(join_handle),
            }
        }

        fn requests(&self) -> Vec<String> {
            self.seen.lock().expect("lock seen").clone()
        }
    }

    impl Drop for StubCatalog {
        fn drop(&mut self) {
            let _ = self.shutdown_tx.send(());
            if let Some(handle) = self.join_handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn read_request_head(stream: &mut TcpStream) -> String {
        let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
        let mut buf = [0_u8; 1024];
        let mut data = Vec::new();
        while let Ok(read) = stream.read(&mut buf) {
            if read == 0 {
                break;
            }
            data.extend_from_slice(&buf[..read]);
            if data.windows(4).any(|window| window == b"\r\n\r\n") {
                break;
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn answer(stream: &mut TcpStream, reply: Reply) {
        let (status, body) = match reply {
            Reply::Status(status, body) => (status, body),
            Reply::Slow(delay, status, body) => {
                std::thread::sleep(delay);
                (status, body)
            }
        };
        let _ = write!(
            stream,
            "HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.flush();
    }

    fn fast_policy(attempts: usize) -> RequestPolicy {
        RequestPolicy {
            connect_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(200),
            attempts,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn retries_throttling_and_server_errors_until_success() {
        let stub = StubCatalog::start(vec![
            Reply::Status(503, "busy".to_string()),
            Reply::Status(429, "slow down".to_string()),
            Reply::Status(200, "{\"ok\":true}".to_string()),
        ]);

        let body = get_text_with_retries(&stub.base_url, &[], &[], &fast_policy(3))
            .expect("third attempt should succeed");

        assert_eq!(body, "{\"ok\":true}");
        assert_eq!(stub.requests().len(), 3);
    }

    #[test]
    fn not_found_fails_without_retrying() {
        let stub = StubCatalog::start(vec![Reply::Status(404, "no such anime".to_string())]);

        let err = get_text_with_retries(&stub.base_url, &[], &[], &fast_policy(4))
            .expect_err("404 is not retryable");

        assert!(
            matches!(err, HttpError::Status { status: 404, ref preview } if preview == "no such anime"),
            "unexpected error: {err}"
        );
        assert_eq!(stub.requests().len(), 1);
    }

    #[test]
    fn slow_response_is_retried_as_transport_failure() {
        let stub = StubCatalog::start(vec![
            Reply::Slow(Duration::from_millis(150), 200, "late".to_string()),
            Reply::Status(200, "on time".to_string()),
        ]);
        let policy = RequestPolicy {
            read_timeout: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(250),
            ..fast_policy(2)
        };

        let body = get_text_with_retries(&stub.base_url, &[], &[], &policy)
            .expect("timeout should be retried");

        assert_eq!(body, "on time");
        assert_eq!(stub.requests().len(), 2);
    }

    #[test]
    fn exhausted_retries_report_attempt_count() {
        let stub = StubCatalog::start(vec![
            Reply::Status(500, "down".to_string()),
            Reply::Status(500, "still down".to_string()),
        ]);

        let err = get_text_with_retries(&stub.base_url, &[], &[], &fast_policy(2))
            .expect_err("both attempts fail");

        let message = err.to_string();
        assert!(
            message.contains("HTTP status 500") && message.contains("after 2 attempt(s)"),
            "unexpected error message: {message}"
        );
    }

    #[test]
    fn sends_query_and_custom_headers() {
        let stub = StubCatalog::start(vec![Reply::Status(200, "[]".to_string())]);
        let headers = [("X-AppId", "app-1".to_string())];
        let query = [("anime", "Show A".to_string())];

        get_text_with_retries(&stub.base_url, &headers, &query, &fast_policy(1))
            .expect("request succeeds");

        let requests = stub.requests();
        let head = requests.first().expect("one request recorded");
        assert!(head.starts_with("GET /?anime=Show"), "unexpected head: {head}");
        assert!(head.to_ascii_lowercase().contains("x-appid: app-1"));
    }
}
