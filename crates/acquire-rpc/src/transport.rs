//! Transport abstraction for delivering packed envelopes.
//!
//! A transport posts request bytes to a service URL and returns the raw
//! reply. It knows nothing about envelopes.

use std::time::Duration;

use crate::error::Result;

/// A service's raw reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Reply body.
    pub content: Vec<u8>,
}

impl TransportResponse {
    /// Whether the service accepted the request.
    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }
}

/// Delivers request bytes to a service.
///
/// Implementations must be thread-safe (Send + Sync). Calls block.
pub trait Transport: Send + Sync {
    /// POST `body` to `url`, waiting at most `timeout`.
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<TransportResponse>;
}

/// Transport over HTTP(S).
pub mod http {
    use super::*;
    use crate::error::RpcError;

    use reqwest::blocking::Client;
    use reqwest::header::CONTENT_TYPE;

    /// Posts envelopes with a blocking HTTP client.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: Client,
    }

    impl HttpTransport {
        /// Create a transport with a fresh connection pool.
        pub fn new() -> Result<Self> {
            let client = Client::builder()
                .build()
                .map_err(|e| RpcError::Transport(format!("cannot build HTTP client: {e}")))?;
            Ok(Self::with_client(client))
        }

        /// Wrap an existing client, for instance one with custom proxy or
        /// TLS settings.
        pub fn with_client(client: Client) -> Self {
            Self { client }
        }
    }

    impl Transport for HttpTransport {
        fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<TransportResponse> {
            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .timeout(timeout)
                .body(body)
                .send()
                .map_err(|e| RpcError::Transport(format!("cannot reach {url}: {e}")))?;

            let status_code = response.status().as_u16();
            let content = response
                .bytes()
                .map_err(|e| RpcError::Transport(format!("cannot read reply from {url}: {e}")))?
                .to_vec();

            Ok(TransportResponse {
                status_code,
                content,
            })
        }
    }
}

/// An in-process transport for testing.
///
/// Requests go straight to registered dispatchers, no sockets involved.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, RwLock};

    use crate::directory::canonicalize;
    use crate::dispatcher::Dispatcher;
    use crate::error::RpcError;
    use crate::handler::Router;

    #[derive(Clone)]
    enum Endpoint {
        Service {
            dispatcher: Arc<Dispatcher>,
            router: Option<Arc<dyn Router>>,
        },
        Status(u16),
        Unreachable,
    }

    /// Routes posts to dispatchers by URL.
    #[derive(Default)]
    pub struct InProcessTransport {
        endpoints: RwLock<HashMap<String, Endpoint>>,
        posts: AtomicUsize,
    }

    impl InProcessTransport {
        /// Create a transport with no endpoints.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Serve `dispatcher` at its canonical URL.
        pub fn serve(&self, dispatcher: Arc<Dispatcher>) -> Result<()> {
            self.serve_routed(dispatcher, None)
        }

        /// Serve `dispatcher`, handing unknown functions to `router`.
        pub fn serve_routed(
            &self,
            dispatcher: Arc<Dispatcher>,
            router: Option<Arc<dyn Router>>,
        ) -> Result<()> {
            let url = canonicalize(dispatcher.canonical_url()).to_string();
            self.insert(url, Endpoint::Service { dispatcher, router })
        }

        /// Answer every post to `url` with an empty body and `status_code`.
        pub fn respond_with_status(&self, url: &str, status_code: u16) -> Result<()> {
            self.insert(canonicalize(url).to_string(), Endpoint::Status(status_code))
        }

        /// Fail every post to `url` as if the network were down.
        pub fn make_unreachable(&self, url: &str) -> Result<()> {
            self.insert(canonicalize(url).to_string(), Endpoint::Unreachable)
        }

        /// Number of posts delivered so far.
        pub fn post_count(&self) -> usize {
            self.posts.load(Ordering::SeqCst)
        }

        fn insert(&self, url: String, endpoint: Endpoint) -> Result<()> {
            self.endpoints
                .write()
                .map_err(|_| RpcError::Transport("endpoint table lock poisoned".into()))?
                .insert(url, endpoint);
            Ok(())
        }
    }

    impl Transport for InProcessTransport {
        fn post(&self, url: &str, body: Vec<u8>, _timeout: Duration) -> Result<TransportResponse> {
            self.posts.fetch_add(1, Ordering::SeqCst);

            // Release the table before dispatching; handlers may post again.
            let endpoint = {
                let endpoints = self
                    .endpoints
                    .read()
                    .map_err(|_| RpcError::Transport("endpoint table lock poisoned".into()))?;
                endpoints.get(canonicalize(url)).cloned()
            };

            match endpoint {
                Some(Endpoint::Service { dispatcher, router }) => Ok(TransportResponse {
                    status_code: 200,
                    content: dispatcher.handle(&body, router.as_deref()),
                }),
                Some(Endpoint::Status(status_code)) => Ok(TransportResponse {
                    status_code,
                    content: Vec::new(),
                }),
                Some(Endpoint::Unreachable) => {
                    Err(RpcError::Transport(format!("cannot reach {url}")))
                }
                None => Ok(TransportResponse {
                    status_code: 404,
                    content: format!("no service at {url}").into_bytes(),
                }),
            }
        }
    }
}
