use crate::{
    sort_entries, CatalogEntry, CatalogQuery, RegistryBackend, RemoteConfig, RemoteError,
    WriteCondition,
};
use exechub_schema::ImageIdentity;
use std::io::Read;

/// HTTP-based registry backend.
///
/// Expects a simple REST API:
/// - `PUT  /images/<ns>/<name>/<version>`  — upload an image archive
/// - `GET  /images/<ns>/<name>/<version>`  — download an image archive
/// - `GET  /catalog/<ns>/<name>/<version>` — one catalog entry (JSON)
/// - `PUT  /catalog/<ns>/<name>/<version>` — write an entry; `If-None-Match: *`
///   makes the write conditional (409/412 when it already exists)
/// - `GET  /catalog?name=&keywords=&type=` — filtered entries (JSON array)
pub struct HttpRegistry {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl HttpRegistry {
    /// Request and response heads are bounded by `timeout`; image bodies by
    /// the separate `transfer_timeout`.
    pub fn new(config: RemoteConfig) -> Self {
        let head = Some(config.timeout());
        let body = config.transfer_timeout();
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(head)
            .timeout_send_request(head)
            .timeout_recv_response(head)
            .timeout_send_body(body)
            .timeout_recv_body(body)
            .build()
            .into();
        Self { config, agent }
    }

    fn path_for(&self, kind: &str, identity: &ImageIdentity) -> String {
        format!(
            "{}/{kind}/{}/{}/{}",
            self.config.url, identity.namespace, identity.name, identity.version
        )
    }

    fn with_headers<B>(&self, mut req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        req = req.header("X-Hub-Protocol", &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        req
    }

    fn do_put(
        &self,
        url: &str,
        content_type: &str,
        data: &[u8],
        if_none_match: bool,
    ) -> Result<(), RemoteError> {
        let mut req = self
            .with_headers(self.agent.put(url))
            .header("Content-Type", content_type);
        if if_none_match {
            req = req.header("If-None-Match", "*");
        }
        req.send(data).map_err(|e| map_error(e, url))?;
        Ok(())
    }

    fn do_get(
        &self,
        req: ureq::RequestBuilder<ureq::typestate::WithoutBody>,
        url: &str,
    ) -> Result<Vec<u8>, RemoteError> {
        let resp = self
            .with_headers(req)
            .call()
            .map_err(|e| map_error(e, url))?;

        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(body)
    }
}

/// Translate a transport or status error into the remote taxonomy.
fn map_error(err: ureq::Error, url: &str) -> RemoteError {
    match err {
        ureq::Error::StatusCode(code @ (401 | 403)) => {
            RemoteError::Unauthorized(format!("HTTP {code} for {url}"))
        }
        ureq::Error::StatusCode(404) => RemoteError::NotFound(url.to_owned()),
        ureq::Error::StatusCode(409 | 412) => RemoteError::Conflict(url.to_owned()),
        ureq::Error::StatusCode(code @ (408 | 429 | 500..=599)) => {
            RemoteError::Network(format!("HTTP {code} for {url}"))
        }
        ureq::Error::StatusCode(code) => RemoteError::Http(format!("HTTP {code} for {url}")),
        other => RemoteError::Network(format!("{url}: {other}")),
    }
}

impl RegistryBackend for HttpRegistry {
    fn location(&self) -> String {
        self.config.url.clone()
    }

    fn requires_auth(&self) -> bool {
        true
    }

    fn push_image(&self, identity: &ImageIdentity, data: &[u8]) -> Result<(), RemoteError> {
        let url = self.path_for("images", identity);
        tracing::debug!("PUT {url} ({} bytes)", data.len());
        self.do_put(&url, "application/octet-stream", data, false)
    }

    fn pull_image(&self, identity: &ImageIdentity) -> Result<Vec<u8>, RemoteError> {
        let url = self.path_for("images", identity);
        tracing::debug!("GET {url}");
        self.do_get(self.agent.get(&url), &url)
    }

    fn lookup(&self, identity: &ImageIdentity) -> Result<Option<CatalogEntry>, RemoteError> {
        let url = self.path_for("catalog", identity);
        tracing::debug!("GET {url}");
        match self.do_get(self.agent.get(&url), &url) {
            Ok(body) => serde_json::from_slice(&body)
                .map(Some)
                .map_err(|e| RemoteError::Serialization(format!("invalid catalog entry: {e}"))),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn upsert(&self, entry: &CatalogEntry, condition: WriteCondition) -> Result<(), RemoteError> {
        let url = self.path_for("catalog", &entry.identity);
        tracing::debug!("PUT {url} ({condition:?})");
        let body =
            serde_json::to_vec(entry).map_err(|e| RemoteError::Serialization(e.to_string()))?;
        self.do_put(
            &url,
            "application/json",
            &body,
            condition == WriteCondition::MustNotExist,
        )
        .map_err(|e| match e {
            RemoteError::Conflict(_) => RemoteError::Conflict(entry.identity.to_string()),
            other => other,
        })
    }

    fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogEntry>, RemoteError> {
        let url = format!("{}/catalog", self.config.url);
        let mut req = self.agent.get(&url);
        if let Some(ref name) = query.name {
            req = req.query("name", name);
        }
        if !query.keywords.is_empty() {
            req = req.query("keywords", query.keywords.join(","));
        }
        if let Some(ref t) = query.executor_type {
            req = req.query("type", t);
        }
        tracing::debug!("GET {url} {query:?}");
        let body = self.do_get(req, &url)?;
        let entries: Vec<CatalogEntry> = serde_json::from_slice(&body)
            .map_err(|e| RemoteError::Serialization(format!("invalid catalog listing: {e}")))?;

        // Re-apply filters and ordering so results do not depend on the server.
        let mut found: Vec<CatalogEntry> =
            entries.into_iter().filter(|e| query.matches(e)).collect();
        sort_entries(&mut found);
        Ok(found)
    }
}
