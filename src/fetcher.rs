//! Streaming asset retrieval.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use crate::{
    config::Config,
    error::{Error, FetchError},
};

/// Body of a successful fetch, delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// How many leading bytes are inspected before a body is accepted.
pub const SNIFF_LEN: usize = 1024;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Lowercased fragments of known anti-automation interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "_incapsula_resource",
    "incapsula incident",
    "cf-chl",
    "challenge-platform",
    "captcha",
];

/// One retrieval attempt per call; retrying is left to later runs.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<ByteStream, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<ByteStream, FetchError> {
        debug!(%url, "GET asset");
        let mut response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let mut prefix = BytesMut::new();
        while prefix.len() < SNIFF_LEN {
            match response.chunk().await? {
                Some(chunk) => prefix.extend_from_slice(&chunk),
                None => break,
            }
        }
        let prefix = prefix.freeze();
        classify_body(content_type.as_deref(), &prefix)?;

        let head = stream::once(async move { Ok(prefix) });
        let rest = stream::unfold(Some(response), |state| async move {
            let mut response = state?;
            match response.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                Ok(None) => None,
                Err(e) => Some((Err(FetchError::from(e)), None)),
            }
        });
        Ok(head.chain(rest).boxed())
    }
}

/// Decides whether a 2xx body is the requested asset or a stand-in page.
///
/// Bodies starting with the PDF magic are always accepted. Challenge
/// markers, an HTML content type, HTML-looking bytes or an empty body mean
/// the server answered with something other than the document.
pub fn classify_body(content_type: Option<&str>, prefix: &[u8]) -> Result<(), FetchError> {
    if prefix.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    if prefix.is_empty() {
        return Err(FetchError::Blocked("empty body".to_string()));
    }

    let text = String::from_utf8_lossy(prefix).to_ascii_lowercase();
    if let Some(marker) = CHALLENGE_MARKERS.iter().find(|m| text.contains(*m)) {
        return Err(FetchError::Blocked(format!("challenge marker {marker:?}")));
    }

    let html_type = content_type
        .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("text/html"));
    if html_type || looks_like_html(&text) {
        return Err(FetchError::Blocked(
            "HTML page returned in place of the document".to_string(),
        ));
    }

    Ok(())
}

fn looks_like_html(lowercased: &str) -> bool {
    let start = lowercased.trim_start();
    start.starts_with("<!doctype html")
        || start.starts_with("<html")
        || start.starts_with("<head")
        || lowercased.contains("<html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INCAPSULA_PAGE: &[u8] = b"<html>\r\n<head>\r\n<META NAME=\"robots\" CONTENT=\"noindex,nofollow\">\r\n<script src=\"/_Incapsula_Resource?SWJIYLWA=5074a744e2e3d891814e9a2dace20bd4\">\r\n</script>\r\n<body>\r\n</body></html>\r\n";

    async fn serve(route: &str, template: ResponseTemplate) -> (MockServer, Url) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(&server)
            .await;
        let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
        (server, url)
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::with_client(reqwest::Client::new())
    }

    #[test]
    fn test_pdf_magic_is_accepted_even_as_html() {
        assert!(classify_body(Some("text/html"), b"%PDF-1.7\n%\xe2\xe3").is_ok());
    }

    #[test]
    fn test_challenge_page_is_blocked() {
        let err = classify_body(Some("application/pdf"), INCAPSULA_PAGE).unwrap_err();
        assert!(matches!(err, FetchError::Blocked(reason) if reason.contains("_incapsula_resource")));
    }

    #[test]
    fn test_html_content_type_is_blocked() {
        assert!(matches!(
            classify_body(Some("text/html; charset=utf-8"), b"Please wait..."),
            Err(FetchError::Blocked(_))
        ));
    }

    #[test]
    fn test_html_bytes_without_content_type_are_blocked() {
        assert!(matches!(
            classify_body(None, b"  <!DOCTYPE html><title>Wait</title>"),
            Err(FetchError::Blocked(_))
        ));
    }

    #[test]
    fn test_empty_body_is_blocked() {
        assert!(matches!(classify_body(Some("application/pdf"), b""), Err(FetchError::Blocked(_))));
    }

    #[test]
    fn test_other_binaries_are_accepted() {
        assert!(classify_body(Some("application/zip"), b"PK\x03\x04rest").is_ok());
    }

    #[tokio::test]
    async fn test_fetch_streams_whole_body() {
        let mut body = b"%PDF-1.4\n".to_vec();
        body.extend(std::iter::repeat_n(b'x', 64 * 1024));
        let (_server, url) = serve(
            "/files/doc.pdf",
            ResponseTemplate::new(200).set_body_raw(body.clone(), "application/pdf"),
        )
        .await;

        let stream = fetcher().fetch(&url).await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), body);
    }

    #[tokio::test]
    async fn test_fetch_reports_http_status() {
        let (_server, url) = serve("/files/missing.pdf", ResponseTemplate::new(404)).await;
        let err = fetcher().fetch(&url).await.err().unwrap();
        assert_eq!(err, FetchError::HttpStatus(404));
    }

    #[tokio::test]
    async fn test_fetch_rejects_challenge_page() {
        let (_server, url) = serve(
            "/files/doc.pdf",
            ResponseTemplate::new(200).set_body_raw(INCAPSULA_PAGE.to_vec(), "text/html"),
        )
        .await;
        let err = fetcher().fetch(&url).await.err().unwrap();
        assert!(matches!(err, FetchError::Blocked(_)));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/doc.pdf")).unwrap();
        let err = fetcher().fetch(&url).await.err().unwrap();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
