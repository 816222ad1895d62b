//! HTTP response wrapper with a byte-capped body.

use std::collections::HashMap;

use reqwest::{Response, StatusCode};

use super::FetchError;

enum ResponseBody {
    /// Headers have arrived; the body is still on the wire.
    Pending(Response),
    Ready(Vec<u8>),
}

/// A fetched response. The body is read lazily and never past `max_bytes`.
pub struct HttpResponse {
    pub url: String,
    pub status: StatusCode,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    body: ResponseBody,
    max_bytes: u64,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl HttpResponse {
    pub(crate) fn pending(response: Response, max_bytes: u64) -> Self {
        let url = response.url().to_string();
        let status = response.status();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), v.to_string());
            }
        }
        Self {
            url,
            status,
            headers,
            body: ResponseBody::Pending(response),
            max_bytes,
        }
    }

    /// Build a fully-read response, e.g. from an extraction API answer or in tests.
    pub fn from_parts(
        url: &str,
        status: u16,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            url: url.to_string(),
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers,
            max_bytes: body.len() as u64,
            body: ResponseBody::Ready(body),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection() && self.headers.contains_key("location")
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.body, ResponseBody::Ready(_))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|s| s.trim().parse().ok())
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.header("content-disposition")
    }

    /// Get the filename from Content-Disposition header.
    pub fn content_disposition_filename(&self) -> Option<String> {
        self.content_disposition()
            .and_then(parse_content_disposition_filename)
    }

    /// Read the body off the wire, aborting as soon as it passes the cap.
    pub async fn load(&mut self) -> Result<&[u8], FetchError> {
        let mut response = match std::mem::replace(&mut self.body, ResponseBody::Ready(Vec::new()))
        {
            ResponseBody::Pending(response) => response,
            ready => {
                self.body = ready;
                return Ok(self.body());
            }
        };

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                tracing::info!("Content too large on GET on {}", self.url);
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                    observed: declared,
                });
            }
        }

        let mut buf = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let observed = (buf.len() + chunk.len()) as u64;
            if observed > self.max_bytes {
                tracing::info!(
                    "Body of {} passed {} bytes, dropping it",
                    self.url,
                    self.max_bytes
                );
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                    observed,
                });
            }
            buf.extend_from_slice(&chunk);
        }
        self.body = ResponseBody::Ready(buf);
        Ok(self.body())
    }

    /// Body bytes read so far; empty until `load` has run.
    pub fn body(&self) -> &[u8] {
        match &self.body {
            ResponseBody::Ready(bytes) => bytes,
            ResponseBody::Pending(_) => &[],
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.body()).into_owned()
    }

    /// At most the first `limit` bytes of the body, decoded lossily.
    pub fn text_prefix(&self, limit: usize) -> String {
        let body = self.body();
        String::from_utf8_lossy(&body[..body.len().min(limit)]).into_owned()
    }

    pub fn into_body(self) -> Vec<u8> {
        match self.body {
            ResponseBody::Ready(bytes) => bytes,
            ResponseBody::Pending(_) => Vec::new(),
        }
    }
}

/// Parse filename from Content-Disposition header value.
/// Parses both `filename="name.pdf"` and `filename*=UTF-8''name.pdf` formats.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    if let Some(start) = header.find("filename*=") {
        let rest = &header[start + 10..];
        if let Some(quote_start) = rest.find("''") {
            let encoded = rest[quote_start + 2..].split([';', ' ']).next()?;
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let filename = decoded.trim().to_string();
                if !filename.is_empty() {
                    return Some(filename);
                }
            }
        }
    }

    if let Some(start) = header.find("filename=") {
        let rest = &header[start + 9..];
        let filename = if let Some(quoted) = rest.strip_prefix('"') {
            quoted.split('"').next()
        } else {
            rest.split([';', ' ']).next()
        };

        if let Some(name) = filename {
            let name = name.trim().to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_lowercases_headers() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/pdf".to_string());
        headers.insert("Content-Length".to_string(), "2048".to_string());
        let r = HttpResponse::from_parts("https://x.example/a.pdf", 200, headers, b"%PDF-1.4".to_vec());
        assert_eq!(r.content_type(), Some("application/pdf"));
        assert_eq!(r.content_length(), Some(2048));
        assert!(r.is_loaded());
        assert_eq!(r.text(), "%PDF-1.4");
        assert_eq!(r.text_prefix(4), "%PDF");
    }

    #[test]
    fn test_parse_content_disposition() {
        assert_eq!(
            parse_content_disposition_filename(r#"attachment; filename="paper.pdf""#),
            Some("paper.pdf".to_string())
        );
        assert_eq!(
            parse_content_disposition_filename("attachment; filename*=UTF-8''my%20paper.pdf"),
            Some("my paper.pdf".to_string())
        );
        assert_eq!(parse_content_disposition_filename("inline"), None);
    }
}
