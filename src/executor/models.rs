use serde_json::Value;

/// A received response, fully buffered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub duration_ms: f64,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// First `limit` bytes as text, for logs.
    pub fn preview(&self, limit: usize) -> String {
        let slice = if self.body.len() > limit {
            &self.body[..limit]
        } else {
            &self.body[..]
        };
        String::from_utf8_lossy(slice).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.as_bytes().to_vec(),
            duration_ms: 1.0,
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = response("{}");
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("x-missing"), None);
    }

    #[test]
    fn json_and_text_views() {
        let resp = response(r#"{"id": 7}"#);
        assert_eq!(resp.json().unwrap(), json!({"id": 7}));
        assert_eq!(resp.text(), r#"{"id": 7}"#);
        assert!(response("not json").json().is_err());
    }

    #[test]
    fn preview_truncates() {
        let resp = response("abcdef");
        assert_eq!(resp.preview(3), "abc");
        assert_eq!(resp.preview(100), "abcdef");
    }
}
