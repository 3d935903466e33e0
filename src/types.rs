use reqwest::header::HeaderMap;

/// Untyped response body after content-type driven parsing.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// `204 No Content`.
    Empty,
    Json(serde_json::Value),
    Text(String),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Successful terminal outcome of a request.
#[derive(Clone, Debug)]
pub struct Response<T> {
    /// Parsed body; `None` for `204 No Content`.
    pub data: Option<T>,
    pub status: u16,
    pub headers: HeaderMap,
}

impl<T> Response<T> {
    /// Returns the parsed body, dropping status and headers.
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

/// Body, status and headers of a completed exchange attached to an error.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseSnapshot {
    pub body: Body,
    pub status: u16,
    pub headers: HeaderMap,
}
