use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Bearer token claims as issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Profile id of the caller
    pub user_id: u64,
    pub sub: String,
    pub exp: usize,
    pub jti: String,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Shared `page` / `per_page` query parameters.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    #[schema(example = 1)]
    /// Page number, starting at 1
    pub page: Option<u32>,
    #[schema(example = 20)]
    /// Items per page, at most 100
    pub per_page: Option<u32>,
}

impl Pagination {
    /// `(page, per_page, offset)` with defaults applied.
    pub fn resolve(&self) -> (u32, u32, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page as u64 - 1) * per_page as u64;
        (page, per_page, offset)
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Leave approved")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let p = Pagination {
            page: None,
            per_page: None,
        };
        assert_eq!(p.resolve(), (1, 20, 0));

        let p = Pagination {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(p.resolve(), (1, 100, 0));

        let p = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(p.resolve(), (3, 10, 20));
    }
}
