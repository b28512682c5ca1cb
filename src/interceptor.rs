//! Attaches the stored access token to outgoing requests.

use std::sync::Arc;

use reqwest::RequestBuilder;

use crate::auth::TokenStore;

/// Bearer-token request decorator.
///
/// Reads the token store on every call and never writes to it. No refresh
/// is attempted here: an expired token simply yields a 401 for the caller.
#[derive(Clone)]
pub struct AuthInterceptor {
    tokens: Arc<TokenStore>,
}

impl AuthInterceptor {
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        Self { tokens }
    }

    /// Add `Authorization: Bearer <token>` when a token is stored
    pub fn intercept(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}
