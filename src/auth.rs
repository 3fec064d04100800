use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use std::future::{ready, Ready};

/// Extractor for the GitHub access token in `Authorization: Bearer ...`.
/// The token is opaque to this service; it is forwarded upstream and
/// GitHub decides whether it is valid. Handlers that allow anonymous
/// access take `Option<Token>` instead.
pub struct Token(pub String);

impl FromRequest for Token {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        match BearerAuth::from_request(req, pl).into_inner() {
            Ok(bearer) => ready(Ok(Token(bearer.token().to_string()))),
            Err(_) => ready(Err(actix_web::error::ErrorUnauthorized(
                "Authorization required",
            ))),
        }
    }
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Borrow the inner token out of an optional extractor.
pub fn maybe_token(token: &Option<Token>) -> Option<&str> {
    token.as_ref().map(|t| t.0.as_str())
}
