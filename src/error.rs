/// Errors surfaced by the client.
///
/// Variants may still change while the api stabilizes.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The exchange failed before any HTTP status was obtained.
    #[error("network error: {}", .0)]
    Network(#[source] anyhow::Error),
    /// The token endpoint refused the refresh grant.
    #[error("failed to refresh token: {} {}", .status, .body)]
    TokenRefresh { status: u16, body: String },
    /// amoCRM answered a resource call with an error status.
    #[error("amoCRM API error: {} {}", .status, .body)]
    Api { status: u16, body: String },
    /// A success response did not carry the record it should embed.
    #[error("{}", .0)]
    UnexpectedPayload(&'static str),
    #[error("An error occurred: {}", .0)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// HTTP status carried by the error, when the exchange got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::TokenRefresh { status, .. } | Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
