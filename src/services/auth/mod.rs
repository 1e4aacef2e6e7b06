pub mod claims;
pub mod directory;
pub mod error;
pub mod fingerprint;
pub mod jwt;
pub mod login_service;
pub mod password;
pub mod token_issuer;

pub use claims::{TokenClaims, TokenGrant, TokenKind};
pub use error::AuthError;
pub use login_service::LoginService;
pub use token_issuer::{IssuedPair, IssuedToken, TokenIssuer, TokenLifetimes};
