//! Identity token issuing and verification.

pub mod jwt;

pub use jwt::{IssuedToken, JwtError, JwtService, TokenClaims, TokenClaimsBuilder};
