pub mod jwt;
pub mod password;
pub mod rate_limit;

pub use jwt::{Claims, CredentialError, CredentialIssuer, TokenPair};
pub use password::{hash_password, verify_password};
pub use rate_limit::RateLimiter;
