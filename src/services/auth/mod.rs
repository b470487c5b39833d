pub mod jwt;
pub mod public_key;

pub use jwt::{Claims, Jwt, JwtAuthenticator, VerificationOptions};
pub use public_key::{PublicKeyProvider, VerificationKeySupplier};
