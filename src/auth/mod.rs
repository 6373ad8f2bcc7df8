//! Authentication: password hashing, session tokens and the request extractor

mod extractor;
mod password;
mod service;
mod token;

pub use extractor::AuthUser;
pub use password::{hash_password, verify_password};
pub use service::{
    is_valid_email, AuthService, LoginRequest, LoginResponse, RegisterRequest, MIN_PASSWORD_LENGTH,
};
pub use token::{Claims, TokenError, TokenService};
