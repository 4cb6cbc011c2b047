pub mod auth;
pub mod json_error;
pub mod jwt;
pub mod product;
pub mod server_config;

pub use self::auth::{AuthError, AuthenticationRequest, AuthenticationResponse, RegisterRequest};
pub use self::json_error::ErrorResponse;
pub use self::jwt::{JwtClaims, TokenKind};
pub use self::product::{Image, Product, ProductImage, Rate};
pub use self::server_config::{AppConfig, ConfigError, CookieConfig, SameSitePolicy};
