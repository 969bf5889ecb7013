pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::{Claims, SubscriptionTier};
pub use jwt::JwtService;
pub use middleware::{AuthMiddleware, AuthenticatedUser};
