// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every handler here runs behind jwt_auth_middleware and can extract the
// caller as Extension<AuthUser>.

pub mod items;
pub mod products;
pub mod users;
