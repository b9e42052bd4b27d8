// handlers/public/mod.rs - Public handlers (no authentication)
//
// Route Prefix: /api/auth/* for token acquisition, plus read-only product views.

pub mod auth;
pub mod products;
