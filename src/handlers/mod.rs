// handlers/mod.rs - two security tiers
//
// Public (no auth) → Protected (JWT auth)
pub mod protected;
pub mod public;
pub mod utils;
