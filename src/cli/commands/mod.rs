pub mod collections;
pub mod data;
