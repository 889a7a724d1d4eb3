pub mod backend;
pub mod cache;
pub mod db;
pub mod delivery;
pub mod memory;
