pub mod codegen;
pub mod housekeeping;
pub mod issue;
pub mod rate_limit;
pub mod stats;
pub mod status;
pub mod verify;
