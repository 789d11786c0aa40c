pub mod engine;
pub mod metadata;
pub mod names;
pub mod pool;
pub mod reconcile;
pub mod transfer;
pub mod verify;
