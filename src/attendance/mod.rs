pub mod export;
pub mod guard;
pub mod notification;
pub mod reconcile;
pub mod store;
