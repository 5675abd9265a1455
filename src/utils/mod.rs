pub mod type_cache;
pub mod validation;
