pub mod primary_keys;
pub mod relations;
