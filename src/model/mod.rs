pub mod object;
pub mod store;
