pub mod mutex;
pub mod persistent;
pub mod volatile;
