pub mod catalog;
pub mod connection;
pub mod limits;
pub mod query;
pub mod readonly;
pub mod types;
pub mod value;
pub mod xevents;
