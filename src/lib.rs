pub mod about;
pub mod catalog;
pub mod config;
pub mod input;
pub mod project;
pub mod table;

pub use labplan_engine as engine;
pub use labplan_protocol as protocol;
