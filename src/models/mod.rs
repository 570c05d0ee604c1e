pub mod member;
pub mod item;
pub mod log_entry;
pub mod organization_model;

pub use member::*;
pub use item::*;
pub use log_entry::*;
pub use organization_model::*;
