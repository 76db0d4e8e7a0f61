//! Interactive surface

mod console;

pub use console::{render_statuses, Console};
