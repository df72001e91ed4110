pub mod category_tree;
pub mod error;
pub mod models;
pub mod period;
