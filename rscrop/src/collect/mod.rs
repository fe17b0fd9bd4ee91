pub mod admin;
pub mod global_variables;
pub mod ndvi;
