pub mod api;
pub mod badges;
pub mod models;
