mod common;

pub mod async_ext;
pub mod classify;
pub mod context;
pub mod rail;
