pub mod reddit;
pub mod session;
