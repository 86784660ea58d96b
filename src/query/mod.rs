pub mod conjunction;
pub mod server;

pub use conjunction::*;
pub use server::QueryServer;
