pub mod ardor;
pub mod polygon;
pub mod retry;

pub use ardor::ArdorClient;
pub use polygon::PolygonClient;
