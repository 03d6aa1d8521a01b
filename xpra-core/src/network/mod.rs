mod connection;

pub use connection::{TcpTransport, TransportEvents};
