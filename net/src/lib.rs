pub mod backend;
pub mod framing;
pub mod transport;

pub use backend::{BackendRegistry, HealthCheckProbe, IprouteBackend, NetworkBackend, NoopBackend};
pub use framing::{frames, recv_message, send_message};
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};
