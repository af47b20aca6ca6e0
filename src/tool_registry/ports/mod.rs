//! Port contracts for reaching tool-provider servers.

mod transport;

pub use transport::{
    CallOutcome, InitializeOutcome, ToolPage, ToolTransport, TransportConnector, TransportError,
    TransportResult,
};
