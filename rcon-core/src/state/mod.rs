pub mod connection;
pub mod pending;

pub use connection::ConnectionState;
pub use pending::{
    AUTH_FAILED_ID, AUTH_ID, FIRST_COMMAND_ID, PendingRequest, PendingTable, ResponseReceiver,
};
