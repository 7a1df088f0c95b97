use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unable to resolve gateway address {target}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("Gateway client has no open connection")]
    NotConnected,

    #[error("Payload of {len} bytes does not fit the {capacity} byte send buffer")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("Payload contains characters that {encoding} cannot represent")]
    Unencodable { encoding: &'static str },

    #[error("Unknown text encoding label: {label}")]
    UnknownEncoding { label: String },

    #[error("Write deadline reached after {written} of {total} bytes")]
    PartialWrite { written: usize, total: usize },

    #[error("Gateway {op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl GatewayError {
    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        GatewayError::Io { op, source }
    }

    /// True for errors after which the connection must be assumed unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::Io { .. } | GatewayError::PartialWrite { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        let io_err = GatewayError::io("read", io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(io_err.is_fatal());
        assert!(GatewayError::PartialWrite { written: 1, total: 2 }.is_fatal());
        assert!(!GatewayError::NotConnected.is_fatal());
        assert!(!GatewayError::PayloadTooLarge { len: 5000, capacity: 4096 }.is_fatal());
    }

    #[test]
    fn io_message_names_operation() {
        let err = GatewayError::io("write", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.to_string().starts_with("Gateway write failed"));
    }
}
