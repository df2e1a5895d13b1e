//! Error types for Bluetooth session management.

use thiserror::Error;

/// Bluetooth-specific error types.
#[derive(Error, Debug)]
pub enum BluetoothError {
    /// Bluetooth adapter not found on the bus.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// IPC failure talking to the Bluetooth service.
    #[error("transport error: {0}")]
    Transport(String),

    /// Device path no longer exists on the bus.
    #[error("Bluetooth device not found: {0}")]
    DeviceNotFound(String),

    /// A track metadata field could not be parsed.
    ///
    /// Never fatal: the field is logged and treated as absent.
    #[error("malformed track metadata field {field}: {value}")]
    MetadataParse { field: String, value: String },

    /// An explicit adapter/device command failed.
    #[error("{operation} failed for {path}: {source}")]
    AdapterOperationFailed {
        operation: &'static str,
        path: String,
        #[source]
        source: Box<BluetoothError>,
    },

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl BluetoothError {
    /// Wrap an error as a failed explicit operation against a path.
    pub fn operation(operation: &'static str, path: impl Into<String>, source: Self) -> Self {
        Self::AdapterOperationFailed {
            operation,
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error means the target object vanished from the bus.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound(_))
    }
}

/// Convenience Result type for Bluetooth operations.
pub type Result<T> = std::result::Result<T, BluetoothError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = BluetoothError::AdapterNotFound;
        assert!(err.to_string().contains("adapter not found"));

        let err = BluetoothError::DeviceNotFound("/org/bluez/hci0/dev_AA".to_string());
        assert!(err.to_string().contains("dev_AA"));

        let err = BluetoothError::MetadataParse {
            field: "Duration".to_string(),
            value: "abc".to_string(),
        };
        assert!(err.to_string().contains("Duration"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn operation_wraps_cause() {
        let err = BluetoothError::operation(
            "connect",
            "/org/bluez/hci0/dev_AA",
            BluetoothError::Transport("timed out".to_string()),
        );
        let text = err.to_string();
        assert!(text.contains("connect failed"));
        assert!(text.contains("dev_AA"));

        match err {
            BluetoothError::AdapterOperationFailed { source, .. } => {
                assert!(matches!(*source, BluetoothError::Transport(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn not_found_predicate() {
        assert!(BluetoothError::DeviceNotFound("/x".to_string()).is_not_found());
        assert!(!BluetoothError::Transport("x".to_string()).is_not_found());
    }
}
