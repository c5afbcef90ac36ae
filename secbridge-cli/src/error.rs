//! CLI-specific error types and exit code mapping

use secbridge_core::error::BridgeError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad command-line input (unknown vendor, unparseable timestamp, ...).
    #[error("invalid argument: {0}")]
    Usage(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Every vendor stream failed, or a probe came back unhealthy.
    #[error("vendor unavailable: {0}")]
    VendorUnavailable(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from secbridge-core.
    #[error("{0}")]
    Bridge(#[from] BridgeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | General / command error                  |
    /// | 2    | Configuration or usage error             |
    /// | 3    | Vendor unavailable (all streams failed)  |
    /// | 4    | Credential or authentication failure     |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Usage(_) | Self::Bridge(BridgeError::Config(_)) => 2,
            Self::VendorUnavailable(_) => 3,
            Self::Bridge(
                BridgeError::CredentialNotFound { .. }
                | BridgeError::SecretStoreUnavailable { .. }
                | BridgeError::AuthenticationFailed { .. },
            ) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Bridge(_) => 1,
        }
    }
}
