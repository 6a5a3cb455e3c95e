#[derive(Debug, thiserror::Error)]
pub enum RdpGamepadError {
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("ViGEmBus error: {0}")]
    ViGEm(String),

    #[error("Processor is already running")]
    AlreadyRunning,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Platform not supported: {0}")]
    PlatformNotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RdpGamepadError>;
