use thiserror::Error;

/// Missing or unusable configuration. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no configuration directory available")]
    NoConfigDir,

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{field}`: {value}")]
    Invalid { field: &'static str, value: String },
}

/// Sign-in failure. Fatal to the session.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid participant id: {0:?}")]
    InvalidId(String),

    #[error("identity file {path}: {reason}")]
    Identity { path: String, reason: String },

    #[error("profile update failed: {0}")]
    Profile(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Terminal failure of a thread subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("subscription failed: {0}")]
pub struct SubscriptionError(pub String);

impl From<StoreError> for SubscriptionError {
    fn from(err: StoreError) -> Self {
        Self(err.to_string())
    }
}

#[derive(Error, Debug)]
#[error("send failed: {0}")]
pub struct SendError(#[from] pub StoreError);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Body(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("PCM16 payload has odd byte length {0}")]
    OddLength(usize),

    #[error("WAV {0} does not fit in 32 bits")]
    HeaderOverflow(&'static str),
}

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("model returned no text")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unsupported audio format {0:?}")]
    UnsupportedFormat(String),

    #[error("response carried no audio")]
    MissingAudio,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("playback failed: {0}")]
    Playback(String),
}

/// Anything that stops the client from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("sign-in failed: {0}")]
    Auth(#[from] AuthError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
