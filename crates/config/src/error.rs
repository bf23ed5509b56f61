#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid integer `{value}` in {param}")]
    InvalidInteger { param: &'static str, value: String },

    #[error("Negative value {value} in {param}")]
    Negative { param: &'static str, value: i64 },

    #[error("Value {value} is out of range for {param}")]
    OutOfRange { param: &'static str, value: i64 },

    #[error("{param} holds {len} entries but at most {max} are allowed")]
    TooManyEntries {
        param: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{param} must be in ascending order")]
    NotAscending { param: &'static str },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid boolean `{value}` for {param}")]
    InvalidBool { param: &'static str, value: String },

    #[error("Failed to serialize TOML: {0}")]
    SerializeTOML(#[from] toml_edit::ser::Error),

    #[error("Failed to deserialize TOML: {0}")]
    DeserializeTOML(#[from] toml_edit::de::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseTOML(#[from] toml_edit::TomlError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}
