use thiserror::Error;
use dmac_lib::DmacError;

pub type Result<T> = ::std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Couldn't read config: {0}")]
    Config(#[from] ini::Error),
    #[error("Missing [{section}] {key} in config")]
    MissingKey { section: String, key: String },
    #[error("Bad value for [{section}] {key}: `{value}`")]
    BadValue {
        section: String,
        key: String,
        value: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Memory image is {size} bytes, doesn't fit at 0x{base:08x}")]
    ImageTooBig { size: usize, base: u32 },
    #[error("DMAC error: {0}")]
    Dmac(#[from] DmacError),
    #[error("Usage: dmac_app <config.ini>")]
    Usage,
}
