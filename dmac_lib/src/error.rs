use thiserror::Error;

pub type DmacResult<T> = ::std::result::Result<T, DmacError>;

#[derive(Error, Debug)]
pub enum DmacError {
    #[error("DMAC channel {channel}: undefined transfer mode {mode}")]
    UndefinedMode { channel: u32, mode: u8 },
    #[error("DMAC channel {channel}: reserved tag ID {id} at TADR 0x{tadr:08x}")]
    ReservedTagId { channel: u32, id: u8, tadr: u32 },
    #[error("DMAC channel {channel}: CALL tag at 0x{tadr:08x} with a full address stack")]
    AddressStackOverflow { channel: u32, tadr: u32 },
    #[error("DMAC channel {channel}: RET tag at 0x{tadr:08x} with an empty address stack")]
    AddressStackUnderflow { channel: u32, tadr: u32 },
    #[error("DMAC channel {0} started while D_ENABLE holds the controller")]
    UnhandledGlobalEnable(u32),
    #[error("Savestate entry not found: {0}")]
    MissingStateFile(String),
    #[error("Register {register} missing from savestate entry {file}")]
    MissingRegister { file: String, register: String },
    #[error("Bad savestate format: {0}")]
    BadStateFormat(String),
    #[error("Couldn't serialize savestate: {0}")]
    Serialization(#[from] flexbuffers::SerializationError),
    #[error("Couldn't deserialize savestate: {0}")]
    Deserialization(#[from] flexbuffers::DeserializationError),
    #[error("Couldn't read savestate buffer: {0}")]
    Reader(#[from] flexbuffers::ReaderError),
}
