//! Savestate containers: a `StateArchive` holds named `RegisterStateFile`s, each a set of named
//! 32-bit registers.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{DmacError, DmacResult};

/// Savestate magic, followed by the little endian length of the flexbuffer payload
const STATE_MAGIC: &[u8; 4] = b"DMS1";
const STATE_HEADER_LEN: usize = 8;

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct RegisterStateFile {
    path: String,
    registers: FnvHashMap<String, u32>,
}

impl RegisterStateFile {
    pub fn new(path: &str) -> RegisterStateFile {
        RegisterStateFile {
            path: path.to_string(),
            registers: FnvHashMap::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_register32(&mut self, name: &str, v: u32) {
        self.registers.insert(name.to_string(), v);
    }

    pub fn register32(&self, name: &str) -> DmacResult<u32> {
        self.registers
            .get(name)
            .copied()
            .ok_or_else(|| DmacError::MissingRegister {
                file: self.path.clone(),
                register: name.to_string(),
            })
    }

    /// Drop register `name`, returns its value if it was present
    pub fn remove_register(&mut self, name: &str) -> Option<u32> {
        self.registers.remove(name)
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct StateArchive {
    files: FnvHashMap<String, RegisterStateFile>,
}

impl StateArchive {
    pub fn new() -> StateArchive {
        StateArchive::default()
    }

    /// Add `file`, replacing any previous file with the same path
    pub fn insert_file(&mut self, file: RegisterStateFile) {
        self.files.insert(file.path.clone(), file);
    }

    pub fn file(&self, path: &str) -> DmacResult<&RegisterStateFile> {
        self.files
            .get(path)
            .ok_or_else(|| DmacError::MissingStateFile(path.to_string()))
    }

    pub fn file_mut(&mut self, path: &str) -> Option<&mut RegisterStateFile> {
        self.files.get_mut(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_bytes(&self) -> DmacResult<Vec<u8>> {
        let mut fb = flexbuffers::FlexbufferSerializer::new();

        self.serialize(&mut fb)?;

        let payload = fb.view();

        let mut buf = Vec::with_capacity(STATE_HEADER_LEN + payload.len());
        buf.extend_from_slice(STATE_MAGIC);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);

        Ok(buf)
    }

    pub fn from_bytes(buf: &[u8]) -> DmacResult<StateArchive> {
        if buf.len() < STATE_HEADER_LEN {
            return Err(DmacError::BadStateFormat(format!(
                "truncated header ({} bytes)",
                buf.len()
            )));
        }

        if buf[0..4] != *STATE_MAGIC {
            return Err(DmacError::BadStateFormat("bad magic".to_string()));
        }

        let len = u32::from_le_bytes(*array_ref![buf, 4, 4]) as usize;

        let payload = match buf.get(STATE_HEADER_LEN..STATE_HEADER_LEN + len) {
            Some(p) => p,
            None => {
                return Err(DmacError::BadStateFormat(format!(
                    "payload is {} bytes, expected {}",
                    buf.len() - STATE_HEADER_LEN,
                    len
                )));
            }
        };

        let reader = flexbuffers::Reader::get_root(payload)?;

        Ok(StateArchive::deserialize(reader)?)
    }
}
