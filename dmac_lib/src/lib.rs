//! Emotion Engine DMAC emulation
//!
//! Each [`Channel`] owns its CHCR/MADR/QWC/TADR/ASR registers and knows how to run a normal block
//! transfer or walk a source chain of DMA tags. Everything controller-wide (D_ENABLE, D_STAT, the
//! tag memory) is reached through the [`DmacOwner`] trait. [`Dmac`] wires the ten EE channels to
//! [`DmacState`], its implementation of that trait.

// Register widths are fixed by the hardware, "as" casts between them are intended
#![allow(clippy::cast_lossless)]
// The bitfield! macro generates getters the linter doesn't like
#![allow(clippy::identity_op)]

#[macro_use]
extern crate arrayref;
#[macro_use]
extern crate log;
extern crate flexbuffers;
extern crate fnv;
extern crate serde;
extern crate thiserror;

mod bitwise;
mod dmac;
mod error;
mod state;

pub use dmac::channel::{Channel, Chcr, ReceiveHandler, TransferMode, SCCTRL_INITXFER};
pub use dmac::tag::{DmaTag, TagId};
pub use dmac::{
    Dmac, DmacOwner, DmacState, CHANNEL_COUNT, CHCR_STR, ENABLE_CPND, RAM_SIZE, SCRATCHPAD_SIZE,
};
pub use error::{DmacError, DmacResult};
pub use state::{RegisterStateFile, StateArchive};
