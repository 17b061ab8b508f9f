use bitfield::bitfield;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::tag::{DmaTag, TagId};
use super::DmacOwner;
use crate::bitwise::Bitwise;
use crate::error::{DmacError, DmacResult};
use crate::state::{RegisterStateFile, StateArchive};

/// SCCTRL bit set when a chain is (re)started and the first tag hasn't been fetched yet
pub const SCCTRL_INITXFER: u8 = 0;

const STATE_PREFIX: &str = "dmac/channel_";
const STATE_SUFFIX: &str = ".regs";

const STATE_REGS_CHCR: &str = "CHCR";
const STATE_REGS_MADR: &str = "MADR";
const STATE_REGS_QWC: &str = "QWC";
const STATE_REGS_TADR: &str = "TADR";
const STATE_REGS_SCCTRL: &str = "SCCTRL";
const STATE_REGS_ASR0: &str = "ASR0";
const STATE_REGS_ASR1: &str = "ASR1";

/// Depth of the hardware address stack used by CALL/RET tags
const ADDRESS_STACK_DEPTH: u8 = 2;

/// Size of a quadword, the unit of every DMAC transfer
const QW_SIZE: u32 = 0x10;

/// Device side of a channel: called with `(address, qwc, id, tag_included)`, returns the number
/// of quadwords the device actually accepted. Returning less than `qwc` (possibly 0) suspends the
/// transfer until the next `execute`.
pub type ReceiveHandler = Box<dyn FnMut(u32, u32, u8, bool) -> u32>;

/// CHCR.MOD
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
pub enum TransferMode {
    /// Single block of QWC quadwords at MADR
    Normal = 0,
    /// Walk the tag chain starting at TADR
    SourceChain = 1,
}

bitfield! {
    /// Dn_CHCR channel control register
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Chcr(u32);
    impl Debug;

    /// 0      Direction (0 = to memory, 1 = from memory)
    pub bool, dir, set_dir: 0;
    /// 2-3    Transfer mode (0 = normal, 1 = source chain, 2 = interleave)
    pub u8, mode, set_mode: 3, 2;
    /// 4-5    Address stack pointer
    pub u8, asp, set_asp: 5, 4;
    /// 6      Transfer the tag itself to the device before its data
    pub bool, tte, set_tte: 6;
    /// 7      Honor the IRQ bit of the tags
    pub bool, tie, set_tie: 7;
    /// 8      STR, set while the channel is running
    pub bool, running, set_running: 8;
    /// 16-31  Bits 16-31 of the last tag read
    pub u16, tag, set_tag: 31, 16;
}

impl Chcr {
    pub fn get(self) -> u32 {
        self.0
    }
}

/// One DMAC channel and its register file
pub struct Channel {
    /// Channel index in the controller, also the D_STAT bit it raises
    number: u32,
    chcr: Chcr,
    /// Memory address of the current data segment
    madr: u32,
    /// Quadwords left in the current data segment
    qwc: u32,
    /// Address of the next tag (source chain only)
    tadr: u32,
    /// Internal flags, see `SCCTRL_INITXFER`
    scctrl: u32,
    /// Return addresses pushed by CALL tags, indexed by CHCR.ASP
    asr: [u32; 2],
    receive: ReceiveHandler,
}

impl Channel {
    pub fn new(number: u32, receive: ReceiveHandler) -> Channel {
        Channel {
            number,
            chcr: Chcr(0),
            madr: 0,
            qwc: 0,
            tadr: 0,
            scctrl: 0,
            asr: [0; 2],
            receive,
        }
    }

    pub fn reset(&mut self) {
        self.chcr = Chcr(0);
        self.madr = 0;
        self.qwc = 0;
        self.tadr = 0;
        self.scctrl = 0;
        self.asr = [0; 2];
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Plug a different device on this channel
    pub fn set_receive_handler(&mut self, handler: ReceiveHandler) {
        self.receive = handler;
    }

    pub fn chcr(&self) -> Chcr {
        self.chcr
    }

    pub fn read_chcr(&self) -> u32 {
        self.chcr.get()
    }

    pub fn madr(&self) -> u32 {
        self.madr
    }

    pub fn set_madr(&mut self, v: u32) {
        self.madr = v;
    }

    pub fn qwc(&self) -> u32 {
        self.qwc
    }

    pub fn set_qwc(&mut self, v: u32) {
        self.qwc = v;
    }

    pub fn tadr(&self) -> u32 {
        self.tadr
    }

    pub fn set_tadr(&mut self, v: u32) {
        self.tadr = v;
    }

    pub fn scctrl(&self) -> u32 {
        self.scctrl
    }

    pub fn set_scctrl(&mut self, v: u32) {
        self.scctrl = v;
    }

    /// Saved return address `index`. Panics if `index` is not 0 or 1.
    pub fn asr(&self, index: usize) -> u32 {
        self.asr[index]
    }

    /// Panics if `index` is not 0 or 1
    pub fn set_asr(&mut self, index: usize, v: u32) {
        self.asr[index] = v;
    }

    /// Handle a write to CHCR. Starting the channel runs it right away, so this may perform a
    /// complete transfer before returning.
    pub fn write_chcr<O>(&mut self, owner: &mut O, value: u32) -> DmacResult<()>
    where
        O: DmacOwner + ?Sized,
    {
        let new = Chcr(value);

        // Clearing STR while CPND is set suspends the transfer instead of aborting it
        let suspend = owner.is_suspend_enable_set() && self.chcr.running() && !new.running();

        if self.chcr.running() {
            // Only STR can be modified while a transfer is in flight
            self.chcr.set_running(new.running());
        } else {
            self.chcr = new;
        }

        if suspend {
            debug!(
                "DMAC channel {} suspended at MADR 0x{:08x} QWC {} TADR 0x{:08x}",
                self.number, self.madr, self.qwc, self.tadr
            );
        }

        if self.chcr.running() {
            self.scctrl.set_bit(SCCTRL_INITXFER, true);
            self.execute(owner)?;
        }

        Ok(())
    }

    /// Move as much data as the device accepts. Does nothing if the channel isn't running.
    pub fn execute<O>(&mut self, owner: &mut O) -> DmacResult<()>
    where
        O: DmacOwner + ?Sized,
    {
        if !self.chcr.running() {
            return Ok(());
        }

        if owner.is_any_global_enable_set() {
            // XXX Channel 4 (IPU_TO) is known to be started while the controller is held and
            // simply waits. The real behavior still needs to be checked against hardware.
            if self.number == 4 {
                return Ok(());
            }

            error!(
                "DMAC channel {} running with D_ENABLE set, not implemented",
                self.number
            );
            return Err(DmacError::UnhandledGlobalEnable(self.number));
        }

        match TransferMode::from_u8(self.chcr.mode()) {
            Some(TransferMode::Normal) => {
                self.execute_normal(owner);
                Ok(())
            }
            Some(TransferMode::SourceChain) => self.execute_source_chain(owner),
            None => {
                error!(
                    "DMAC channel {} started with undefined mode {}",
                    self.number,
                    self.chcr.mode()
                );
                Err(DmacError::UndefinedMode {
                    channel: self.number,
                    mode: self.chcr.mode(),
                })
            }
        }
    }

    fn execute_normal<O>(&mut self, owner: &mut O)
    where
        O: DmacOwner + ?Sized,
    {
        self.transfer_segment();

        if self.qwc == 0 {
            self.clear_running(owner);
        }
    }

    fn execute_source_chain<O>(&mut self, owner: &mut O) -> DmacResult<()>
    where
        O: DmacOwner + ?Sized,
    {
        // Finish the segment we were in the middle of
        if self.qwc != 0 {
            self.transfer_segment();

            if self.qwc != 0 {
                return Ok(());
            }
        }

        while self.chcr.running() {
            if self.qwc != 0 {
                // The device is busy, resume on the next run
                break;
            }

            if self.scctrl.bit(SCCTRL_INITXFER) {
                self.scctrl.set_bit(SCCTRL_INITXFER, false);
            } else if owner.is_end_tag(u32::from(self.chcr.tag()) << 16) {
                self.clear_running(owner);
                continue;
            }

            if self.chcr.tte() && (self.receive)(self.tadr, 1, 0, true) != 1 {
                // The device didn't take the tag, it'll be sent again next time
                break;
            }

            // Some games (Half-Life) end their chains by pointing TADR at 0
            if self.tadr == 0 {
                debug!("DMAC channel {} chain ended on null TADR", self.number);
                self.clear_running(owner);
                continue;
            }

            let tag = DmaTag::from(owner.fetch_tag(self.tadr));

            self.chcr.set_tag(tag.upper_half());

            #[cfg(feature = "chain_verbose")]
            debug!(
                "DMAC channel {} tag {:?} at 0x{:08x}: QWC {} ADDR 0x{:08x}",
                self.number,
                tag.id(),
                self.tadr,
                tag.qwc(),
                tag.addr()
            );

            self.follow_tag(tag)?;

            if self.qwc != 0 {
                self.transfer_segment();
            }
        }

        Ok(())
    }

    /// Load MADR, QWC and TADR from `tag`, pushing or popping the address stack as needed
    fn follow_tag(&mut self, tag: DmaTag) -> DmacResult<()> {
        let id = match tag.id() {
            Some(id) => id,
            None => {
                self.qwc = 0;
                error!(
                    "DMAC channel {} fetched reserved tag ID {} at 0x{:08x}",
                    self.number,
                    tag.raw_id(),
                    self.tadr
                );
                return Err(DmacError::ReservedTagId {
                    channel: self.number,
                    id: tag.raw_id(),
                    tadr: self.tadr,
                });
            }
        };

        let after_tag = self.tadr.wrapping_add(QW_SIZE);

        match id {
            TagId::Refe | TagId::Ref => {
                self.madr = tag.addr();
                self.qwc = tag.qwc();
                self.tadr = after_tag;
            }
            TagId::Cnt => {
                self.madr = after_tag;
                self.qwc = tag.qwc();
                self.tadr = self.segment_end();
            }
            TagId::Next => {
                self.madr = after_tag;
                self.qwc = tag.qwc();
                self.tadr = tag.addr();
            }
            TagId::Call => {
                let asp = self.chcr.asp();

                if asp >= ADDRESS_STACK_DEPTH {
                    error!(
                        "DMAC channel {} CALL at 0x{:08x} overflows the address stack",
                        self.number, self.tadr
                    );
                    return Err(DmacError::AddressStackOverflow {
                        channel: self.number,
                        tadr: self.tadr,
                    });
                }

                self.madr = after_tag;
                self.qwc = tag.qwc();
                self.asr[asp as usize] = self.segment_end();
                self.tadr = tag.addr();
                self.chcr.set_asp(asp + 1);
            }
            TagId::Ret => {
                let asp = self.chcr.asp();

                // ASP is a 2-bit field, 3 can be written while the channel is idle
                if asp > ADDRESS_STACK_DEPTH {
                    error!(
                        "DMAC channel {} RET at 0x{:08x} with a bad address stack pointer {}",
                        self.number, self.tadr, asp
                    );
                    return Err(DmacError::AddressStackOverflow {
                        channel: self.number,
                        tadr: self.tadr,
                    });
                }

                if asp == 0 {
                    error!(
                        "DMAC channel {} RET at 0x{:08x} with an empty address stack",
                        self.number, self.tadr
                    );
                    return Err(DmacError::AddressStackUnderflow {
                        channel: self.number,
                        tadr: self.tadr,
                    });
                }

                let asp = asp - 1;
                self.chcr.set_asp(asp);

                self.madr = after_tag;
                self.qwc = tag.qwc();
                self.tadr = self.asr[asp as usize];
            }
            TagId::End => {
                self.madr = after_tag;
                self.qwc = tag.qwc();
            }
        }

        Ok(())
    }

    /// Address right after the current data segment
    fn segment_end(&self) -> u32 {
        self.madr.wrapping_add(self.qwc.wrapping_mul(QW_SIZE))
    }

    /// Offer the current data segment to the device and advance by what it accepted
    fn transfer_segment(&mut self) {
        let received = (self.receive)(self.madr, self.qwc, 0, false);

        debug_assert!(
            received <= self.qwc,
            "DMAC device accepted {} quadwords out of {}",
            received,
            self.qwc
        );

        self.madr = self.madr.wrapping_add(received.wrapping_mul(QW_SIZE));
        self.qwc -= received;
    }

    /// End of transfer: stop the channel and flag it in D_STAT
    fn clear_running<O>(&mut self, owner: &mut O)
    where
        O: DmacOwner + ?Sized,
    {
        self.chcr.set_running(false);

        owner.set_status_bit(self.number);
        owner.recompute_interrupt_condition();
    }

    fn state_path(&self) -> String {
        format!("{}{}{}", STATE_PREFIX, self.number, STATE_SUFFIX)
    }

    pub fn save_state(&self, archive: &mut StateArchive) {
        let mut file = RegisterStateFile::new(&self.state_path());

        file.set_register32(STATE_REGS_CHCR, self.chcr.get());
        file.set_register32(STATE_REGS_MADR, self.madr);
        file.set_register32(STATE_REGS_QWC, self.qwc);
        file.set_register32(STATE_REGS_TADR, self.tadr);
        file.set_register32(STATE_REGS_SCCTRL, self.scctrl);
        file.set_register32(STATE_REGS_ASR0, self.asr[0]);
        file.set_register32(STATE_REGS_ASR1, self.asr[1]);

        archive.insert_file(file);
    }

    /// Restore the registers saved by `save_state`. On error the channel is left untouched.
    pub fn load_state(&mut self, archive: &StateArchive) -> DmacResult<()> {
        let saved = self.read_state(archive)?;

        self.restore(saved);

        Ok(())
    }

    /// Fetch this channel's registers from `archive` without applying them
    pub(super) fn read_state(&self, archive: &StateArchive) -> DmacResult<SavedRegisters> {
        let file = archive.file(&self.state_path())?;

        Ok(SavedRegisters {
            chcr: file.register32(STATE_REGS_CHCR)?,
            madr: file.register32(STATE_REGS_MADR)?,
            qwc: file.register32(STATE_REGS_QWC)?,
            tadr: file.register32(STATE_REGS_TADR)?,
            scctrl: file.register32(STATE_REGS_SCCTRL)?,
            asr: [
                file.register32(STATE_REGS_ASR0)?,
                file.register32(STATE_REGS_ASR1)?,
            ],
        })
    }

    pub(super) fn restore(&mut self, saved: SavedRegisters) {
        self.chcr = Chcr(saved.chcr);
        self.madr = saved.madr;
        self.qwc = saved.qwc;
        self.tadr = saved.tadr;
        self.scctrl = saved.scctrl;
        self.asr = saved.asr;
    }
}

/// Channel registers read back from a savestate
pub(super) struct SavedRegisters {
    chcr: u32,
    madr: u32,
    qwc: u32,
    tadr: u32,
    scctrl: u32,
    asr: [u32; 2],
}
