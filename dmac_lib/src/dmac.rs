//! The Emotion Engine DMA controller: ten channels moving quadwords between RAM/scratchpad and
//! the EE devices (VIF, GIF, IPU, SIF, SPR).

use std::array;

use num_traits::FromPrimitive;

use crate::bitwise::Bitwise;
use crate::error::DmacResult;
use crate::state::{RegisterStateFile, StateArchive};
use channel::Channel;
use tag::TagId;

pub mod channel;
pub mod tag;


/// VIF0, VIF1, GIF, IPU_FROM, IPU_TO, SIF0, SIF1, SIF2, SPR_FROM, SPR_TO
pub const CHANNEL_COUNT: usize = 10;

/// STR bit of CHCR
pub const CHCR_STR: u32 = 1 << 8;

/// D_ENABLE bit that holds every channel ("CPND")
pub const ENABLE_CPND: u32 = 1 << 16;

/// Default EE RAM size
pub const RAM_SIZE: usize = 32 * 1024 * 1024;

/// Scratchpad RAM size
pub const SCRATCHPAD_SIZE: usize = 16 * 1024;

/// Tag addresses with this bit set are in the scratchpad
const TADR_SPR: u32 = 1 << 31;

/// Mask of the per-channel bits in D_STAT and D_PCR
const CHANNEL_MASK: u32 = (1 << CHANNEL_COUNT) - 1;

/// D_STAT bits cleared by writing 1: channel status, stall, MFIFO empty and bus error
const STAT_CLEAR_MASK: u32 = 0x0000_e3ff;

/// D_STAT bits flipped by writing 1: channel, stall and MFIFO interrupt masks
const STAT_TOGGLE_MASK: u32 = 0x6000_0000 | (CHANNEL_MASK << 16);

const STATE_CONTROLLER: &str = "dmac/controller.regs";
const STATE_REGS_CTRL: &str = "D_CTRL";
const STATE_REGS_STAT: &str = "D_STAT";
const STATE_REGS_PCR: &str = "D_PCR";
const STATE_REGS_SQWC: &str = "D_SQWC";
const STATE_REGS_RBSR: &str = "D_RBSR";
const STATE_REGS_RBOR: &str = "D_RBOR";
const STATE_REGS_STADR: &str = "D_STADR";
const STATE_REGS_ENABLE: &str = "D_ENABLE";

/// What a channel needs from the controller that owns it
pub trait DmacOwner {
    /// True if D_ENABLE.CPND is set, i.e. clearing STR suspends a transfer
    fn is_suspend_enable_set(&self) -> bool;

    /// True if any D_ENABLE bit holds the controller
    fn is_any_global_enable_set(&self) -> bool;

    /// Flag the end of transfer of `channel` in D_STAT
    fn set_status_bit(&mut self, channel: u32);

    /// Re-evaluate the interrupt and CPCOND0 outputs after D_STAT or D_PCR changed
    fn recompute_interrupt_condition(&mut self);

    /// Read the 64-bit tag at `address`
    fn fetch_tag(&self, address: u32) -> u64;

    /// True if the ID in `tag_word` (the low word of a tag) terminates a chain
    fn is_end_tag(&self, tag_word: u32) -> bool;
}

/// Controller-wide registers and the memory tags are fetched from
pub struct DmacState {
    d_ctrl: u32,
    d_stat: u32,
    d_pcr: u32,
    d_sqwc: u32,
    d_rbsr: u32,
    d_rbor: u32,
    d_stadr: u32,
    d_enable: u32,
    /// Main RAM, size is a power of two
    ram: Vec<u8>,
    scratchpad: Vec<u8>,
    /// COP0 condition line, true when every channel enabled in D_PCR has completed
    cpcond0: bool,
    /// DMAC interrupt line
    irq: bool,
}

impl DmacState {
    fn new(ram_size: usize) -> DmacState {
        assert!(
            ram_size.is_power_of_two() && ram_size >= 16,
            "DMAC RAM size must be a power of two, got {}",
            ram_size
        );

        let mut state = DmacState {
            d_ctrl: 0,
            d_stat: 0,
            d_pcr: 0,
            d_sqwc: 0,
            d_rbsr: 0,
            d_rbor: 0,
            d_stadr: 0,
            d_enable: 0,
            ram: vec![0; ram_size],
            scratchpad: vec![0; SCRATCHPAD_SIZE],
            cpcond0: false,
            irq: false,
        };

        state.recompute_interrupt_condition();

        state
    }

    fn reset(&mut self) {
        self.d_ctrl = 0;
        self.d_stat = 0;
        self.d_pcr = 0;
        self.d_sqwc = 0;
        self.d_rbsr = 0;
        self.d_rbor = 0;
        self.d_stadr = 0;
        self.d_enable = 0;

        self.recompute_interrupt_condition();
    }

    fn write_stat(&mut self, v: u32) {
        self.d_stat &= !(v & STAT_CLEAR_MASK);
        self.d_stat ^= v & STAT_TOGGLE_MASK;

        self.recompute_interrupt_condition();
    }
}

impl DmacOwner for DmacState {
    fn is_suspend_enable_set(&self) -> bool {
        self.d_enable & ENABLE_CPND != 0
    }

    fn is_any_global_enable_set(&self) -> bool {
        self.d_enable != 0
    }

    fn set_status_bit(&mut self, channel: u32) {
        self.d_stat.set_bit(channel as u8, true);
    }

    fn recompute_interrupt_condition(&mut self) {
        let done = !self.d_pcr | self.d_stat;

        self.cpcond0 = done & CHANNEL_MASK == CHANNEL_MASK;

        let status = self.d_stat & CHANNEL_MASK;
        let mask = (self.d_stat >> 16) & CHANNEL_MASK;

        self.irq = status & mask != 0;
    }

    fn fetch_tag(&self, address: u32) -> u64 {
        let (mem, offset) = if address & TADR_SPR != 0 {
            (&self.scratchpad, (address as usize) & (SCRATCHPAD_SIZE - 1))
        } else {
            (&self.ram, (address as usize) & (self.ram.len() - 1))
        };

        // Tags are quadword aligned, the low bits are ignored
        let offset = offset & !0xf;

        u64::from_le_bytes(*array_ref![mem, offset, 8])
    }

    fn is_end_tag(&self, tag_word: u32) -> bool {
        TagId::from_u8(((tag_word >> 28) & 7) as u8).is_some_and(TagId::ends_chain)
    }
}

/// The controller and its channels
pub struct Dmac {
    state: DmacState,
    channels: [Channel; CHANNEL_COUNT],
}

impl Dmac {
    /// New controller with `ram_size` bytes of main RAM. Channels start with a device that never
    /// accepts any data, see `Channel::set_receive_handler`.
    pub fn new(ram_size: usize) -> Dmac {
        Dmac {
            state: DmacState::new(ram_size),
            channels: array::from_fn(|n| Channel::new(n as u32, Box::new(|_, _, _, _| 0))),
        }
    }

    pub fn reset(&mut self) {
        self.state.reset();

        for channel in self.channels.iter_mut() {
            channel.reset();
        }
    }

    pub fn channel(&self, n: usize) -> &Channel {
        &self.channels[n]
    }

    pub fn channel_mut(&mut self, n: usize) -> &mut Channel {
        &mut self.channels[n]
    }

    pub fn ram(&self) -> &[u8] {
        &self.state.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.state.ram
    }

    pub fn scratchpad_mut(&mut self) -> &mut [u8] {
        &mut self.state.scratchpad
    }

    pub fn write_chcr(&mut self, n: usize, v: u32) -> DmacResult<()> {
        self.channels[n].write_chcr(&mut self.state, v)
    }

    pub fn d_stat(&self) -> u32 {
        self.state.d_stat
    }

    pub fn write_d_stat(&mut self, v: u32) {
        self.state.write_stat(v);
    }

    pub fn d_pcr(&self) -> u32 {
        self.state.d_pcr
    }

    pub fn set_d_pcr(&mut self, v: u32) {
        self.state.d_pcr = v;
        self.state.recompute_interrupt_condition();
    }

    pub fn d_ctrl(&self) -> u32 {
        self.state.d_ctrl
    }

    pub fn set_d_ctrl(&mut self, v: u32) {
        self.state.d_ctrl = v;
    }

    pub fn d_enable(&self) -> u32 {
        self.state.d_enable
    }

    /// D_ENABLEW. Releasing the controller doesn't restart the channels, that's up to the next
    /// `tick`.
    pub fn set_d_enable(&mut self, v: u32) {
        self.state.d_enable = v;
    }

    pub fn cpcond0(&self) -> bool {
        self.state.cpcond0
    }

    pub fn irq_pending(&self) -> bool {
        self.state.irq
    }

    /// Run every started channel once. Stops at the first channel that hits an invalid state.
    pub fn tick(&mut self) -> DmacResult<()> {
        for channel in self.channels.iter_mut() {
            channel.execute(&mut self.state)?;
        }

        Ok(())
    }

    /// True if any channel still has STR set
    pub fn is_busy(&self) -> bool {
        self.channels.iter().any(|c| c.chcr().running())
    }

    /// Register read at `addr` in the EE physical address space
    pub fn load(&self, addr: u32) -> u32 {
        if let Some((n, reg)) = channel_register(addr) {
            let channel = &self.channels[n];

            return match reg {
                0x00 => channel.read_chcr(),
                0x10 => channel.madr(),
                0x20 => channel.qwc(),
                0x30 => channel.tadr(),
                0x40 => channel.asr(0),
                0x50 => channel.asr(1),
                _ => {
                    warn!("DMAC channel {} read from register 0x{:x}", n, reg);
                    0
                }
            };
        }

        match addr {
            0x1000_e000 => self.state.d_ctrl,
            0x1000_e010 => self.state.d_stat,
            0x1000_e020 => self.state.d_pcr,
            0x1000_e030 => self.state.d_sqwc,
            0x1000_e040 => self.state.d_rbsr,
            0x1000_e050 => self.state.d_rbor,
            0x1000_e060 => self.state.d_stadr,
            0x1000_f520 => self.state.d_enable,
            _ => {
                warn!("DMAC read from unknown register 0x{:08x}", addr);
                0
            }
        }
    }

    /// Register write at `addr`. Writing CHCR may run a transfer.
    pub fn store(&mut self, addr: u32, v: u32) -> DmacResult<()> {
        if let Some((n, reg)) = channel_register(addr) {
            let channel = &mut self.channels[n];

            match reg {
                0x00 => return channel.write_chcr(&mut self.state, v),
                // Quadword aligned
                0x10 => channel.set_madr(v & !0xf),
                0x20 => channel.set_qwc(v & 0xffff),
                0x30 => channel.set_tadr(v & !0xf),
                0x40 => channel.set_asr(0, v & !0xf),
                0x50 => channel.set_asr(1, v & !0xf),
                _ => warn!("DMAC channel {} write to register 0x{:x}: {:x}", n, reg, v),
            }

            return Ok(());
        }

        match addr {
            0x1000_e000 => self.state.d_ctrl = v,
            0x1000_e010 => self.state.write_stat(v),
            0x1000_e020 => self.set_d_pcr(v),
            0x1000_e030 => self.state.d_sqwc = v,
            0x1000_e040 => self.state.d_rbsr = v,
            0x1000_e050 => self.state.d_rbor = v,
            0x1000_e060 => self.state.d_stadr = v,
            0x1000_f590 => self.state.d_enable = v,
            _ => warn!("DMAC write to unknown register 0x{:08x}: {:x}", addr, v),
        }

        Ok(())
    }

    pub fn save_state(&self, archive: &mut StateArchive) {
        let mut file = RegisterStateFile::new(STATE_CONTROLLER);

        file.set_register32(STATE_REGS_CTRL, self.state.d_ctrl);
        file.set_register32(STATE_REGS_STAT, self.state.d_stat);
        file.set_register32(STATE_REGS_PCR, self.state.d_pcr);
        file.set_register32(STATE_REGS_SQWC, self.state.d_sqwc);
        file.set_register32(STATE_REGS_RBSR, self.state.d_rbsr);
        file.set_register32(STATE_REGS_RBOR, self.state.d_rbor);
        file.set_register32(STATE_REGS_STADR, self.state.d_stadr);
        file.set_register32(STATE_REGS_ENABLE, self.state.d_enable);

        archive.insert_file(file);

        for channel in self.channels.iter() {
            channel.save_state(archive);
        }
    }

    /// Restore the state saved by `save_state`. Every entry is read before anything is
    /// applied, so on error the controller and its channels are left untouched.
    pub fn load_state(&mut self, archive: &StateArchive) -> DmacResult<()> {
        let file = archive.file(STATE_CONTROLLER)?;

        let d_ctrl = file.register32(STATE_REGS_CTRL)?;
        let d_stat = file.register32(STATE_REGS_STAT)?;
        let d_pcr = file.register32(STATE_REGS_PCR)?;
        let d_sqwc = file.register32(STATE_REGS_SQWC)?;
        let d_rbsr = file.register32(STATE_REGS_RBSR)?;
        let d_rbor = file.register32(STATE_REGS_RBOR)?;
        let d_stadr = file.register32(STATE_REGS_STADR)?;
        let d_enable = file.register32(STATE_REGS_ENABLE)?;

        let saved = self
            .channels
            .iter()
            .map(|c| c.read_state(archive))
            .collect::<DmacResult<Vec<_>>>()?;

        self.state.d_ctrl = d_ctrl;
        self.state.d_stat = d_stat;
        self.state.d_pcr = d_pcr;
        self.state.d_sqwc = d_sqwc;
        self.state.d_rbsr = d_rbsr;
        self.state.d_rbor = d_rbor;
        self.state.d_stadr = d_stadr;
        self.state.d_enable = d_enable;

        self.state.recompute_interrupt_condition();

        for (channel, regs) in self.channels.iter_mut().zip(saved) {
            channel.restore(regs);
        }

        Ok(())
    }
}

/// Decode a channel register address into the channel index and register offset
fn channel_register(addr: u32) -> Option<(usize, u32)> {
    let base = match addr & !0xff {
        0x1000_8000 => 0,
        0x1000_9000 => 1,
        0x1000_a000 => 2,
        0x1000_b000 => 3,
        0x1000_b400 => 4,
        0x1000_c000 => 5,
        0x1000_c400 => 6,
        0x1000_c800 => 7,
        0x1000_d000 => 8,
        0x1000_d400 => 9,
        _ => return None,
    };

    Some((base, addr & 0xff))
}
