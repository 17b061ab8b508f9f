use bitfield::bitfield;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Source chain tag ID, bits 28-30 of a DMA tag. ID 4 is reserved.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
pub enum TagId {
    /// Data at ADDR, the chain ends once it has been transferred
    Refe = 0,
    /// Data follows the tag, the next tag follows the data
    Cnt = 1,
    /// Data follows the tag, the next tag is at ADDR
    Next = 2,
    /// Data at ADDR, the next tag follows this one
    Ref = 3,
    /// Data follows the tag, push the address after the data and jump to ADDR
    Call = 5,
    /// Data follows the tag, pop the next tag address from the address stack
    Ret = 6,
    /// Data follows the tag, the chain ends once it has been transferred
    End = 7,
}

impl TagId {
    /// Returns true for the IDs that terminate a chain (REFE and END)
    pub fn ends_chain(self) -> bool {
        matches!(self, TagId::Refe | TagId::End)
    }
}

bitfield! {
    /// 64-bit source chain tag as fetched from memory
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct DmaTag(u64);
    impl Debug;

    /// 0-15   Quadwords to transfer
    pub u32, qwc, set_qwc: 15, 0;
    /// 26-27  Priority control
    pub u8, pce, set_pce: 27, 26;
    /// 28-30  Tag ID
    pub u8, raw_id, set_raw_id: 30, 28;
    /// 31     Interrupt request
    pub bool, irq, set_irq: 31;
    /// 32-63  Data or next tag address, depending on the ID
    pub u32, addr, set_addr: 63, 32;
    /// 16-31  Upper half-word of the low word, mirrored into CHCR.TAG
    pub u16, upper_half, _: 31, 16;
}

impl DmaTag {
    /// Build a tag from its fields, mostly useful to lay out chains in memory
    pub fn new(id: TagId, qwc: u16, addr: u32) -> DmaTag {
        let mut tag = DmaTag(0);

        tag.set_raw_id(id as u8);
        tag.set_qwc(u32::from(qwc));
        tag.set_addr(addr);

        tag
    }

    pub fn id(self) -> Option<TagId> {
        TagId::from_u8(self.raw_id())
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl From<u64> for DmaTag {
    fn from(raw: u64) -> Self {
        DmaTag(raw)
    }
}

#[test]
fn tag_fields() {
    let tag = DmaTag(0x0001_2340_8000_1fffu64 | (1 << 31) | (2 << 26));

    assert_eq!(tag.qwc(), 0x1fff);
    assert_eq!(tag.raw_id(), 0);
    assert_eq!(tag.id(), Some(TagId::Refe));
    assert!(tag.irq());
    assert_eq!(tag.pce(), 2);
    assert_eq!(tag.addr(), 0x0001_2340);
    assert_eq!(tag.upper_half(), 0x8800);
}

#[test]
fn tag_builder() {
    let tag = DmaTag::new(TagId::Call, 4, 0x3000);

    assert_eq!(tag.get(), 0x0000_3000_5000_0004);
    assert_eq!(tag.id(), Some(TagId::Call));
    assert_eq!(tag.upper_half(), 0x5000);
    assert!(!tag.id().unwrap().ends_chain());
}

#[test]
fn reserved_tag_id() {
    let tag = DmaTag(4 << 28);

    assert_eq!(tag.raw_id(), 4);
    assert_eq!(tag.id(), None);
}
