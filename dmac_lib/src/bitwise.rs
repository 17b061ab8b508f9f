/// Single bit access on the raw register words (SCCTRL, D_STAT...)
pub trait Bitwise {
    /// Returns true if the given bit is set in `self`
    fn bit(self, bitpos: u8) -> bool;

    /// Sets the given bit in self to 1 if `v` is true, 0 if `v` is false
    fn set_bit(&mut self, bitpos: u8, v: bool);
}

macro_rules! impl_bitwise {
    ($($t:ty),*) => {
        $(
            impl Bitwise for $t {
                fn bit(self, bitpos: u8) -> bool {
                    (self >> bitpos) & 1 != 0
                }

                fn set_bit(&mut self, bitpos: u8, v: bool) {
                    let mask: $t = 1 << bitpos;

                    if v {
                        *self |= mask;
                    } else {
                        *self &= !mask;
                    }
                }
            }
        )*
    };
}

impl_bitwise!(u32, u64);

#[test]
fn bitwise() {
    let mut stat = 0x0000_0200u32;

    assert!(stat.bit(9));
    assert!(!stat.bit(0));

    stat.set_bit(4, true);
    assert_eq!(stat, 0x210);

    stat.set_bit(9, false);
    assert_eq!(stat, 0x10);

    stat.set_bit(4, false);
    stat.set_bit(16, true);
    assert_eq!(stat, 0x1_0000);

    let mut tag = 0u64;
    tag.set_bit(63, true);
    assert!(tag.bit(63));
    assert_eq!(tag, 0x8000_0000_0000_0000);
}
