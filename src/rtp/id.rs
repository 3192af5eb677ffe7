#![allow(missing_docs)]

use std::fmt;
use std::ops::Deref;

use crate::util::NonCryptographicRng;

macro_rules! num_id {
    ($id:ident, $t:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $id($t);

        impl $id {
            pub fn new() -> Self {
                $id(NonCryptographicRng::random())
            }
        }

        impl Deref for $id {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$t> for $id {
            fn from(v: $t) -> Self {
                $id(v)
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

num_id!(Ssrc, u32);
num_id!(Pt, u8);
num_id!(SeqNo, u64);

impl Pt {
    /// Payload types live in [0,128). Anything else never indexes a table.
    pub fn is_valid(&self) -> bool {
        self.0 < 128
    }
}

impl SeqNo {
    pub fn is_next(&self, other: SeqNo) -> bool {
        if **self >= *other {
            return false;
        }
        *other - **self == 1
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The 16 bits that go on the wire.
    pub fn as_u16(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

/// "extend" a 16 bit wrapping sequence number into a 64 bit by using the
/// knowledge of the previous such sequence number.
///
/// A receiver that has seen 65535 treats an incoming 0 as the immediate
/// successor (65536), not a 65536-packet gap.
pub fn extend_u16(prev_ext_seq: Option<u64>, seq: u16) -> u64 {
    const MAX: u64 = u16::MAX as u64 + 1; // 65_536
    const HALF: u64 = MAX / 2; // 32_768
    const ROC_MASK: i64 = (u64::MAX >> 16) as i64;

    let seq = seq as u64;

    let Some(prev_index) = prev_ext_seq else {
        // No wrap-around so far.
        return seq;
    };

    let roc = (prev_index >> 16) as i64; // how many wrap-arounds.
    let prev_seq = prev_index & (MAX - 1);

    let v = if prev_seq < HALF {
        if seq > HALF + prev_seq {
            (roc - 1) & ROC_MASK
        } else {
            roc
        }
    } else if prev_seq > seq + HALF {
        (roc + 1) & ROC_MASK
    } else {
        roc
    };

    if v < 0 {
        return 0;
    }

    (v as u64) * MAX + seq
}
