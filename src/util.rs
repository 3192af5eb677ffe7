pub(crate) trait FromRng {
    fn from_rng() -> Self;
}

impl FromRng for u8 {
    fn from_rng() -> Self {
        fastrand::u8(..)
    }
}

impl FromRng for u16 {
    fn from_rng() -> Self {
        fastrand::u16(..)
    }
}

impl FromRng for u32 {
    fn from_rng() -> Self {
        fastrand::u32(..)
    }
}

impl FromRng for u64 {
    fn from_rng() -> Self {
        fastrand::u64(..)
    }
}

/// Randomness for ids and port picks. None of it is security sensitive.
pub(crate) struct NonCryptographicRng;

impl NonCryptographicRng {
    #[inline(always)]
    pub fn random<T: FromRng>() -> T {
        T::from_rng()
    }

    #[inline(always)]
    pub fn u16() -> u16 {
        fastrand::u16(..)
    }

    #[inline(always)]
    pub fn u32() -> u32 {
        fastrand::u32(..)
    }
}
