/// Widening casts that are lossless on every supported target.
pub trait SafeCast<T> {
    fn safe_cast(self) -> T;
}

impl SafeCast<usize> for u16 {
    fn safe_cast(self) -> usize {
        self as usize
    }
}


/// For narrowing casts where the wire layout or a preceding length check guarantees that the
///  value fits into the narrower type.
/// NB: The implementations panic otherwise, which means there is a bug in the caller
pub trait PrecheckedCast<T> {
    fn prechecked_cast(self) -> T;
}

impl PrecheckedCast<u16> for usize {
    fn prechecked_cast(self) -> u16 {
        self.try_into().expect("this is a bug: length should have been checked against the wire format's u16 range")
    }
}

impl PrecheckedCast<u32> for usize {
    fn prechecked_cast(self) -> u32 {
        self.try_into().expect("this is a bug: length should have been checked against the wire format's u32 range")
    }
}
