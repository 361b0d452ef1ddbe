use bytes::Bytes;
use std::mem::size_of;
use std::sync::Arc;

/// Memory a datum keeps alive while it waits in a [`BoundedChannel`].
///
/// Adapters implement this for their block type so bulk catch-up stays under
/// `channel_max_size_mb`. Only heap payloads and fixed fields need to be counted; allocator
/// overhead can be ignored.
///
/// [`BoundedChannel`]: super::BoundedChannel
pub trait ByteSize {
    fn byte_size(&self) -> usize;
}

macro_rules! fixed_width {
    ($($ty:ty)*) => {
        $(
            impl ByteSize for $ty {
                fn byte_size(&self) -> usize {
                    size_of::<$ty>()
                }
            }
        )*
    };
}

// Block numbers, indexes and small test datums.
fixed_width!(u8 u16 u32 u64 usize);

impl ByteSize for str {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for String {
    fn byte_size(&self) -> usize {
        self.as_str().byte_size()
    }
}

impl ByteSize for Bytes {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl<T: ByteSize> ByteSize for Vec<T> {
    fn byte_size(&self) -> usize {
        self.iter().map(ByteSize::byte_size).sum()
    }
}

impl<T: ByteSize> ByteSize for Option<T> {
    fn byte_size(&self) -> usize {
        self.as_ref().map_or(0, ByteSize::byte_size)
    }
}

impl<T: ByteSize + ?Sized> ByteSize for Box<T> {
    fn byte_size(&self) -> usize {
        T::byte_size(self)
    }
}

impl<T: ByteSize + ?Sized> ByteSize for Arc<T> {
    fn byte_size(&self) -> usize {
        T::byte_size(self)
    }
}
