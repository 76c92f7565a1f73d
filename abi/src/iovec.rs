//! Scatter/gather I/O vector types used by `read`/`write`/`pread`/`pwrite`.

/// A read-only buffer handed to `write`/`send`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IoVec<'a> {
    pub buf: &'a [u8],
}

impl<'a> IoVec<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// A writable buffer handed to `read`/`recv`.
#[repr(C)]
pub struct IoVecMut<'a> {
    pub buf: &'a mut [u8],
}

impl<'a> IoVecMut<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Copy `data` across an iovec array, returning the number of bytes copied
/// and whether bytes remained that didn't fit (`data-truncated`, design §4.9).
pub fn copy_into_iovecs(iovecs: &mut [IoVecMut<'_>], data: &[u8]) -> (usize, bool) {
    let mut copied = 0usize;
    let mut remaining = data;
    for iov in iovecs.iter_mut() {
        if remaining.is_empty() {
            break;
        }
        let n = remaining.len().min(iov.buf.len());
        iov.buf[..n].copy_from_slice(&remaining[..n]);
        copied += n;
        remaining = &remaining[n..];
    }
    (copied, !remaining.is_empty())
}

/// Total writable capacity across an iovec array.
pub fn iovecs_capacity(iovecs: &[IoVecMut<'_>]) -> usize {
    iovecs.iter().map(|v| v.len()).sum()
}
