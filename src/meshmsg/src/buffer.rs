/// A send or receive in flight: the backing bytes plus a cursor recording
/// how much of them has already gone over (or come off) the wire.
#[derive(Debug, Default)]
pub struct Buffer {
    inner: Vec<u8>,
    pos: usize,
}

impl Buffer {
    pub fn from_vec(v: Vec<u8>) -> Self {
        Buffer { inner: v, pos: 0 }
    }

    pub fn zeroed(len: usize) -> Self {
        Buffer {
            inner: vec![0u8; len],
            pos: 0,
        }
    }

    /// The completed contents. Only valid once the transfer has finished.
    pub fn bytes(&self) -> &[u8] {
        assert!(self.is_done());
        &self.inner
    }

    pub fn advance(&mut self, nbytes: usize) {
        self.pos += nbytes;
        assert!(self.pos <= self.inner.len());
    }

    pub fn is_done(&self) -> bool {
        self.pos == self.inner.len()
    }

    pub fn remaining(&self) -> &[u8] {
        &self.inner[self.pos..]
    }

    pub fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.inner[self.pos..]
    }
}
