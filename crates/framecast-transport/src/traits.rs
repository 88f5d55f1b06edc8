/// The outbound half the uploader drives.
///
/// Implemented by [`Connection`](crate::Connection); tests substitute
/// scripted fakes.
pub trait ChunkWriter: Send + Sync + 'static {
    /// True while the transport accepts writes.
    fn is_ready(&self) -> bool;

    /// Attempt one non-blocking write of `chunk`.
    ///
    /// Returns the number of bytes accepted, possibly 0 when the transport has
    /// no room right now. Never blocks and never reports errors here; a broken
    /// transport surfaces through its own close notification.
    fn write_chunk(&self, chunk: &[u8]) -> usize;
}
