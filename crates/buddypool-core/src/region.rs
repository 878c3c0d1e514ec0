//! Backing region: one anonymous, zero-filled mapping owned by a pool.
//!
//! This is the only module that touches raw memory. Headers are read and
//! written by value at byte offsets from the mapping base; every access is
//! bounds- and alignment-checked before the pointer is formed.

use std::io;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use crate::block::BlockHeader;
use crate::config::HEADER_SIZE;

pub(crate) struct Region {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is exclusively owned by this value and is not tied to
// the thread that created it.
unsafe impl Send for Region {}

impl Region {
    /// Map `len` bytes of private, zero-filled, read-write memory.
    pub(crate) fn map(len: usize) -> io::Result<Self> {
        // SAFETY: anonymous mapping without an address hint; no existing
        // memory is affected.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(raw.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        Ok(Self { base, len })
    }

    /// Return the mapping to the OS.
    ///
    /// On failure the mapping is abandoned: its state can no longer be trusted.
    pub(crate) fn unmap(self) -> io::Result<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `base`/`len` describe exactly the mapping created in `map`,
        // and `this` is never used again.
        let rc = unsafe { libc::munmap(this.base.as_ptr().cast(), this.len) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    fn check_header(&self, offset: usize) {
        assert!(
            offset % align_of::<BlockHeader>() == 0
                && offset
                    .checked_add(HEADER_SIZE)
                    .is_some_and(|end| end <= self.len),
            "block header offset {offset:#x} outside {len:#x}-byte region",
            len = self.len
        );
    }

    pub(crate) fn read_header(&self, offset: usize) -> BlockHeader {
        self.check_header(offset);
        // SAFETY: checked above that the header lies inside the mapping and
        // is aligned; the mapping is readable and `BlockHeader` accepts any
        // bit pattern (the tag stays raw until decoded).
        unsafe { self.base.as_ptr().add(offset).cast::<BlockHeader>().read() }
    }

    pub(crate) fn write_header(&mut self, offset: usize, header: BlockHeader) {
        self.check_header(offset);
        // SAFETY: as in `read_header`; `&mut self` gives exclusive access to
        // pool metadata, and payload bytes handed to callers never overlap a
        // live header.
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<BlockHeader>()
                .write(header);
        }
    }

    /// Payload pointer of the block whose header sits at `offset`.
    pub(crate) fn payload_ptr(&self, offset: usize) -> NonNull<u8> {
        self.check_header(offset);
        // SAFETY: `offset + HEADER_SIZE <= len`, so the result is within (or
        // one past) the mapping and non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset + HEADER_SIZE)) }
    }

    /// Header offset of the block owning payload pointer `ptr`, if `ptr` can
    /// be one this region handed out.
    pub(crate) fn header_offset_of(&self, ptr: *const u8) -> Option<usize> {
        let offset = (ptr as usize)
            .checked_sub(self.base_addr())?
            .checked_sub(HEADER_SIZE)?;
        let in_bounds = offset.checked_add(HEADER_SIZE)? <= self.len;
        (in_bounds && offset % align_of::<BlockHeader>() == 0).then_some(offset)
    }

    /// Copy `len` payload bytes from the block at `src` to the block at `dst`.
    pub(crate) fn copy_payload(&mut self, src: usize, dst: usize, len: usize) {
        for offset in [src, dst] {
            assert!(
                offset
                    .checked_add(HEADER_SIZE)
                    .and_then(|start| start.checked_add(len))
                    .is_some_and(|end| end <= self.len),
                "payload copy of {len} bytes at {offset:#x} leaves the region"
            );
        }
        // SAFETY: both ranges were checked to lie inside the mapping;
        // `ptr::copy` tolerates overlap.
        unsafe {
            let base = self.base.as_ptr();
            ptr::copy(base.add(src + HEADER_SIZE), base.add(dst + HEADER_SIZE), len);
        }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` describe the mapping created in `map`; it is
        // not used after this point.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockHeader, BlockTag};

    #[test]
    fn map_is_zero_filled_and_page_aligned() {
        let region = Region::map(1 << 16).expect("map");
        assert_eq!(region.len(), 1 << 16);
        assert_eq!(region.base_addr() % 4096, 0);
        let header = region.read_header(0);
        assert_eq!(header.tag(), Some(BlockTag::Unused));
        assert_eq!(header.order(), 0);
        region.unmap().expect("unmap");
    }

    #[test]
    fn header_write_read() {
        let mut region = Region::map(1 << 16).expect("map");
        let header = BlockHeader::avail(12).with_links(64, 128);
        region.write_header(4096, header);
        assert_eq!(region.read_header(4096), header);
    }

    #[test]
    fn payload_offset_roundtrip() {
        let region = Region::map(1 << 16).expect("map");
        let ptr = region.payload_ptr(1024);
        assert_eq!(ptr.as_ptr() as usize, region.base_addr() + 1024 + HEADER_SIZE);
        assert_eq!(region.header_offset_of(ptr.as_ptr()), Some(1024));
    }

    #[test]
    fn foreign_pointers_have_no_offset() {
        let region = Region::map(1 << 16).expect("map");
        let local = 0u8;
        assert_eq!(region.header_offset_of(&local), None);
        assert_eq!(region.header_offset_of(ptr::null()), None);
        let inside_header = region.base_addr() as *const u8;
        assert_eq!(region.header_offset_of(inside_header), None);
        let misaligned = (region.base_addr() + HEADER_SIZE + 3) as *const u8;
        assert_eq!(region.header_offset_of(misaligned), None);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn out_of_bounds_header_panics() {
        let region = Region::map(1 << 16).expect("map");
        let _ = region.read_header(1 << 16);
    }

    #[test]
    fn copy_payload_moves_bytes() {
        let mut region = Region::map(1 << 16).expect("map");
        let src = region.payload_ptr(0);
        // SAFETY: test writes inside its own freshly mapped region.
        unsafe { ptr::write_bytes(src.as_ptr(), 0xAB, 16) };
        region.copy_payload(0, 4096, 16);
        let dst = region.payload_ptr(4096);
        // SAFETY: reads the 16 bytes just copied.
        let copied = unsafe { std::slice::from_raw_parts(dst.as_ptr(), 16) };
        assert!(copied.iter().all(|&b| b == 0xAB));
    }
}
