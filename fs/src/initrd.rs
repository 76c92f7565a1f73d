//! Read-only `ustar` filesystem served straight out of the boot module
//! (design §4.11). Grounded in `original_source/fd/initrdfs.cpp`: a single
//! linear scan over 512-byte header blocks at construction time, inode
//! numbers assigned by header order, no on-disk writes of any kind.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use cosix_abi::{FdFlags, FdStat, FileStat, FileType, IoVecMut, OFlags, Whence};

use crate::config::USTAR_BLOCK_LEN;
use crate::error::{FsResult, KernelError};
use crate::fd::FileDescriptor;

const NAME_OFFSET: usize = 0;
const NAME_LEN: usize = 100;
const SIZE_OFFSET: usize = 124;
const SIZE_LEN: usize = 12;
const TYPEFLAG_OFFSET: usize = 156;

/// Identifies every FD this filesystem hands out as living on one device,
/// distinct from any block device or socket device number.
pub const INITRD_DEVICE: u64 = 1;

#[derive(Clone)]
struct Entry {
    /// Normalised path with no leading or trailing slash, e.g. `"bin/init"`.
    name: Vec<u8>,
    file_type: FileType,
    data_offset: usize,
    size: usize,
}

fn parse_octal(field: &[u8]) -> usize {
    let mut value = 0usize;
    for &b in field {
        match b {
            b'0'..=b'7' => value = value * 8 + (b - b'0') as usize,
            _ => break,
        }
    }
    value
}

fn trimmed_name(field: &[u8]) -> Vec<u8> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let mut name = field[..end].to_vec();
    while name.last() == Some(&b'/') {
        name.pop();
    }
    name
}

fn parse_entries(image: &[u8]) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos + USTAR_BLOCK_LEN <= image.len() {
        let header = &image[pos..pos + USTAR_BLOCK_LEN];
        if header.iter().all(|&b| b == 0) {
            break;
        }

        let name = trimmed_name(&header[NAME_OFFSET..NAME_OFFSET + NAME_LEN]);
        let size = parse_octal(&header[SIZE_OFFSET..SIZE_OFFSET + SIZE_LEN]);
        let typeflag = header[TYPEFLAG_OFFSET];
        let file_type = match typeflag {
            b'5' => FileType::Directory,
            _ => FileType::RegularFile,
        };

        let data_start = pos + USTAR_BLOCK_LEN;
        let padded_size = size.div_ceil(USTAR_BLOCK_LEN) * USTAR_BLOCK_LEN;

        if !name.is_empty() {
            entries.push(Entry {
                name,
                file_type,
                data_offset: data_start,
                size,
            });
        }

        pos = data_start + padded_size;
    }

    entries
}

struct Image {
    data: Arc<[u8]>,
    entries: Vec<Entry>,
}

impl Image {
    /// Looks up a path one level below `prefix` (no further `/`). Returns
    /// the matching entry and its 1-based ordinal, used as the inode.
    fn lookup_child(&self, prefix: &[u8], name: &[u8]) -> Option<(u64, &Entry)> {
        let full = full_path(prefix, name);
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.name == full)
            .map(|(i, e)| ((i + 1) as u64, e))
    }

}

fn full_path(prefix: &[u8], name: &[u8]) -> Vec<u8> {
    if prefix.is_empty() {
        name.to_vec()
    } else {
        let mut path = prefix.to_vec();
        path.push(b'/');
        path.extend_from_slice(name);
        path
    }
}

/// Mounts a `ustar` archive. `data` is typically the multiboot module the
/// bootloader placed the initrd image in.
pub fn mount(data: Arc<[u8]>) -> Arc<dyn FileDescriptor> {
    let entries = parse_entries(&data);
    let image = Arc::new(Image { data, entries });
    Arc::new(Dir { image, prefix: Vec::new(), inode: 0 })
}

struct Dir {
    image: Arc<Image>,
    prefix: Vec<u8>,
    inode: u64,
}

impl FileDescriptor for Dir {
    fn file_type(&self) -> FileType {
        FileType::Directory
    }

    fn flags(&self) -> FdFlags {
        FdFlags::empty()
    }

    fn set_flags(&self, _flags: FdFlags) {}

    fn stat_get(&self) -> FsResult<FileStat> {
        Ok(FileStat::new(INITRD_DEVICE, self.inode, FileType::Directory, 0))
    }

    fn openat(&self, name: &[u8], oflags: OFlags, _fdstat: FdStat) -> FsResult<Arc<dyn FileDescriptor>> {
        match self.image.lookup_child(&self.prefix, name) {
            Some((inode, entry)) => match entry.file_type {
                FileType::Directory => Ok(Arc::new(Dir {
                    image: self.image.clone(),
                    prefix: full_path(&self.prefix, name),
                    inode,
                })),
                _ => Ok(Arc::new(File {
                    image: self.image.clone(),
                    inode,
                    data_offset: entry.data_offset,
                    size: entry.size,
                    cursor: AtomicU64::new(0),
                })),
            },
            None if oflags.contains(OFlags::CREAT) => Err(KernelError::Errno(cosix_abi::Errno::RoFs)),
            None => Err(KernelError::Errno(cosix_abi::Errno::NoEnt)),
        }
    }

    fn file_stat(&self, name: &[u8]) -> FsResult<FileStat> {
        self.image
            .lookup_child(&self.prefix, name)
            .map(|(inode, entry)| FileStat::new(INITRD_DEVICE, inode, entry.file_type, entry.size as u64))
            .ok_or(KernelError::Errno(cosix_abi::Errno::NoEnt))
    }

    fn file_create(&self, name: &[u8], file_type: FileType) -> FsResult<()> {
        let _ = (name, file_type);
        Err(KernelError::Errno(cosix_abi::Errno::RoFs))
    }

    fn file_unlink(&self, name: &[u8]) -> FsResult<()> {
        let _ = name;
        Err(KernelError::Errno(cosix_abi::Errno::RoFs))
    }

    /// Serialises direct children as `(inode: u64, file_type: u8, name_len:
    /// u8, name)` records, one per entry, stopping when the next record
    /// would not fit in `buf`. `cookie` is the index of the first child to
    /// resume from.
    fn readdir(&self, cookie: u64, buf: &mut [u8]) -> FsResult<(usize, u64)> {
        let children: Vec<(u64, &Entry)> = self
            .image
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| is_direct_child(&self.prefix, &e.name))
            .map(|(i, e)| ((i + 1) as u64, e))
            .collect();

        let mut written = 0usize;
        let mut next_cookie = cookie;
        for (inode, entry) in children.into_iter().skip(cookie as usize) {
            let name = child_name(&self.prefix, &entry.name);
            let record_len = 8 + 1 + 1 + name.len();
            if written + record_len > buf.len() {
                break;
            }
            buf[written..written + 8].copy_from_slice(&inode.to_le_bytes());
            buf[written + 8] = entry.file_type as u8;
            buf[written + 9] = name.len() as u8;
            buf[written + 10..written + 10 + name.len()].copy_from_slice(name);
            written += record_len;
            next_cookie += 1;
        }
        Ok((written, next_cookie))
    }
}

fn is_direct_child(prefix: &[u8], name: &[u8]) -> bool {
    let Some(rest) = strip_prefix(prefix, name) else {
        return false;
    };
    !rest.is_empty() && !rest.contains(&b'/')
}

fn strip_prefix<'a>(prefix: &[u8], name: &'a [u8]) -> Option<&'a [u8]> {
    if prefix.is_empty() {
        return Some(name);
    }
    if name.len() > prefix.len() && &name[..prefix.len()] == prefix && name[prefix.len()] == b'/' {
        Some(&name[prefix.len() + 1..])
    } else {
        None
    }
}

fn child_name<'a>(prefix: &[u8], name: &'a [u8]) -> &'a [u8] {
    strip_prefix(prefix, name).unwrap_or(name)
}

struct File {
    image: Arc<Image>,
    inode: u64,
    data_offset: usize,
    size: usize,
    cursor: AtomicU64,
}

impl FileDescriptor for File {
    fn file_type(&self) -> FileType {
        FileType::RegularFile
    }

    fn flags(&self) -> FdFlags {
        FdFlags::empty()
    }

    fn set_flags(&self, _flags: FdFlags) {}

    fn stat_get(&self) -> FsResult<FileStat> {
        Ok(FileStat::new(INITRD_DEVICE, self.inode, FileType::RegularFile, self.size as u64))
    }

    fn read(&self, iovs: &mut [IoVecMut<'_>]) -> FsResult<usize> {
        let offset = self.cursor.load(Ordering::Relaxed);
        let n = self.pread(iovs, offset)?;
        self.cursor.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn pread(&self, iovs: &mut [IoVecMut<'_>], offset: u64) -> FsResult<usize> {
        let offset = offset as usize;
        if offset >= self.size {
            return Ok(0);
        }
        let available = &self.image.data[self.data_offset + offset..self.data_offset + self.size];
        let (copied, _truncated) = cosix_abi::iovec::copy_into_iovecs(iovs, available);
        Ok(copied)
    }

    fn seek(&self, delta: i64, whence: Whence) -> FsResult<u64> {
        let base = match whence {
            Whence::Set => 0i64,
            Whence::Cur => self.cursor.load(Ordering::Relaxed) as i64,
            Whence::End => self.size as i64,
        };
        let new_pos = base.checked_add(delta).ok_or(KernelError::Errno(cosix_abi::Errno::Inval))?;
        if new_pos < 0 {
            return Err(KernelError::Errno(cosix_abi::Errno::Inval));
        }
        self.cursor.store(new_pos as u64, Ordering::Relaxed);
        Ok(new_pos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosix_abi::OFlags;

    fn ustar_header(name: &str, typeflag: u8, size: usize) -> Vec<u8> {
        let mut header = alloc::vec![0u8; USTAR_BLOCK_LEN];
        header[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name.as_bytes());
        let size_str = alloc::format!("{:011o}", size);
        header[SIZE_OFFSET..SIZE_OFFSET + size_str.len()].copy_from_slice(size_str.as_bytes());
        header[TYPEFLAG_OFFSET] = typeflag;
        header
    }

    fn build_image() -> Arc<[u8]> {
        let mut image = Vec::new();
        image.extend(ustar_header("bin/", b'5', 0));
        image.extend(ustar_header("bin/init", b'0', 5));
        image.extend(b"hello");
        image.extend(alloc::vec![0u8; USTAR_BLOCK_LEN - 5]);
        image.extend(ustar_header("readme.txt", b'0', 3));
        image.extend(b"hi!");
        image.extend(alloc::vec![0u8; USTAR_BLOCK_LEN - 3]);
        image.extend(alloc::vec![0u8; USTAR_BLOCK_LEN * 2]);
        Arc::from(image.into_boxed_slice())
    }

    #[test]
    fn reads_nested_file_contents() {
        let root = mount(build_image());
        let bin = root.openat(b"bin", OFlags::empty(), fdstat()).unwrap();
        let file = bin.openat(b"init", OFlags::empty(), fdstat()).unwrap();

        let mut buf = [0u8; 16];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let n = file.read(&mut iovs).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn stat_reports_size_and_type() {
        let root = mount(build_image());
        let stat = root.file_stat(b"readme.txt").unwrap();
        assert_eq!(stat.size, 3);
        assert_eq!(stat.file_type, FileType::RegularFile);
    }

    #[test]
    fn creating_a_file_fails_read_only() {
        let root = mount(build_image());
        let err = root.openat(b"new.txt", OFlags::CREAT, fdstat()).unwrap_err();
        assert_eq!(err, KernelError::Errno(cosix_abi::Errno::RoFs));
    }

    #[test]
    fn readdir_lists_only_direct_children() {
        let root = mount(build_image());
        let mut buf = [0u8; 512];
        let (written, next_cookie) = root.readdir(0, &mut buf).unwrap();
        assert!(written > 0);
        assert_eq!(next_cookie, 2);
    }

    fn fdstat() -> FdStat {
        FdStat {
            file_type: FileType::Directory,
            flags: FdFlags::empty(),
            rights_base: cosix_abi::Rights::DIRECTORY_BASE,
            rights_inheriting: cosix_abi::Rights::DIRECTORY_BASE,
        }
    }
}
