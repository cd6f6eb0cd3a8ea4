use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::{FsError, Op, Reply};

// ─── Constants ───────────────────────────────────────────────────

pub const NUM_FILES: usize = 2_000;
const MIN_FILE_LEN: usize = 256;
const MAX_FILE_LEN: usize = 16 * 1024;
/// No write may grow a file beyond this.
pub const MAX_WRITE_EXTENT: u64 = 64 * 1024 * 1024;

/// Executes one operation against the backing store.
/// Runs inside a spawned handler task, so it must be cheap to share.
pub trait FsHandler: Send + Sync + 'static {
    fn handle(&self, op: Op) -> Reply;
}

/// Flat in-memory file store keyed by path.
#[derive(Default)]
pub struct MemFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

pub fn file_path(i: usize) -> String {
    format!("/data/file_{:05}.bin", i)
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// `NUM_FILES` files of random length and content, deterministic per seed.
    pub fn seeded(seed: u64) -> Self {
        let start = Instant::now();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut files = HashMap::with_capacity(NUM_FILES);
        let mut bytes = 0usize;

        for i in 0..NUM_FILES {
            let len = rng.gen_range(MIN_FILE_LEN..=MAX_FILE_LEN);
            let mut data = vec![0u8; len];
            rng.fill(&mut data[..]);
            bytes += len;
            files.insert(file_path(i), data);
        }

        info!(
            files = NUM_FILES,
            bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "seeded in-memory file store"
        );
        Self {
            files: RwLock::new(files),
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FsHandler for MemFs {
    fn handle(&self, op: Op) -> Reply {
        match op {
            Op::GetAttr { path } => match self.files.read().get(&path) {
                Some(data) => Reply::Attr {
                    size: data.len() as u64,
                },
                None => Reply::Error(FsError::NotFound(path)),
            },
            Op::Read { path, offset, len } => match self.files.read().get(&path) {
                Some(data) => {
                    let start = (offset as usize).min(data.len());
                    let end = start.saturating_add(len as usize).min(data.len());
                    Reply::Data(data[start..end].to_vec())
                }
                None => Reply::Error(FsError::NotFound(path)),
            },
            Op::Write { path, offset, data } => {
                let end = match offset.checked_add(data.len() as u64) {
                    Some(end) if end <= MAX_WRITE_EXTENT => end as usize,
                    _ => {
                        return Reply::Error(FsError::TooLarge {
                            path,
                            limit: MAX_WRITE_EXTENT,
                        })
                    }
                };
                let start = offset as usize;
                let mut files = self.files.write();
                let file = files.entry(path).or_default();
                if file.len() < end {
                    file.resize(end, 0);
                }
                file[start..end].copy_from_slice(&data);
                Reply::Written(data.len() as u32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let fs = MemFs::new();
        let reply = fs.handle(Op::Write {
            path: "/a".into(),
            offset: 4,
            data: vec![1, 2, 3],
        });
        assert_eq!(reply, Reply::Written(3));
        assert_eq!(fs.handle(Op::GetAttr { path: "/a".into() }), Reply::Attr { size: 7 });
        assert_eq!(
            fs.handle(Op::Read {
                path: "/a".into(),
                offset: 3,
                len: 10
            }),
            Reply::Data(vec![0, 1, 2, 3])
        );
    }

    #[test]
    fn read_past_end_is_empty() {
        let fs = MemFs::new();
        fs.handle(Op::Write {
            path: "/a".into(),
            offset: 0,
            data: vec![9; 4],
        });
        let reply = fs.handle(Op::Read {
            path: "/a".into(),
            offset: 100,
            len: 8,
        });
        assert_eq!(reply, Reply::Data(Vec::new()));
    }

    #[test]
    fn huge_write_offset_is_rejected() {
        let fs = MemFs::new();
        let reply = fs.handle(Op::Write {
            path: "/big".into(),
            offset: u64::MAX - 1,
            data: vec![1; 8],
        });
        assert_eq!(
            reply,
            Reply::Error(FsError::TooLarge {
                path: "/big".into(),
                limit: MAX_WRITE_EXTENT,
            })
        );
        assert!(fs.is_empty());
    }

    #[test]
    fn write_up_to_the_extent_limit_is_accepted() {
        let fs = MemFs::new();
        let reply = fs.handle(Op::Write {
            path: "/edge".into(),
            offset: MAX_WRITE_EXTENT - 4,
            data: vec![7; 4],
        });
        assert_eq!(reply, Reply::Written(4));
        let over = fs.handle(Op::Write {
            path: "/edge".into(),
            offset: MAX_WRITE_EXTENT - 3,
            data: vec![7; 4],
        });
        assert!(matches!(over, Reply::Error(FsError::TooLarge { .. })));
    }

    #[test]
    fn missing_file_is_not_found() {
        let fs = MemFs::new();
        assert_eq!(
            fs.handle(Op::GetAttr { path: "/nope".into() }),
            Reply::Error(FsError::NotFound("/nope".into()))
        );
    }
}
