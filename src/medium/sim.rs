//! Simulated FAT medium
//!
//! An in-memory volume implementing [`Medium`] for host builds and tests.
//! A cloneable [`SimControl`] handle stays with the caller after the medium
//! is moved into a backend, so faults can be injected mid-flight (card pulled,
//! next N operations or chosen transfers failing, DMA-unsafe buffers, writes
//! accepting nothing) and transfers observed.
//!
//! Every successful remount or format bumps a generation counter; file and
//! directory objects opened under an older generation report
//! `InvalidObject`, the way a real driver loses its open objects when the
//! card is re-initialized.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{attr, AccessMode, FatError, FatResult, FileInfo, FileObject, Medium, VolumeInfo};

// =============================================================================
// Control Handle
// =============================================================================

#[derive(Debug)]
struct SimState {
    present: bool,
    fail_next: u32,
    fail_remounts: u32,
    failing_transfers: Vec<u32>,
    transfers: u32,
    dma_safe: bool,
    zero_writes: bool,
    mkfs_fails: bool,
    dma_exhausted: bool,
    stamp: (u16, u16),

    read_sizes: Vec<usize>,
    write_sizes: Vec<usize>,
    mounts: u32,
    stops: u32,
    formats: u32,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            present: true,
            fail_next: 0,
            fail_remounts: 0,
            failing_transfers: Vec::new(),
            transfers: 0,
            dma_safe: true,
            zero_writes: false,
            mkfs_fails: false,
            dma_exhausted: false,
            // 2024-01-01 12:00:00
            stamp: ((44 << 9) | (1 << 5) | 1, 12 << 11),
            read_sizes: Vec::new(),
            write_sizes: Vec::new(),
            mounts: 0,
            stops: 0,
            formats: 0,
        }
    }
}

/// Fault injection and observation handle for a [`SimMedium`]
#[derive(Debug, Clone, Default)]
pub struct SimControl {
    state: Arc<Mutex<SimState>>,
}

impl SimControl {
    /// Insert or remove the card; while removed every operation is a disk error
    pub fn set_present(&self, present: bool) {
        self.state.lock().present = present;
    }

    /// Fail the next `count` medium operations with a disk error
    pub fn fail_next(&self, count: u32) {
        self.state.lock().fail_next = count;
    }

    /// Fail chosen read/write transfers with a disk error
    ///
    /// Attempts are numbered from 1 and count every read or write that
    /// reaches an open file from this call on, retries included. Other
    /// operations, such as the reopen during a remount, are not counted.
    pub fn fail_transfers(&self, attempts: &[u32]) {
        let mut state = self.state.lock();
        state.transfers = 0;
        state.failing_transfers = attempts.to_vec();
    }

    /// Fail the next `count` remount attempts even if the card is present
    pub fn fail_remounts(&self, count: u32) {
        self.state.lock().fail_remounts = count;
    }

    /// Whether caller buffers qualify for direct transfer
    pub fn set_dma_safe(&self, safe: bool) {
        self.state.lock().dma_safe = safe;
    }

    /// Make writes report success while accepting zero bytes
    pub fn set_zero_writes(&self, enabled: bool) {
        self.state.lock().zero_writes = enabled;
    }

    /// Make mkfs abort
    pub fn set_mkfs_fails(&self, fails: bool) {
        self.state.lock().mkfs_fails = fails;
    }

    /// Make DMA-safe allocations fail
    pub fn set_dma_exhausted(&self, exhausted: bool) {
        self.state.lock().dma_exhausted = exhausted;
    }

    /// Packed date/time stamped on created or modified entries
    pub fn set_timestamp(&self, date: u16, time: u16) {
        self.state.lock().stamp = (date, time);
    }

    /// Requested length of every read transfer so far
    pub fn read_sizes(&self) -> Vec<usize> {
        self.state.lock().read_sizes.clone()
    }

    /// Requested length of every write transfer so far
    pub fn write_sizes(&self) -> Vec<usize> {
        self.state.lock().write_sizes.clone()
    }

    pub fn clear_transfers(&self) {
        let mut state = self.state.lock();
        state.read_sizes.clear();
        state.write_sizes.clear();
    }

    /// Number of successful remounts
    pub fn mount_count(&self) -> u32 {
        self.state.lock().mounts
    }

    /// Number of stops
    pub fn stop_count(&self) -> u32 {
        self.state.lock().stops
    }

    /// Number of completed formats
    pub fn format_count(&self) -> u32 {
        self.state.lock().formats
    }
}

// =============================================================================
// Objects
// =============================================================================

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        date: u16,
        time: u16,
        attrib: u8,
    },
    Dir {
        date: u16,
        time: u16,
    },
}

/// Open file object of a [`SimMedium`]
#[derive(Debug, Default)]
pub struct SimFile {
    path: Option<String>,
    position: u64,
    size: u64,
    mode: AccessMode,
    generation: u64,
}

impl FileObject for SimFile {
    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Open directory object of a [`SimMedium`]
#[derive(Debug, Default)]
pub struct SimDir {
    entries: Vec<FileInfo>,
    next: usize,
    generation: u64,
}

// =============================================================================
// Medium
// =============================================================================

/// In-memory FAT volume with fault injection
pub struct SimMedium {
    nodes: BTreeMap<String, Node>,
    mounted: bool,
    generation: u64,
    total_clusters: u32,
    sectors_per_cluster: u32,
    sector_size: u64,
    control: SimControl,
}

impl SimMedium {
    /// An empty, mounted 16 MiB volume (4096 clusters of 8 sectors)
    pub fn new() -> Self {
        Self::with_geometry(4096, 8)
    }

    pub fn with_geometry(total_clusters: u32, sectors_per_cluster: u32) -> Self {
        Self {
            nodes: BTreeMap::new(),
            mounted: true,
            generation: 1,
            total_clusters,
            sectors_per_cluster,
            sector_size: 512,
            control: SimControl::default(),
        }
    }

    /// Pre-populate a file (parent directories are created as needed)
    pub fn with_file(mut self, path: &str, contents: &[u8]) -> Self {
        let path = normalize(path);
        self.create_parents(&path);
        let (date, time) = self.stamp();
        self.nodes.insert(
            path,
            Node::File {
                data: contents.to_vec(),
                date,
                time,
                attrib: attr::ARC,
            },
        );
        self
    }

    /// Pre-populate a directory (parents are created as needed)
    pub fn with_dir(mut self, path: &str) -> Self {
        let path = normalize(path);
        self.create_parents(&path);
        let (date, time) = self.stamp();
        self.nodes.insert(path, Node::Dir { date, time });
        self
    }

    /// Handle for fault injection after the medium has been moved
    pub fn control(&self) -> SimControl {
        self.control.clone()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Gate for operations on a mounted volume
    fn begin(&self) -> FatResult<()> {
        self.begin_raw()?;
        if !self.mounted {
            return Err(FatError::NotReady);
        }
        Ok(())
    }

    /// Gate for operations that only need the card
    fn begin_raw(&self) -> FatResult<()> {
        let mut state = self.control.state.lock();
        if !state.present {
            return Err(FatError::DiskErr);
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(FatError::DiskErr);
        }
        Ok(())
    }

    /// Count one transfer attempt, failing it if it was chosen
    fn transfer(&self) -> FatResult<()> {
        let mut state = self.control.state.lock();
        state.transfers += 1;
        let attempt = state.transfers;
        if state.failing_transfers.contains(&attempt) {
            return Err(FatError::DiskErr);
        }
        Ok(())
    }

    fn stamp(&self) -> (u16, u16) {
        self.control.state.lock().stamp
    }

    fn create_parents(&mut self, path: &str) {
        let (date, time) = self.stamp();
        let mut parent = parent_of(path);
        while !parent.is_empty() {
            self.nodes
                .entry(parent.to_string())
                .or_insert(Node::Dir { date, time });
            parent = parent_of(parent);
        }
    }

    fn parent_exists(&self, path: &str) -> bool {
        let parent = parent_of(path);
        parent.is_empty() || matches!(self.nodes.get(parent), Some(Node::Dir { .. }))
    }

    fn missing(&self, path: &str) -> FatError {
        if self.parent_exists(path) {
            FatError::NoFile
        } else {
            FatError::NoPath
        }
    }

    fn live_path<'a>(&self, file: &'a SimFile) -> FatResult<&'a str> {
        match &file.path {
            Some(path) if file.generation == self.generation => Ok(path),
            _ => Err(FatError::InvalidObject),
        }
    }

    fn file_data(&mut self, path: &str) -> FatResult<&mut Vec<u8>> {
        match self.nodes.get_mut(path) {
            Some(Node::File { data, .. }) => Ok(data),
            _ => Err(FatError::InvalidObject),
        }
    }

    fn info(path: &str, node: &Node) -> FileInfo {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        match node {
            Node::File {
                data,
                date,
                time,
                attrib,
            } => FileInfo {
                name,
                size: data.len() as u64,
                date: *date,
                time: *time,
                attrib: *attrib,
            },
            Node::Dir { date, time } => FileInfo {
                name,
                size: 0,
                date: *date,
                time: *time,
                attrib: attr::DIR,
            },
        }
    }

    fn cluster_bytes(&self) -> u64 {
        u64::from(self.sectors_per_cluster) * self.sector_size
    }
}

impl Default for SimMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl Medium for SimMedium {
    type File = SimFile;
    type Dir = SimDir;

    fn open(&mut self, file: &mut SimFile, path: &str, mode: AccessMode) -> FatResult<()> {
        self.begin()?;
        let path = normalize(path);
        if path.is_empty() {
            return Err(FatError::InvalidName);
        }
        let creating = mode.contains(AccessMode::CREATE_ALWAYS)
            || mode.contains(AccessMode::OPEN_ALWAYS)
            || mode.contains(AccessMode::CREATE_NEW);
        let (date, time) = self.stamp();

        let size = match self.nodes.get_mut(&path) {
            Some(Node::Dir { .. }) => return Err(FatError::NoFile),
            Some(Node::File { data, attrib, .. }) => {
                if mode.contains(AccessMode::CREATE_NEW) {
                    return Err(FatError::Exist);
                }
                if *attrib & attr::RDO != 0 && mode.contains(AccessMode::WRITE) {
                    return Err(FatError::Denied);
                }
                if mode.contains(AccessMode::CREATE_ALWAYS) {
                    data.clear();
                }
                data.len() as u64
            }
            None if creating => {
                if !self.parent_exists(&path) {
                    return Err(FatError::NoPath);
                }
                self.nodes.insert(
                    path.clone(),
                    Node::File {
                        data: Vec::new(),
                        date,
                        time,
                        attrib: attr::ARC,
                    },
                );
                0
            }
            None => return Err(self.missing(&path)),
        };

        *file = SimFile {
            path: Some(path),
            position: 0,
            size,
            mode,
            generation: self.generation,
        };
        Ok(())
    }

    fn close(&mut self, file: &mut SimFile) -> FatResult<()> {
        self.begin()?;
        self.live_path(file)?;
        *file = SimFile::default();
        Ok(())
    }

    fn read(&mut self, file: &mut SimFile, buf: &mut [u8]) -> FatResult<usize> {
        self.begin()?;
        let path = self.live_path(file)?.to_string();
        if !file.mode.contains(AccessMode::READ) {
            return Err(FatError::Denied);
        }
        self.transfer()?;
        self.control.state.lock().read_sizes.push(buf.len());

        let data = self.file_data(&path)?;
        let start = (file.position as usize).min(data.len());
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        file.position += count as u64;
        file.size = data.len() as u64;
        Ok(count)
    }

    fn write(&mut self, file: &mut SimFile, buf: &[u8]) -> FatResult<usize> {
        self.begin()?;
        let path = self.live_path(file)?.to_string();
        if !file.mode.contains(AccessMode::WRITE) {
            return Err(FatError::Denied);
        }
        self.transfer()?;
        let (date, time) = self.stamp();
        let zero_writes = {
            let mut state = self.control.state.lock();
            state.write_sizes.push(buf.len());
            state.zero_writes
        };
        if zero_writes {
            return Ok(0);
        }

        let start = file.position as usize;
        let data = self.file_data(&path)?;
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        file.position += buf.len() as u64;
        file.size = data.len() as u64;

        if let Some(Node::File {
            date: d, time: t, ..
        }) = self.nodes.get_mut(&path)
        {
            *d = date;
            *t = time;
        }
        Ok(buf.len())
    }

    fn lseek(&mut self, file: &mut SimFile, position: u64) -> FatResult<()> {
        self.begin()?;
        let path = self.live_path(file)?.to_string();
        let writable = file.mode.contains(AccessMode::WRITE);
        let data = self.file_data(&path)?;
        let position = if position > data.len() as u64 {
            if writable {
                data.resize(position as usize, 0);
                position
            } else {
                data.len() as u64
            }
        } else {
            position
        };
        file.position = position;
        file.size = data.len() as u64;
        Ok(())
    }

    fn sync(&mut self, file: &mut SimFile) -> FatResult<()> {
        self.begin()?;
        self.live_path(file)?;
        Ok(())
    }

    fn stat(&mut self, path: &str) -> FatResult<FileInfo> {
        self.begin()?;
        let path = normalize(path);
        if path.is_empty() {
            return Err(FatError::InvalidName);
        }
        match self.nodes.get(&path) {
            Some(node) => Ok(Self::info(&path, node)),
            None => Err(self.missing(&path)),
        }
    }

    fn unlink(&mut self, path: &str) -> FatResult<()> {
        self.begin()?;
        let path = normalize(path);
        if path.is_empty() {
            return Err(FatError::InvalidName);
        }
        match self.nodes.get(&path) {
            None => return Err(self.missing(&path)),
            Some(Node::File { attrib, .. }) if attrib & attr::RDO != 0 => {
                return Err(FatError::Denied)
            }
            Some(Node::Dir { .. }) => {
                let prefix = format!("{}/", path);
                if self.nodes.keys().any(|key| key.starts_with(&prefix)) {
                    return Err(FatError::Denied);
                }
            }
            Some(Node::File { .. }) => {}
        }
        self.nodes.remove(&path);
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> FatResult<()> {
        self.begin()?;
        let path = normalize(path);
        if path.is_empty() || self.nodes.contains_key(&path) {
            return Err(FatError::Exist);
        }
        if !self.parent_exists(&path) {
            return Err(FatError::NoPath);
        }
        let (date, time) = self.stamp();
        self.nodes.insert(path, Node::Dir { date, time });
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> FatResult<()> {
        self.begin()?;
        let from = normalize(from);
        let to = normalize(to);
        if from.is_empty() || to.is_empty() {
            return Err(FatError::InvalidName);
        }
        if !self.nodes.contains_key(&from) {
            return Err(self.missing(&from));
        }
        if self.nodes.contains_key(&to) {
            return Err(FatError::Exist);
        }
        if !self.parent_exists(&to) {
            return Err(FatError::NoPath);
        }

        let prefix = format!("{}/", from);
        let moved: Vec<String> = self
            .nodes
            .keys()
            .filter(|key| **key == from || key.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = self.nodes.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                self.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn utime(&mut self, path: &str, date: u16, time: u16) -> FatResult<()> {
        self.begin()?;
        let path = normalize(path);
        match self.nodes.get_mut(&path) {
            Some(Node::File { date: d, time: t, .. }) | Some(Node::Dir { date: d, time: t }) => {
                *d = date;
                *t = time;
                Ok(())
            }
            None => Err(self.missing(&path)),
        }
    }

    fn opendir(&mut self, dir: &mut SimDir, path: &str) -> FatResult<()> {
        self.begin()?;
        let path = normalize(path);
        if !path.is_empty() {
            match self.nodes.get(&path) {
                Some(Node::Dir { .. }) => {}
                _ => return Err(FatError::NoPath),
            }
        }
        let entries = self
            .nodes
            .iter()
            .filter(|(key, _)| !key.is_empty() && parent_of(key) == path)
            .map(|(key, node)| Self::info(key, node))
            .collect();
        *dir = SimDir {
            entries,
            next: 0,
            generation: self.generation,
        };
        Ok(())
    }

    fn readdir(&mut self, dir: &mut SimDir) -> FatResult<Option<FileInfo>> {
        self.begin()?;
        if dir.generation != self.generation {
            return Err(FatError::InvalidObject);
        }
        let entry = dir.entries.get(dir.next).cloned();
        if entry.is_some() {
            dir.next += 1;
        }
        Ok(entry)
    }

    fn closedir(&mut self, dir: &mut SimDir) -> FatResult<()> {
        if dir.generation != self.generation {
            return Err(FatError::InvalidObject);
        }
        *dir = SimDir::default();
        Ok(())
    }

    fn getfree(&mut self) -> FatResult<VolumeInfo> {
        self.begin()?;
        let cluster_bytes = self.cluster_bytes();
        let used: u64 = self
            .nodes
            .values()
            .map(|node| match node {
                Node::File { data, .. } => (data.len() as u64).div_ceil(cluster_bytes),
                Node::Dir { .. } => 1,
            })
            .sum();
        Ok(VolumeInfo {
            free_clusters: u64::from(self.total_clusters).saturating_sub(used) as u32,
            fat_entries: self.total_clusters + 2,
            sectors_per_cluster: self.sectors_per_cluster,
        })
    }

    fn mkfs(&mut self, work: &mut [u8]) -> FatResult<()> {
        self.begin_raw()?;
        if work.is_empty() || self.control.state.lock().mkfs_fails {
            return Err(FatError::MkfsAborted);
        }
        work.fill(0);
        self.nodes.clear();
        self.generation += 1;
        self.control.state.lock().formats += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.mounted = false;
        self.control.state.lock().stops += 1;
    }

    fn remount(&mut self) -> bool {
        let mut state = self.control.state.lock();
        if !state.present {
            return false;
        }
        if state.fail_remounts > 0 {
            state.fail_remounts -= 1;
            return false;
        }
        state.mounts += 1;
        self.mounted = true;
        self.generation += 1;
        true
    }

    fn is_dma_safe(&self, _buf: &[u8]) -> bool {
        self.control.state.lock().dma_safe
    }

    fn dma_alloc(&mut self, len: usize) -> Option<Vec<u8>> {
        if self.control.state.lock().dma_exhausted {
            return None;
        }
        Some(vec![0; len])
    }
}

// =============================================================================
// Paths
// =============================================================================

/// Strip leading/trailing separators; "." names the root
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed == "." {
        String::new()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}
