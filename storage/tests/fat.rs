use fatimg_storage::{
    BlockDevice, BlockDeviceError,
    dev::{ImageFile, RamDisk},
    fat::{
        Cluster, FatError, FatFs,
        bs::BootSector,
        dirent::{Attributes, DIR_ENTRY_SIZE, DirEntry},
        fat::{FatEntries, FatEntry},
        name::ShortName,
    },
};

const BYTES_PER_SECTOR: usize = 512;
const SECTORS_PER_CLUSTER: usize = 8;
const CLUSTER_SIZE: usize = BYTES_PER_SECTOR * SECTORS_PER_CLUSTER;
const RESERVED_SECTORS: usize = 32;
const FAT_COUNT: usize = 2;
const SECTORS_PER_FAT: usize = 16;
const FAT_SIZE: usize = SECTORS_PER_FAT * BYTES_PER_SECTOR;
const DATA_CLUSTERS: usize = 64;
const TOTAL_SECTORS: usize =
    RESERVED_SECTORS + FAT_COUNT * SECTORS_PER_FAT + DATA_CLUSTERS * SECTORS_PER_CLUSTER;

const FAT_OFFSET: usize = RESERVED_SECTORS * BYTES_PER_SECTOR;
const DATA_OFFSET: usize = FAT_OFFSET + FAT_COUNT * FAT_SIZE;
const ROOT_SLOTS: usize = CLUSTER_SIZE / DIR_ENTRY_SIZE;
const END_OF_CHAIN: u32 = 0x0FFF_FFFF;

/// A freshly formatted FAT32 volume in memory, with a single-cluster root
/// directory at cluster 2 and files laid out contiguously after it.
struct MockVolume {
    data: Vec<u8>,
    next_cluster: u32,
    next_slot: usize,
}

impl MockVolume {
    fn new() -> Self {
        let bs = BootSector::new()
            .with_sectors_per_cluster(SECTORS_PER_CLUSTER as u8)
            .with_reserved_sectors(RESERVED_SECTORS as u16)
            .with_fat_count(FAT_COUNT as u8)
            .with_sectors_per_fat(SECTORS_PER_FAT as u32)
            .with_total_sectors(TOTAL_SECTORS as u32)
            .with_volume_id(0xCAFE_F00D);

        let mut volume = Self {
            data: vec![0; TOTAL_SECTORS * BYTES_PER_SECTOR],
            next_cluster: 3,
            next_slot: 0,
        };
        volume.data[..BYTES_PER_SECTOR].copy_from_slice(&bs.to_bytes());
        volume.set_fat(0, 0x0FFF_FFF8);
        volume.set_fat(1, END_OF_CHAIN);
        volume.set_fat(2, END_OF_CHAIN);
        volume
    }

    fn set_fat(&mut self, cluster: u32, value: u32) {
        for copy in 0..FAT_COUNT {
            let offset = FAT_OFFSET + copy * FAT_SIZE + cluster as usize * 4;
            self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn add_raw_entry(&mut self, raw: [u8; DIR_ENTRY_SIZE]) -> usize {
        let index = self.next_slot;
        let offset = slot_offset(index);
        self.data[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(&raw);
        self.next_slot += 1;
        index
    }

    fn add_special(&mut self, name: &[u8; 11], attr: u8) -> usize {
        let mut raw = [0; DIR_ENTRY_SIZE];
        raw[..11].copy_from_slice(name);
        raw[11] = attr;
        self.add_raw_entry(raw)
    }

    /// Stores `contents` in a fresh chain and adds its root entry, returning the first cluster.
    fn add_file(&mut self, name: &str, contents: &[u8]) -> u32 {
        let count = contents.len().div_ceil(CLUSTER_SIZE);
        let first = if count == 0 { 0 } else { self.next_cluster };

        for (i, chunk) in contents.chunks(CLUSTER_SIZE).enumerate() {
            let cluster = self.next_cluster;
            self.next_cluster += 1;
            let offset = cluster_offset(cluster);
            self.data[offset..offset + chunk.len()].copy_from_slice(chunk);
            let link = if i + 1 == count {
                END_OF_CHAIN
            } else {
                cluster + 1
            };
            self.set_fat(cluster, link);
        }

        self.add_raw_entry(file_entry(name, first, contents.len() as u32));
        first
    }

    fn into_fs(self) -> FatFs<RamDisk> {
        FatFs::new(RamDisk::from_vec(self.data)).unwrap()
    }
}

/// Raw root entry of an archived regular file, with zeroed timestamps.
fn file_entry(name: &str, first: u32, size: u32) -> [u8; DIR_ENTRY_SIZE] {
    let mut raw = [0; DIR_ENTRY_SIZE];
    raw[..11].copy_from_slice(ShortName::normalize(name).unwrap().as_bytes());
    raw[11] = Attributes::ARCHIVE;
    raw[20..22].copy_from_slice(&((first >> 16) as u16).to_le_bytes());
    raw[26..28].copy_from_slice(&((first & 0xFFFF) as u16).to_le_bytes());
    raw[28..32].copy_from_slice(&size.to_le_bytes());
    raw
}

fn cluster_offset(cluster: u32) -> usize {
    DATA_OFFSET + (cluster as usize - 2) * CLUSTER_SIZE
}

fn slot_offset(index: usize) -> usize {
    cluster_offset(2) + index * DIR_ENTRY_SIZE
}

fn fat_entry(data: &[u8], cluster: u32) -> u32 {
    let offset = FAT_OFFSET + cluster as usize * 4;
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

fn names(fs: &mut FatFs<RamDisk>) -> Vec<String> {
    fs.list()
        .unwrap()
        .iter()
        .map(|entry| entry.name().to_string())
        .collect()
}

/// Records every block read issued to the wrapped device.
struct CountingDevice {
    inner: RamDisk,
    reads: Vec<(usize, usize)>,
}

impl CountingDevice {
    fn new(data: Vec<u8>) -> Self {
        Self {
            inner: RamDisk::from_vec(data),
            reads: Vec::new(),
        }
    }
}

impl BlockDevice for CountingDevice {
    const BLOCK_SIZE: usize = RamDisk::BLOCK_SIZE;

    fn read(&mut self, dst: &mut [u8], offset: usize) -> Result<(), BlockDeviceError> {
        self.reads.push((offset * Self::BLOCK_SIZE, dst.len()));
        self.inner.read(dst, offset)
    }

    fn write(&mut self, src: &[u8], offset: usize) -> Result<(), BlockDeviceError> {
        self.inner.write(src, offset)
    }
}

#[test]
fn test_mount() {
    let mut fs = MockVolume::new().into_fs();
    assert_eq!(fs.boot_sector().volume_id(), 0xCAFE_F00D);
    assert_eq!(fs.layout().cluster_size_bytes(), CLUSTER_SIZE as u64);
    assert_eq!(fs.layout().data_cluster_count(), DATA_CLUSTERS as u32);
    assert_eq!(fs.free_clusters().unwrap(), DATA_CLUSTERS as u32 - 1);
    assert!(fs.list().unwrap().is_empty());
}

#[test]
fn test_bad_signature() {
    let mut volume = MockVolume::new();
    volume.data[510] = 0;
    let result = FatFs::new(RamDisk::from_vec(volume.data));
    assert_eq!(result.err(), Some(FatError::CorruptVolume));
}

#[test]
fn test_list() {
    let mut volume = MockVolume::new();
    volume.add_special(b"MY      VOL", Attributes::VOLUME_ID);
    volume.add_file("hello.txt", b"Hello, world!");
    volume.add_special(b"LFNREC  TXT", Attributes::LONG_NAME);
    let deleted = volume.add_file("gone.txt", b"bye");
    assert_eq!(deleted, 4);
    volume.data[slot_offset(3)] = DirEntry::DELETED_ENTRY;
    volume.add_file("empty.dat", &[]);

    let mut fs = volume.into_fs();
    assert_eq!(names(&mut fs), ["MY.VOL", "HELLO.TXT", "EMPTY.DAT"]);

    let entries = fs.list().unwrap();
    assert!(entries[0].is_volume_id());
    assert_eq!(entries[1].file_size(), 13);
    assert_eq!(entries[1].first_cluster(), Cluster::new(3));
    assert_eq!(entries[2].first_cluster(), Cluster::FREE);

    // Long-name records and tombstones never match a lookup.
    assert_eq!(fs.find("lfnrec.txt").err(), Some(FatError::NotFound));
    assert_eq!(fs.find("gone.txt").err(), Some(FatError::NotFound));
    assert_eq!(fs.find("/Hello.TXT").unwrap().index, 1);
}

#[test]
fn test_empty_root_reads_one_cluster() {
    // Two-cluster root directory, terminated in its first slot.
    let mut volume = MockVolume::new();
    volume.set_fat(2, 3);
    volume.set_fat(3, END_OF_CHAIN);

    let mut device = CountingDevice::new(volume.data);
    {
        let mut fs = FatFs::new(&mut device).unwrap();
        assert!(fs.list().unwrap().is_empty());
    }

    let root = cluster_offset(2);
    assert!(device.reads.iter().any(|&(start, _)| start == root));
    for &(start, len) in &device.reads {
        assert!(
            start == 0 || (start >= root && start + len <= root + CLUSTER_SIZE),
            "unexpected read of {len} bytes at {start:#x}"
        );
    }
}

#[test]
fn test_entry_in_second_root_cluster() {
    // Two-cluster root directory: the first cluster only holds tombstones.
    let mut volume = MockVolume::new();
    volume.set_fat(2, 3);
    volume.set_fat(3, END_OF_CHAIN);
    for slot in 0..ROOT_SLOTS {
        volume.data[slot_offset(slot)] = DirEntry::DELETED_ENTRY;
    }
    volume.next_slot = ROOT_SLOTS;
    volume.next_cluster = 4;
    let contents = pattern(5000);
    let first = volume.add_file("deep.txt", &contents);
    assert_eq!(slot_offset(ROOT_SLOTS), cluster_offset(3));

    let mut fs = volume.into_fs();
    assert_eq!(names(&mut fs), ["DEEP.TXT"]);
    let deep = fs.find("deep.txt").unwrap();
    assert_eq!(deep.index, ROOT_SLOTS);
    assert_eq!(deep.offset, cluster_offset(3) as u64);
    assert_eq!(deep.entry.first_cluster(), Cluster::new(first));
    assert_eq!(fs.read_to_vec("deep.txt").unwrap(), contents);

    // Copies go to the first tombstone, ahead of the live entry.
    assert_eq!(fs.copy("deep.txt", "a.b.txt").unwrap(), 2);
    assert_eq!(fs.find("a.b.txt").unwrap().index, 0);
    fs.rename("deep.txt", "my file.txt").unwrap();
    assert_eq!(fs.find("my file.txt").unwrap().index, ROOT_SLOTS);
    assert_eq!(names(&mut fs), ["A.B.TXT", "MY FILE.TXT"]);
    assert_eq!(fs.read_to_vec("A.B.TXT").unwrap(), contents);
}

#[test]
fn test_cyclic_root_directory() {
    let mut volume = MockVolume::new();
    volume.set_fat(2, 3);
    volume.set_fat(3, 2);
    for cluster in [2, 3] {
        for slot in 0..ROOT_SLOTS {
            volume.data[cluster_offset(cluster) + slot * DIR_ENTRY_SIZE] = DirEntry::DELETED_ENTRY;
        }
    }

    let mut fs = volume.into_fs();
    assert_eq!(fs.list().err(), Some(FatError::CorruptVolume));
    assert_eq!(fs.find("a.txt").err(), Some(FatError::CorruptVolume));
}

#[test]
fn test_cyclic_file_chain() {
    let mut volume = MockVolume::new();
    let first = volume.add_file("loop.bin", &pattern(2 * CLUSTER_SIZE));
    volume.set_fat(first + 1, first);
    // Claim more data than the volume could ever hold.
    let size_offset = slot_offset(0) + 28;
    volume.data[size_offset..size_offset + 4]
        .copy_from_slice(&(100 * CLUSTER_SIZE as u32).to_le_bytes());

    let mut fs = volume.into_fs();
    assert_eq!(fs.read_to_vec("loop.bin").err(), Some(FatError::CorruptVolume));
    // The entry is tombstoned before the chain is walked.
    assert_eq!(fs.remove("loop.bin").err(), Some(FatError::CorruptVolume));
    assert_eq!(fs.find("loop.bin").err(), Some(FatError::NotFound));
}

#[test]
fn test_read_contents() {
    let contents = pattern(10_000);
    let mut volume = MockVolume::new();
    volume.add_file("data.bin", &contents);
    let mut fs = volume.into_fs();

    let reader = fs.read_contents("data.bin").unwrap();
    assert_eq!(reader.size(), 10_000);
    let chunks = reader.collect::<Result<Vec<_>, _>>().unwrap();
    let sizes = chunks.iter().map(Vec::len).collect::<Vec<_>>();
    assert_eq!(sizes, [CLUSTER_SIZE, CLUSTER_SIZE, 10_000 - 2 * CLUSTER_SIZE]);
    assert_eq!(chunks.concat(), contents);

    assert_eq!(fs.read_to_vec("DATA.BIN").unwrap(), contents);
}

#[test]
fn test_read_short_chain() {
    let mut volume = MockVolume::new();
    volume.add_file("short.bin", &pattern(CLUSTER_SIZE));
    let size_offset = slot_offset(0) + 28;
    volume.data[size_offset..size_offset + 4]
        .copy_from_slice(&(3 * CLUSTER_SIZE as u32).to_le_bytes());

    let mut fs = volume.into_fs();
    let mut reader = fs.read_contents("short.bin").unwrap();
    assert!(matches!(reader.next(), Some(Ok(chunk)) if chunk.len() == CLUSTER_SIZE));
    assert_eq!(reader.next(), Some(Err(FatError::CorruptVolume)));
    assert_eq!(reader.next(), None);
}

#[test]
fn test_copy() {
    let contents = pattern(10_000);
    let mut volume = MockVolume::new();
    let source_first = volume.add_file("hello.txt", &contents);
    // Non-zero timestamps and attributes, which the copy must carry over.
    let source_slot = slot_offset(0);
    volume.data[source_slot + 11] = Attributes::ARCHIVE | Attributes::READ_ONLY;
    volume.data[source_slot + 13..source_slot + 20].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7]);
    volume.data[source_slot + 22..source_slot + 26].copy_from_slice(&[8, 9, 10, 11]);

    let mut fs = volume.into_fs();
    let free_before = fs.free_clusters().unwrap();

    assert_eq!(fs.copy("hello.txt", "copy.txt").unwrap(), 3);
    assert_eq!(fs.free_clusters().unwrap(), free_before - 3);
    assert_eq!(fs.read_to_vec("copy.txt").unwrap(), contents);
    assert_eq!(fs.read_to_vec("hello.txt").unwrap(), contents);

    let source = fs.find("hello.txt").unwrap().entry;
    let copy = fs.find("copy.txt").unwrap();
    assert_eq!(copy.index, 1);
    assert_eq!(copy.entry.file_size(), source.file_size());
    assert_eq!(source.first_cluster(), Cluster::new(source_first));

    let chain = fs
        .chain(copy.entry.first_cluster())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(chain.len(), 3);
    assert!(!chain.contains(&source.first_cluster()));
    assert_eq!(fs.get(chain[2]).unwrap(), FatEntry::EndOfChain);

    let data = fs.into_inner().into_inner();
    let source_raw = &data[slot_offset(0)..slot_offset(1)];
    let copy_raw = &data[slot_offset(1)..slot_offset(2)];
    assert_eq!(&copy_raw[..11], b"COPY    TXT");
    assert_eq!(copy_raw[11..20], source_raw[11..20]);
    assert_eq!(copy_raw[22..26], source_raw[22..26]);
    assert_eq!(copy_raw[28..32], source_raw[28..32]);
    // Only the first FAT copy is updated.
    let copy_first = chain[0].value();
    assert_eq!(fat_entry(&data, copy_first), chain[1].value());
    assert_eq!(
        fat_entry(&data[FAT_SIZE..], copy_first),
        0,
        "second FAT copy was modified"
    );
}

#[test]
fn test_copy_empty_file() {
    let mut volume = MockVolume::new();
    volume.add_file("empty.txt", &[]);
    let mut fs = volume.into_fs();
    let free_before = fs.free_clusters().unwrap();

    assert_eq!(fs.copy("empty.txt", "other.txt").unwrap(), 0);
    let copy = fs.find("other.txt").unwrap().entry;
    assert_eq!(copy.first_cluster(), Cluster::FREE);
    assert_eq!(copy.file_size(), 0);
    assert!(fs.read_to_vec("other.txt").unwrap().is_empty());
    assert_eq!(fs.free_clusters().unwrap(), free_before);
}

#[test]
fn test_copy_errors() {
    let mut volume = MockVolume::new();
    volume.add_file("a.txt", b"a");
    volume.add_file("b.txt", b"b");
    volume.add_special(b"DOCS    DIR", Attributes::DIRECTORY);
    let mut fs = volume.into_fs();

    assert_eq!(fs.copy("missing.txt", "c.txt"), Err(FatError::NotFound));
    assert_eq!(fs.copy("a.txt", "b.txt"), Err(FatError::AlreadyExists));
    assert_eq!(fs.copy("a.txt", "a.txt"), Err(FatError::AlreadyExists));
    assert_eq!(fs.copy("docs.dir", "c.txt"), Err(FatError::NotAFile));
    assert_eq!(fs.copy("a.txt", "noext"), Err(FatError::InvalidName));
    assert_eq!(names(&mut fs), ["A.TXT", "B.TXT", "DOCS.DIR"]);
}

#[test]
fn test_copy_reuses_deleted_slot_and_clusters() {
    let mut volume = MockVolume::new();
    let first_a = volume.add_file("a.txt", &pattern(5000));
    volume.add_file("b.txt", &pattern(100));
    let mut fs = volume.into_fs();

    fs.remove("a.txt").unwrap();
    assert_eq!(fs.copy("b.txt", "c.txt").unwrap(), 1);

    let copy = fs.find("c.txt").unwrap();
    assert_eq!(copy.index, 0);
    assert_eq!(copy.entry.first_cluster(), Cluster::new(first_a));
    assert_eq!(fs.read_to_vec("c.txt").unwrap(), pattern(100));
}

#[test]
fn test_copy_directory_full() {
    let mut volume = MockVolume::new();
    volume.add_file("src.txt", b"contents");
    for i in 1..ROOT_SLOTS {
        volume.add_file(&format!("f{i}.txt"), &[]);
    }
    let fat_before = volume.data[FAT_OFFSET..DATA_OFFSET].to_vec();

    let mut fs = volume.into_fs();
    assert_eq!(fs.copy("src.txt", "dst.txt"), Err(FatError::DirectoryFull));

    let data = fs.into_inner().into_inner();
    assert_eq!(&data[FAT_OFFSET..DATA_OFFSET], fat_before.as_slice());
}

#[test]
fn test_copy_volume_full() {
    let mut volume = MockVolume::new();
    volume.add_file("big.bin", &pattern(3 * CLUSTER_SIZE));
    // Leave a single free cluster, at the very end of the data region.
    let last = DATA_CLUSTERS as u32 + 1;
    for cluster in volume.next_cluster..last {
        volume.set_fat(cluster, END_OF_CHAIN);
    }

    let mut fs = volume.into_fs();
    assert_eq!(fs.free_clusters().unwrap(), 1);
    assert_eq!(fs.copy("big.bin", "big2.bin"), Err(FatError::VolumeFull));
    assert_eq!(fs.find("big2.bin").err(), Some(FatError::NotFound));
    assert_eq!(names(&mut fs), ["BIG.BIN"]);
}

#[test]
fn test_remove() {
    let mut volume = MockVolume::new();
    let first = volume.add_file("hello.txt", &pattern(10_000));
    volume.add_file("keep.txt", b"keep");
    let mut fs = volume.into_fs();
    let free_before = fs.free_clusters().unwrap();

    fs.remove("hello.txt").unwrap();
    assert_eq!(names(&mut fs), ["KEEP.TXT"]);
    assert_eq!(fs.free_clusters().unwrap(), free_before + 3);
    assert_eq!(fs.remove("hello.txt"), Err(FatError::NotFound));
    assert_eq!(fs.read_to_vec("keep.txt").unwrap(), b"keep");

    let data = fs.into_inner().into_inner();
    assert_eq!(data[slot_offset(0)], DirEntry::DELETED_ENTRY);
    for cluster in first..first + 3 {
        assert_eq!(fat_entry(&data, cluster), 0);
    }
}

#[test]
fn test_remove_special_entries() {
    let mut volume = MockVolume::new();
    volume.add_special(b"MY      VOL", Attributes::VOLUME_ID);
    volume.add_special(b"DOCS    DIR", Attributes::DIRECTORY);
    let mut fs = volume.into_fs();

    assert_eq!(fs.remove("my.vol"), Err(FatError::NotAFile));
    assert_eq!(fs.remove("docs.dir"), Err(FatError::NotAFile));
    assert_eq!(fs.read_to_vec("docs.dir").err(), Some(FatError::NotAFile));
    assert_eq!(names(&mut fs), ["MY.VOL", "DOCS.DIR"]);
}

#[test]
fn test_rename() {
    let contents = pattern(6000);
    let mut volume = MockVolume::new();
    let first = volume.add_file("old.txt", &contents);
    let mut fs = volume.into_fs();

    fs.rename("old.txt", "new.txt").unwrap();
    assert_eq!(fs.find("old.txt").err(), Some(FatError::NotFound));
    let renamed = fs.find("new.txt").unwrap();
    assert_eq!(renamed.index, 0);
    assert_eq!(renamed.entry.first_cluster(), Cluster::new(first));
    assert_eq!(renamed.entry.file_size(), 6000);
    assert_eq!(fs.read_to_vec("new.txt").unwrap(), contents);
}

#[test]
fn test_rename_errors_leave_image_untouched() {
    let mut volume = MockVolume::new();
    volume.add_file("a.txt", b"a");
    volume.add_file("b.txt", b"b");
    let before = volume.data.clone();
    let mut fs = volume.into_fs();

    assert_eq!(fs.rename("a.txt", "b.txt"), Err(FatError::AlreadyExists));
    assert_eq!(fs.rename("missing.txt", "c.txt"), Err(FatError::NotFound));
    assert_eq!(fs.rename("a.txt", "bad*name.txt"), Err(FatError::InvalidName));
    assert_eq!(fs.rename("a", "c.txt"), Err(FatError::InvalidName));
    assert_eq!(fs.remove("dir/a.txt"), Err(FatError::InvalidName));

    assert_eq!(fs.into_inner().into_inner(), before);
}

#[test]
fn test_image_file() {
    let path = std::env::temp_dir().join(format!("fatimg-storage-{}.img", std::process::id()));
    let mut volume = MockVolume::new();
    volume.add_file("kernel.bin", &pattern(9000));
    std::fs::write(&path, &volume.data).unwrap();

    {
        let mut fs = FatFs::new(ImageFile::open(&path).unwrap()).unwrap();
        fs.copy("kernel.bin", "backup.bin").unwrap();
        fs.rename("kernel.bin", "old.bin").unwrap();
        fs.into_inner().sync().unwrap();
    }

    let mut fs = FatFs::new(ImageFile::open_read_only(&path).unwrap()).unwrap();
    assert_eq!(
        fs.list()
            .unwrap()
            .iter()
            .map(|entry| entry.name().to_string())
            .collect::<Vec<_>>(),
        ["OLD.BIN", "BACKUP.BIN"]
    );
    assert_eq!(fs.read_to_vec("backup.bin").unwrap(), pattern(9000));
    assert!(fs.remove("old.bin").is_err());
    drop(fs);

    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        volume.data.len() as u64
    );
    std::fs::remove_file(&path).unwrap();
}
