use std::path::PathBuf;
use std::sync::Arc;

mod common;

use blobfs::*;
use common::{IMAGE_SIZE, INODES, init_logger};

/// Scratch image path, unique per test and per process.
fn image_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("blobfs-{}-{}.img", name, std::process::id()))
}

#[test]
fn disk_format() {
    init_logger();
    let path = image_path("format");
    let disk = ImageFile::create(&path).unwrap();
    let fs = FileSystem::format(Arc::new(disk), INODES, IMAGE_SIZE).unwrap();
    log!("File System initialized: {}", fs.dump());

    let layout = fs.superblock().layout();
    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len, IMAGE_SIZE.max(layout.span_bytes().unwrap()));

    // Superblock fields are big-endian signed 64-bit values.
    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[0..8], &(IMAGE_SIZE as i64).to_be_bytes());
    assert_eq!(&raw[32..40], &(INODES as i64).to_be_bytes());

    fs.unmount().unwrap();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn disk_remount() {
    init_logger();
    let path = image_path("remount");
    let disk = ImageFile::create(&path).unwrap();
    let mut fs = FileSystem::format(Arc::new(disk), INODES, IMAGE_SIZE).unwrap();
    fs.mkdir("docs").unwrap();
    fs.cd("docs").unwrap();
    fs.create("note").unwrap();
    fs.truncate("note", 2).unwrap();
    let fd = fs.open("note").unwrap();
    let data: Vec<u8> = (0..BLOCK_SIZE + 100).map(|i| (i % 251) as u8).collect();
    fs.write(fd, &data).unwrap();
    fs.close(fd).unwrap();
    fs.unmount().unwrap();

    // A fresh handle on the same file sees everything.
    let disk = ImageFile::open(&path).unwrap();
    let mut fs = FileSystem::mount(Arc::new(disk)).unwrap();
    log!("File System mounted: {}", fs.dump());
    let names: Vec<String> = fs.list().unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["docs"]);
    let fd = fs.open("/docs/note").unwrap();
    assert_eq!(fs.read(fd).unwrap(), data);
    assert_eq!(fs.superblock().free_inodes, INODES - 3);

    fs.unmount().unwrap();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn disk_open_missing() {
    let path = image_path("missing");
    assert!(matches!(ImageFile::open(&path), Err(Error::Io(_))));
}
