use proptest::prelude::*;

mod common;

use blobfs::*;
use common::{INODES, fresh_fs};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any interleaving of creates and unlinks leaves live files on pairwise distinct inodes and
    /// blocks, with the superblock counts matching what is live.
    #[test]
    fn prop_allocation_exclusive(ops in prop::collection::vec((any::<bool>(), 0usize..16), 1..40)) {
        let mut fs = fresh_fs();
        let blocks_after_format = fs.superblock().free_blocks;
        let mut live: Vec<String> = Vec::new();

        for (step, (make, pick)) in ops.into_iter().enumerate() {
            if make {
                let name = format!("f{}", step);
                match fs.create(&name) {
                    Ok(_) => live.push(name),
                    Err(Error::OutOfSpace(Resource::Inodes)) => {
                        prop_assert_eq!(live.len() as u64, INODES - 1);
                    }
                    Err(e) => prop_assert!(false, "unexpected error {}", e),
                }
            } else if !live.is_empty() {
                let name = live.remove(pick % live.len());
                fs.unlink(&name).unwrap();
            }
        }

        let mut inodes = Vec::new();
        let mut blocks = Vec::new();
        for name in &live {
            let (inode, id) = fs.lookup(name).unwrap();
            inodes.push(id);
            blocks.extend(inode.block_ids(id));
        }
        inodes.sort();
        inodes.dedup();
        blocks.sort();
        blocks.dedup();
        prop_assert_eq!(inodes.len(), live.len());
        prop_assert_eq!(blocks.len(), live.len());
        prop_assert!(!inodes.contains(&ROOT_INODE_ID));
        prop_assert!(!blocks.contains(&ROOT_BLOCK_ID));

        let sb = fs.superblock();
        prop_assert_eq!(sb.free_inodes, INODES - 1 - live.len() as u64);
        prop_assert_eq!(sb.free_blocks, blocks_after_format - live.len() as u64);
    }
}
