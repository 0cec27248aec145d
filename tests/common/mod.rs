#![allow(dead_code)]

use assert_fs::{prelude::*, TempDir};
use partkeyd_lib::{
    partkey::{PartkeyManager, Round},
    testing::MockNode,
};
use std::path::PathBuf;

pub const CURRENT_ROUND: u64 = 1000;

pub fn round(round: u64) -> Round {
    Round::new(round)
}

/// a node at `CURRENT_ROUND` and a manager driving it
pub fn manager(
    pending_capacity: usize,
    generated_capacity: usize,
) -> (MockNode, PartkeyManager<MockNode>) {
    let node = MockNode::new(round(CURRENT_ROUND));
    let manager = PartkeyManager::new(node.clone(), pending_capacity, generated_capacity);
    (node, manager)
}

/// write `content` as the daemon configuration in `dir`
pub fn config_file(dir: &TempDir, content: &str) -> PathBuf {
    let file = dir.child("partkeyd.yaml");
    file.write_str(content).unwrap();
    file.path().to_path_buf()
}
