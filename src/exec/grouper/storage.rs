// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use crate::common::error::ExecResult;

/// Location of one stored key row inside a [`RowStorage`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct RowKey {
    block: u32,
    offset: u32,
    len: u32,
}

/// Block arena for encoded key rows. Rows are appended once per distinct
/// group and never moved, so a `RowKey` stays valid for the arena's lifetime.
pub(crate) struct RowStorage {
    blocks: Vec<Vec<u8>>,
    block_size: usize,
}

impl RowStorage {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_size: block_size.max(1),
        }
    }

    pub(crate) fn alloc_copy(&mut self, bytes: &[u8]) -> ExecResult<RowKey> {
        let needed = bytes.len();
        let fits = self
            .blocks
            .last()
            .map(|b| b.len() + needed <= b.capacity())
            .unwrap_or(false);
        if !fits {
            let capacity = self.block_size.max(needed);
            let mut block = Vec::new();
            block.try_reserve_exact(capacity)?;
            self.blocks.push(block);
        }
        let block_idx = self.blocks.len() - 1;
        let block = &mut self.blocks[block_idx];
        let offset = block.len();
        block.extend_from_slice(bytes);
        Ok(RowKey {
            block: block_idx as u32,
            offset: offset as u32,
            len: needed as u32,
        })
    }

    pub(crate) fn get(&self, key: RowKey) -> &[u8] {
        let start = key.offset as usize;
        &self.blocks[key.block as usize][start..start + key.len as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_survive_block_rollover() {
        let mut storage = RowStorage::new(8);
        let a = storage.alloc_copy(b"alpha").unwrap();
        let b = storage.alloc_copy(b"beta").unwrap();
        let c = storage.alloc_copy(b"a row longer than one block").unwrap();
        assert_eq!(storage.get(a), b"alpha");
        assert_eq!(storage.get(b), b"beta");
        assert_eq!(storage.get(c), b"a row longer than one block");
    }
}
