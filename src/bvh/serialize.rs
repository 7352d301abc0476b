// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Serialized form of a BVH and its binary framing
//!
//! Binary layout (native endian, 4 byte words): a [`Header`], then for each
//! root its word count followed by its words, then the index and the
//! indirect table, each as a length followed by entries when its flag is set.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::node::NodeBuffer;
use super::{MeshBvh, TriangleIndexing};
use crate::error::{BvhError, Result};
use crate::geometry::Mesh;

pub const MAGIC: [u8; 4] = *b"PFBV";
pub const FORMAT_VERSION: u32 = 1;
const ENDIAN_MARKER: u32 = 0x0102_0304;
const HAS_INDEX: u32 = 1;
const HAS_INDIRECT: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializeOptions {
    /// Copy node buffers instead of sharing them with the source BVH
    pub clone_buffers: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            clone_buffers: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeserializeOptions {
    /// Write the serialized index back into the mesh
    pub set_index: bool,
}

impl Default for DeserializeOptions {
    fn default() -> Self {
        Self { set_index: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedBvh {
    pub roots: Vec<Arc<Vec<u32>>>,
    /// Mesh index as reordered by a direct build
    pub index: Option<Vec<u32>>,
    pub indirect_buffer: Option<Vec<u32>>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Header {
    magic: [u8; 4],
    version: u32,
    endian: u32,
    flags: u32,
    root_count: u32,
}

struct WordReader<'a> {
    words: &'a [u32],
    position: usize,
}

impl<'a> WordReader<'a> {
    fn take(&mut self, count: usize, what: &str) -> Result<&'a [u32]> {
        let end = self.position.checked_add(count).filter(|&end| end <= self.words.len());
        match end {
            Some(end) => {
                let slice = &self.words[self.position..end];
                self.position = end;
                Ok(slice)
            }
            None => Err(BvhError::InvalidSerializedData(format!(
                "truncated data while reading {}",
                what
            ))),
        }
    }

    fn take_sized(&mut self, what: &str) -> Result<&'a [u32]> {
        let len = self.take(1, what)?[0] as usize;
        self.take(len, what)
    }
}

impl SerializedBvh {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut flags = 0;
        if self.index.is_some() {
            flags |= HAS_INDEX;
        }
        if self.indirect_buffer.is_some() {
            flags |= HAS_INDIRECT;
        }
        let header = Header {
            magic: MAGIC,
            version: FORMAT_VERSION,
            endian: ENDIAN_MARKER,
            flags,
            root_count: self.roots.len() as u32,
        };

        let mut words: Vec<u32> = Vec::new();
        for root in &self.roots {
            words.push(root.len() as u32);
            words.extend_from_slice(root);
        }
        for table in [&self.index, &self.indirect_buffer].into_iter().flatten() {
            words.push(table.len() as u32);
            words.extend_from_slice(table);
        }

        let mut bytes = bytemuck::bytes_of(&header).to_vec();
        bytes.extend_from_slice(bytemuck::cast_slice(&words));
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header_len = std::mem::size_of::<Header>();
        if bytes.len() < header_len || (bytes.len() - header_len) % 4 != 0 {
            return Err(BvhError::InvalidSerializedData(format!(
                "{} bytes is not a valid BVH payload",
                bytes.len()
            )));
        }

        let header: Header = bytemuck::pod_read_unaligned(&bytes[..header_len]);
        if header.magic != MAGIC {
            return Err(BvhError::InvalidSerializedData("bad magic".to_string()));
        }
        if header.endian != ENDIAN_MARKER {
            return Err(BvhError::InvalidSerializedData(
                "payload was written with a different byte order".to_string(),
            ));
        }
        if header.version != FORMAT_VERSION {
            return Err(BvhError::InvalidSerializedData(format!(
                "unsupported format version {}",
                header.version
            )));
        }

        let words: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes[header_len..]);
        let mut reader = WordReader {
            words: &words,
            position: 0,
        };

        // every root carries at least its length word
        let mut roots = Vec::with_capacity((header.root_count as usize).min(words.len()));
        for _ in 0..header.root_count {
            roots.push(Arc::new(reader.take_sized("root")?.to_vec()));
        }
        let index = if header.flags & HAS_INDEX != 0 {
            Some(reader.take_sized("index")?.to_vec())
        } else {
            None
        };
        let indirect_buffer = if header.flags & HAS_INDIRECT != 0 {
            Some(reader.take_sized("indirect buffer")?.to_vec())
        } else {
            None
        };

        if reader.position != words.len() {
            return Err(BvhError::InvalidSerializedData(format!(
                "{} trailing words",
                words.len() - reader.position
            )));
        }

        Ok(Self {
            roots,
            index,
            indirect_buffer,
        })
    }
}

impl MeshBvh {
    /// Node buffers plus the triangle ordering they reference
    pub fn serialize(&self, mesh: &Mesh, options: &SerializeOptions) -> SerializedBvh {
        let roots = self
            .roots()
            .iter()
            .map(|root| match root.shared_words() {
                Some(words) if !options.clone_buffers => Arc::clone(words),
                _ => Arc::new(root.words().to_vec()),
            })
            .collect();

        SerializedBvh {
            roots,
            index: mesh.index.clone(),
            indirect_buffer: self.indexing().table().map(<[u32]>::to_vec),
        }
    }

    /// Rebuild a BVH from serialized data. The node buffers are adopted as
    /// shared storage; the mesh index is replaced when `set_index` is set.
    pub fn deserialize(
        data: SerializedBvh,
        mesh: &mut Mesh,
        options: &DeserializeOptions,
    ) -> Result<Self> {
        let SerializedBvh {
            roots,
            index,
            indirect_buffer,
        } = data;

        if options.set_index {
            if let Some(index) = index {
                mesh.index = Some(index);
            }
        }
        mesh.validate()?;

        let triangle_count = mesh.triangle_count();
        let indexing = match indirect_buffer {
            Some(table) => {
                if let Some(bad) = table.iter().find(|&&t| t as usize >= triangle_count) {
                    return Err(BvhError::InvalidSerializedData(format!(
                        "indirect buffer references triangle {} of {}",
                        bad, triangle_count
                    )));
                }
                TriangleIndexing::Indirect(table)
            }
            None => TriangleIndexing::Direct,
        };
        let slot_count = match &indexing {
            TriangleIndexing::Direct => triangle_count,
            TriangleIndexing::Indirect(table) => table.len(),
        };

        let roots: Vec<NodeBuffer> = roots.into_iter().map(NodeBuffer::from_shared).collect();
        for root in &roots {
            root.validate(slot_count)?;
        }

        Ok(MeshBvh::from_parts(roots, indexing))
    }
}
