//! Adaptive prefix (Huffman) coding over a bounded integer alphabet.
//!
//! A tree is built once per symbol stream from its empirical frequencies,
//! serialized ahead of the payload, and rebuilt bit-for-bit on the decode
//! side. The same service codes the main quantization codes, each
//! coefficient stream, and the auxiliary integer streams.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use crate::bits::{pack_flags, unpack_flags, BitReader, BitWriter};
use crate::error::{Result, SzError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Leaf(u32),
    Internal { left: u32, right: u32 },
}

/// A prefix code over the alphabet `[0, state_num)`.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    state_num: usize,
    /// Arena in pre-order; the root, when present, is node 0.
    nodes: Vec<Node>,
    /// symbol -> (code bits, code length)
    codes: HashMap<u32, (u64, u32)>,
}

impl HuffmanTree {
    /// Count symbol frequencies in `symbols` and build the tree.
    pub fn from_symbols(symbols: &[i32], state_num: usize) -> Result<Self> {
        let mut freq: BTreeMap<u32, u64> = BTreeMap::new();
        for &s in symbols {
            if s < 0 || s as usize >= state_num {
                return Err(SzError::InvalidConfig(format!(
                    "symbol {s} outside alphabet of {state_num} states"
                )));
            }
            *freq.entry(s as u32).or_insert(0) += 1;
        }
        Self::from_frequencies(&freq, state_num)
    }

    /// Greedy bottom-up construction: repeatedly merge the two lightest
    /// nodes. Ties break on creation order, so the result is deterministic.
    pub fn from_frequencies(freq: &BTreeMap<u32, u64>, state_num: usize) -> Result<Self> {
        // Build in a scratch arena, then re-lay it out in pre-order.
        let mut scratch: Vec<Node> = Vec::with_capacity(freq.len() * 2);
        let mut heap = BinaryHeap::with_capacity(freq.len());
        for (&symbol, &count) in freq.iter().filter(|(_, &c)| c > 0) {
            heap.push(Reverse((count, scratch.len() as u32)));
            scratch.push(Node::Leaf(symbol));
        }
        while heap.len() > 1 {
            let (Some(Reverse((fa, a))), Some(Reverse((fb, b)))) = (heap.pop(), heap.pop()) else {
                break;
            };
            heap.push(Reverse((fa + fb, scratch.len() as u32)));
            scratch.push(Node::Internal { left: a, right: b });
        }
        let nodes = match heap.pop() {
            Some(Reverse((_, root))) => preorder(&scratch, root),
            None => Vec::new(),
        };
        let mut tree = Self {
            state_num,
            nodes,
            codes: HashMap::new(),
        };
        tree.assign_codes()?;
        Ok(tree)
    }

    fn assign_codes(&mut self) -> Result<()> {
        self.codes.clear();
        match self.nodes.first() {
            None => return Ok(()),
            Some(Node::Leaf(symbol)) => {
                // A lone symbol still costs one bit so lengths stay meaningful.
                self.codes.insert(*symbol, (0, 1));
                return Ok(());
            }
            Some(Node::Internal { .. }) => {}
        }
        let mut stack = vec![(0u32, 0u64, 0u32)];
        while let Some((idx, code, len)) = stack.pop() {
            match self.nodes[idx as usize] {
                Node::Leaf(symbol) => {
                    self.codes.insert(symbol, (code, len));
                }
                Node::Internal { left, right } => {
                    if len >= 64 {
                        return Err(SzError::InvalidConfig(
                            "prefix code deeper than 64 bits".into(),
                        ));
                    }
                    stack.push((right, (code << 1) | 1, len + 1));
                    stack.push((left, code << 1, len + 1));
                }
            }
        }
        Ok(())
    }

    pub fn state_num(&self) -> usize {
        self.state_num
    }

    /// Number of nodes, `2·leaves − 1` (0 for an empty stream).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.codes.len()
    }

    /// Code length of `symbol`, if it occurs in the table.
    pub fn code_len(&self, symbol: i32) -> Option<u32> {
        self.codes.get(&(symbol as u32)).map(|&(_, len)| len)
    }

    /// Compact tree description: one leaf/internal flag per node in pre-order
    /// (bit packed), followed by the leaf symbols in pre-order as big-endian
    /// integers of the alphabet's width.
    pub fn to_bytes(&self) -> Vec<u8> {
        let flags: Vec<bool> = self.nodes.iter().map(|n| matches!(n, Node::Leaf(_))).collect();
        let width = symbol_width(self.state_num);
        let mut out = pack_flags(&flags);
        out.reserve(self.leaf_count() * width);
        for node in &self.nodes {
            if let Node::Leaf(symbol) = node {
                out.extend_from_slice(&symbol.to_be_bytes()[4 - width..]);
            }
        }
        out
    }

    /// Rebuild a tree from [`to_bytes`](Self::to_bytes) output.
    pub fn from_bytes(bytes: &[u8], node_count: usize, state_num: usize) -> Result<Self> {
        if node_count == 0 {
            if !bytes.is_empty() {
                return Err(SzError::Corrupt("empty prefix tree with non-empty description".into()));
            }
            return Ok(Self {
                state_num,
                nodes: Vec::new(),
                codes: HashMap::new(),
            });
        }
        if node_count % 2 == 0 || node_count > state_num.saturating_mul(2).saturating_sub(1) {
            return Err(SzError::Corrupt(format!(
                "invalid prefix tree node count {node_count} for {state_num} states"
            )));
        }
        let width = symbol_width(state_num);
        let flag_bytes = node_count.div_ceil(8);
        let leaves = node_count.div_ceil(2);
        if bytes.len() != flag_bytes + leaves * width {
            return Err(SzError::Corrupt(format!(
                "prefix tree description is {} bytes, expected {}",
                bytes.len(),
                flag_bytes + leaves * width
            )));
        }
        let flags = unpack_flags(&bytes[..flag_bytes], node_count);
        let mut symbols = bytes[flag_bytes..].chunks_exact(width).map(|chunk| {
            chunk.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
        });

        let mut nodes = vec![Node::Leaf(0); node_count];
        // (internal node, children assigned so far)
        let mut open: Vec<(usize, u8)> = Vec::new();
        for (n, &is_leaf) in flags.iter().enumerate() {
            if n > 0 {
                let (parent, assigned) = open
                    .last_mut()
                    .ok_or_else(|| SzError::Corrupt("prefix tree has more than one root".into()))?;
                if let Node::Internal { left, right } = &mut nodes[*parent] {
                    if *assigned == 0 {
                        *left = n as u32;
                    } else {
                        *right = n as u32;
                    }
                }
                *assigned += 1;
                if *assigned == 2 {
                    open.pop();
                }
            }
            if is_leaf {
                let symbol = symbols
                    .next()
                    .ok_or_else(|| SzError::Corrupt("prefix tree is missing leaf symbols".into()))?;
                if symbol as usize >= state_num {
                    return Err(SzError::Corrupt(format!(
                        "prefix tree leaf {symbol} outside alphabet of {state_num} states"
                    )));
                }
                nodes[n] = Node::Leaf(symbol);
            } else {
                nodes[n] = Node::Internal { left: 0, right: 0 };
                open.push((n, 0));
            }
        }
        if !open.is_empty() {
            return Err(SzError::Corrupt("prefix tree description is incomplete".into()));
        }
        let mut tree = Self {
            state_num,
            nodes,
            codes: HashMap::new(),
        };
        tree.assign_codes()?;
        Ok(tree)
    }

    /// Encode `symbols` into a byte-aligned bit stream.
    pub fn encode(&self, symbols: &[i32]) -> Result<Vec<u8>> {
        let mut writer = BitWriter::with_capacity(symbols.len() / 2 + 1);
        for &s in symbols {
            let &(code, len) = self.codes.get(&(s as u32)).ok_or_else(|| {
                SzError::InvalidConfig(format!("symbol {s} has no prefix code"))
            })?;
            writer.write(code, len);
        }
        Ok(writer.finish())
    }

    /// Decode exactly `out.len()` symbols from `bytes`.
    pub fn decode_into(&self, bytes: &[u8], out: &mut [i32]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        let root = self
            .nodes
            .first()
            .ok_or_else(|| SzError::Corrupt("cannot decode symbols with an empty prefix tree".into()))?;
        let mut reader = BitReader::new(bytes);
        for slot in out.iter_mut() {
            let mut node = *root;
            if let Node::Leaf(symbol) = node {
                reader.read_bit()?;
                *slot = symbol as i32;
                continue;
            }
            loop {
                match node {
                    Node::Leaf(symbol) => {
                        *slot = symbol as i32;
                        break;
                    }
                    Node::Internal { left, right } => {
                        let next = if reader.read_bit()? { right } else { left };
                        node = self.nodes[next as usize];
                    }
                }
            }
        }
        Ok(())
    }

    pub fn decode(&self, bytes: &[u8], count: usize) -> Result<Vec<i32>> {
        let mut out = vec![0; count];
        self.decode_into(bytes, &mut out)?;
        Ok(out)
    }
}

/// Re-lay the subtree at `root` of `scratch` out in pre-order.
fn preorder(scratch: &[Node], root: u32) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(scratch.len());
    // (scratch index, parent slot in `nodes`, is right child)
    let mut stack: Vec<(u32, Option<(usize, bool)>)> = vec![(root, None)];
    while let Some((idx, parent)) = stack.pop() {
        let here = nodes.len();
        if let Some((p, is_right)) = parent {
            if let Node::Internal { left, right } = &mut nodes[p] {
                if is_right {
                    *right = here as u32;
                } else {
                    *left = here as u32;
                }
            }
        }
        match scratch[idx as usize] {
            Node::Leaf(symbol) => nodes.push(Node::Leaf(symbol)),
            Node::Internal { left, right } => {
                nodes.push(Node::Internal { left: 0, right: 0 });
                stack.push((right, Some((here, true))));
                stack.push((left, Some((here, false))));
            }
        }
    }
    nodes
}

fn symbol_width(state_num: usize) -> usize {
    match state_num {
        0..=0x100 => 1,
        0x101..=0x1_0000 => 2,
        _ => 4,
    }
}
