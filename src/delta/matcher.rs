//! Longest-matching-block alignment between two character sequences.
//!
//! The alignment is the classic "find the longest matching block, then
//! recurse on both sides" scheme (Ratcliff/Obershelp). Clients in the wild
//! reproduce deltas byte-for-byte against this exact block selection, so the
//! tie-breaking rules below matter:
//!
//! - among equally long blocks the one starting earliest in `a` wins, then
//!   earliest in `b`;
//! - characters that occur in more than 1% of a target of 200+ characters
//!   are "popular" and never seed a match, although a match may still be
//!   extended across them.

use std::collections::HashMap;

/// Targets shorter than this never have popular characters pruned.
const POPULAR_MIN_LEN: usize = 200;

/// A run of equal characters: `a[a_start..a_start + len] == b[b_start..b_start + len]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Block {
    pub a_start: usize,
    pub b_start: usize,
    pub len: usize,
}

/// A changed region between two equal runs.
///
/// `a[a_start..a_end]` is replaced by `b[b_start..b_end]`. Either side may be
/// empty (pure insertion or pure removal), never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub a_start: usize,
    pub a_end: usize,
    pub b_start: usize,
    pub b_end: usize,
}

impl Edit {
    pub fn is_insertion_empty(&self) -> bool {
        self.b_start == self.b_end
    }
}

pub struct Matcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of every non-popular character of `b`, ascending.
    b_index: HashMap<char, Vec<usize>>,
}

impl<'a> Matcher<'a> {
    pub fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b_index: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            b_index.entry(c).or_default().push(j);
        }

        if b.len() >= POPULAR_MIN_LEN {
            let threshold = b.len() / 100 + 1;
            b_index.retain(|_, positions| positions.len() <= threshold);
        }

        Self { a, b, b_index }
    }

    /// Longest block inside `a[alo..ahi]` × `b[blo..bhi]`.
    ///
    /// Returns a zero-length block when nothing matches.
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let (a, b) = (self.a, self.b);
        let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);

        // run_len[j] = length of the match ending at a[i - 1] and b[j]
        let mut run_len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next_run_len = HashMap::new();
            if let Some(positions) = self.b_index.get(&a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let prev = if j > 0 {
                        run_len.get(&(j - 1)).copied().unwrap_or(0)
                    } else {
                        0
                    };
                    let k = prev + 1;
                    next_run_len.insert(j, k);
                    if k > best_len {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_len = k;
                    }
                }
            }
            run_len = next_run_len;
        }

        // Popular characters were excluded from seeding; grow across them.
        while best_i > alo && best_j > blo && a[best_i - 1] == b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_len += 1;
        }
        while best_i + best_len < ahi
            && best_j + best_len < bhi
            && a[best_i + best_len] == b[best_j + best_len]
        {
            best_len += 1;
        }

        Block {
            a_start: best_i,
            b_start: best_j,
            len: best_len,
        }
    }

    /// All maximal equal runs, sorted, adjacent runs coalesced, terminated
    /// by a zero-length sentinel at `(a.len(), b.len())`.
    pub fn matching_blocks(&self) -> Vec<Block> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut pending = vec![(0, la, 0, lb)];
        let mut found = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let block = self.longest_match(alo, ahi, blo, bhi);
            if block.len == 0 {
                continue;
            }
            found.push(block);
            if alo < block.a_start && blo < block.b_start {
                pending.push((alo, block.a_start, blo, block.b_start));
            }
            let (a_end, b_end) = (block.a_start + block.len, block.b_start + block.len);
            if a_end < ahi && b_end < bhi {
                pending.push((a_end, ahi, b_end, bhi));
            }
        }
        found.sort();

        let mut blocks: Vec<Block> = Vec::with_capacity(found.len() + 1);
        for block in found {
            match blocks.last_mut() {
                Some(last)
                    if last.a_start + last.len == block.a_start
                        && last.b_start + last.len == block.b_start =>
                {
                    last.len += block.len;
                }
                _ => blocks.push(block),
            }
        }
        blocks.push(Block {
            a_start: la,
            b_start: lb,
            len: 0,
        });
        blocks
    }

    /// The changed regions between consecutive equal runs, left to right.
    pub fn edits(&self) -> Vec<Edit> {
        let (mut i, mut j) = (0, 0);
        let mut edits = Vec::new();
        for block in self.matching_blocks() {
            if i < block.a_start || j < block.b_start {
                edits.push(Edit {
                    a_start: i,
                    a_end: block.a_start,
                    b_start: j,
                    b_end: block.b_start,
                });
            }
            i = block.a_start + block.len;
            j = block.b_start + block.len;
        }
        edits
    }
}
