//! Binary Huffman coding over vocabulary counts.
//!
//! Frequent words get short codes. Each word's `code` holds the 0/1
//! decisions from the root down to its leaf, and `point` the internal-node
//! indices addressed along the way; both feed the hierarchical-softmax
//! output layer.

use crate::vocab::Vocab;
use crate::MAX_CODE_LENGTH;

/// Placeholder count for internal nodes that have not been created yet.
/// Larger than any achievable word count.
const UNMERGED: u64 = 1_000_000_000_000_000;

/// Builds the Huffman tree and writes each word's `code` and `point`.
///
/// Expects a finalized vocabulary: counts in descending order past the
/// sentinel at index 0.
pub fn assign_codes(vocab: &mut Vocab) {
    let vocab_size = vocab.len();
    if vocab_size < 2 {
        return;
    }

    let mut count = vec![0u64; vocab_size * 2 + 1];
    let mut binary = vec![0u8; vocab_size * 2 + 1]; // which child a node is of its parent (0 or 1)
    let mut parent_node = vec![0usize; vocab_size * 2 + 1];

    for (a, vw) in vocab.iter().enumerate() {
        count[a] = vw.cn;
    }
    for c in &mut count[vocab_size..vocab_size * 2] {
        *c = UNMERGED;
    }

    // Counts are descending, so the two smallest unmerged nodes are always
    // found at the cursors: pos1 walks down the leaves, pos2 walks up the
    // internal nodes as they are created.
    let mut pos1 = vocab_size;
    let mut pos2 = vocab_size;
    for a in 0..(vocab_size - 1) {
        let min1i;
        if pos1 > 0 && count[pos1 - 1] < count[pos2] {
            pos1 -= 1;
            min1i = pos1;
        } else {
            min1i = pos2;
            pos2 += 1;
        }

        let min2i;
        if pos1 > 0 && count[pos1 - 1] < count[pos2] {
            pos1 -= 1;
            min2i = pos1;
        } else {
            min2i = pos2;
            pos2 += 1;
        }

        count[vocab_size + a] = count[min1i] + count[min2i];
        parent_node[min1i] = vocab_size + a;
        parent_node[min2i] = vocab_size + a;
        binary[min2i] = 1;
    }

    // Walk from each leaf to the root to emit its code. The first `point`
    // slot is always the root's internal index, `vocab_size - 2`; it is
    // what lets the update loop address the root's output weights.
    let root = vocab_size * 2 - 2;
    for a in 0..vocab_size {
        let mut code: Vec<u8> = vec![];
        let mut point: Vec<u32> = vec![];
        let mut b = a;
        loop {
            if !code.is_empty() {
                point.push((b - vocab_size) as u32);
            }
            code.push(binary[b]);
            b = parent_node[b];
            if b == root {
                break;
            }
        }
        assert!(
            code.len() <= MAX_CODE_LENGTH,
            "huffman code for {:?} exceeds {} bits",
            vocab[a].word,
            MAX_CODE_LENGTH
        );
        code.reverse();
        point.push((vocab_size - 2) as u32);
        point.reverse();

        let vw = &mut vocab.words_mut()[a];
        vw.code = code;
        vw.point = point;
    }
}
