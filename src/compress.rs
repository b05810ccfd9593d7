use std::cmp::Ordering;

use crate::constants::DNS_MAX_COMPRESS_OFFSET;
use crate::dname::dname_lab_cmp;

/// Tree of names already written to an outgoing packet, with the offsets
/// they were written at. Kept sorted label-wise, so that after a lookup the
/// closest match and its zone parents are known; those are the possible
/// compression targets.
///
/// It is a plain binary tree, not a balanced one: the effort of keeping it
/// balanced outweighs its usefulness for typical DNS packet sizes.
pub struct CompressTree<'n> {
    nodes: Vec<Node<'n>>,
    root: Option<u32>,
}

struct Node<'n> {
    left: Option<u32>,
    right: Option<u32>,
    /// The node for the immediate zone parent: one label less.
    parent: Option<u32>,
    /// Uncompressed name this node stands for.
    dname: &'n [u8],
    /// Number of labels, kept to help the compare function.
    labs: usize,
    /// Offset in the packet that points to this name.
    offset: usize,
}

impl<'n> CompressTree<'n> {
    pub fn new() -> Self {
        CompressTree {
            nodes: Vec::new(),
            root: None,
        }
    }

    #[inline]
    pub fn labs(&self, node: u32) -> usize {
        self.nodes[node as usize].labs
    }

    #[inline]
    pub fn offset(&self, node: u32) -> usize {
        self.nodes[node as usize].offset
    }

    /// Finds the exact or closest match for a name.
    /// Returns the match (smaller or equal to the sought name), the number
    /// of labels it shares with the sought name, and whether it is exact.
    fn search(&self, dname: &[u8], labs: usize) -> (Option<u32>, usize, bool) {
        let mut cur = self.root;
        let mut close = None;
        let mut closen = 0;
        while let Some(i) = cur {
            let p = &self.nodes[i as usize];
            let (c, n) = dname_lab_cmp(dname, labs, p.dname, p.labs);
            match c {
                Ordering::Equal => return (Some(i), n, true),
                Ordering::Less => cur = p.left,
                Ordering::Greater => {
                    closen = n;
                    close = Some(i);
                    cur = p.right;
                }
            }
        }
        (close, closen, false)
    }

    /// Returns the best compression target for a name: an exact match, or
    /// else the deepest stored ancestor. Names of one label (the root) are
    /// never compressed.
    pub fn lookup(&self, dname: &[u8], labs: usize) -> Option<u32> {
        if labs <= 1 {
            return None;
        }
        let (close, matchlabels, exact) = self.search(dname, labs);
        if exact {
            return close;
        }
        if matchlabels > 1 {
            // www.example.com matched foo.example.com with three shared
            // labels; walk up to the node for example.com.
            let mut p = close;
            while let Some(i) = p {
                if self.nodes[i as usize].labs <= matchlabels {
                    break;
                }
                p = self.nodes[i as usize].parent;
            }
            return p;
        }
        None
    }

    /// Inserts one name; returns the new node, or the existing one if the
    /// name was already present.
    fn insert(&mut self, dname: &'n [u8], labs: usize, offset: usize) -> u32 {
        enum Slot {
            Root,
            Left(u32),
            Right(u32),
        }
        let mut slot = Slot::Root;
        let mut cur = self.root;
        while let Some(i) = cur {
            let p = &self.nodes[i as usize];
            let (c, _) = dname_lab_cmp(dname, labs, p.dname, p.labs);
            match c {
                Ordering::Equal => {
                    debug_assert!(false, "name already stored");
                    return i;
                }
                Ordering::Less => {
                    slot = Slot::Left(i);
                    cur = p.left;
                }
                Ordering::Greater => {
                    slot = Slot::Right(i);
                    cur = p.right;
                }
            }
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node {
            left: None,
            right: None,
            parent: None,
            dname,
            labs,
            offset,
        });
        match slot {
            Slot::Root => self.root = Some(idx),
            Slot::Left(i) => self.nodes[i as usize].left = Some(idx),
            Slot::Right(i) => self.nodes[i as usize].right = Some(idx),
        }
        idx
    }

    /// Stores a name and its not-yet-stored ancestors, linking parent
    /// pointers as it goes. `closest` must be the result of the preceding
    /// lookup: if the tree already holds an ancestor of the name, this is it.
    /// Storing stops once an offset no longer fits in a compression pointer.
    pub fn store(
        &mut self,
        mut dname: &'n [u8],
        mut labs: usize,
        mut offset: usize,
        closest: Option<u32>,
    ) {
        // the root label itself is never stored
        let uplabs = match closest {
            Some(c) => labs - self.nodes[c as usize].labs,
            None => labs - 1,
        };
        let mut last: Option<u32> = None;
        for _ in 0..uplabs {
            if offset > DNS_MAX_COMPRESS_OFFSET {
                // compression pointers can no longer reach this far
                if let Some(n) = last {
                    self.nodes[n as usize].parent = closest;
                }
                return;
            }
            let newnode = self.insert(dname, labs, offset);
            if let Some(n) = last {
                self.nodes[n as usize].parent = Some(newnode);
            }
            last = Some(newnode);
            // next label
            let lablen = dname[0] as usize;
            dname = &dname[1 + lablen..];
            offset += lablen + 1;
            labs -= 1;
        }
        if let Some(n) = last {
            self.nodes[n as usize].parent = closest;
        }
    }
}

impl<'n> Default for CompressTree<'n> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dname::dname_count_labels;

    const WWW: &[u8] = b"\x03www\x07example\x03com\x00";
    const FOO: &[u8] = b"\x03foo\x07example\x03com\x00";
    const ORG: &[u8] = b"\x03bar\x03org\x00";

    #[test]
    fn exact_and_ancestor_matches() {
        let mut tree = CompressTree::new();
        let labs = dname_count_labels(WWW);
        assert!(tree.lookup(WWW, labs).is_none());
        tree.store(WWW, labs, 12, None);

        // exact match
        let hit = tree.lookup(WWW, labs).unwrap();
        assert_eq!(tree.offset(hit), 12);
        assert_eq!(tree.labs(hit), 4);

        // sibling compresses against the stored example.com ancestor
        let hit = tree.lookup(FOO, dname_count_labels(FOO)).unwrap();
        assert_eq!(tree.labs(hit), 3);
        assert_eq!(tree.offset(hit), 12 + 4);

        // unrelated name finds nothing
        assert!(tree.lookup(ORG, dname_count_labels(ORG)).is_none());
    }

    #[test]
    fn oversized_offsets_are_not_stored() {
        let mut tree = CompressTree::new();
        tree.store(WWW, dname_count_labels(WWW), 0x4000, None);
        assert!(tree.lookup(WWW, dname_count_labels(WWW)).is_none());
    }
}
