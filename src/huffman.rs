/// Count assigned to unmerged internal nodes; larger than any real corpus
/// count so fresh internals always lose the two-smallest comparison.
const UNSET_COUNT: i64 = 1_000_000_000_000_000;

/// One slot in the flat coding tree. Indices are `i32` with `-1` for
/// absent; leaves occupy `[0, osz)` and internals `[osz, 2*osz-1)`.
#[derive(Clone, Copy, Debug)]
pub struct Node {
    pub parent: i32,
    pub left: i32,
    pub right: i32,
    pub count: i64,
    pub binary: bool,
}

/// Huffman coding tree over the output classes, plus the per-class
/// root paths and binary codes derived from it.
pub struct HuffmanTree {
    nodes: Vec<Node>,
    paths: Vec<Vec<usize>>,
    codes: Vec<Vec<bool>>,
    osz: usize,
}

impl HuffmanTree {
    /// Build the tree from per-class counts.
    ///
    /// Uses the classic two-cursor merge: leaves sorted by construction
    /// (callers pass counts in descending order for optimal codes, but any
    /// order yields a valid prefix code) and internal nodes produced in
    /// ascending count order, so the two smallest outstanding nodes are
    /// always at one of the two cursors.
    pub fn new(counts: &[i64]) -> Self {
        let osz = counts.len();
        assert!(osz > 0);
        let mut nodes = vec![
            Node {
                parent: -1,
                left: -1,
                right: -1,
                count: UNSET_COUNT,
                binary: false,
            };
            2 * osz - 1
        ];
        for (i, &c) in counts.iter().enumerate() {
            nodes[i].count = c;
        }

        let mut leaf = osz as i64 - 1;
        let mut node = osz;
        for i in osz..2 * osz - 1 {
            let mut mini = [0usize; 2];
            for m in mini.iter_mut() {
                if leaf >= 0 && nodes[leaf as usize].count < nodes[node].count {
                    *m = leaf as usize;
                    leaf -= 1;
                } else {
                    *m = node;
                    node += 1;
                }
            }
            nodes[i].left = mini[0] as i32;
            nodes[i].right = mini[1] as i32;
            nodes[i].count = nodes[mini[0]].count + nodes[mini[1]].count;
            nodes[mini[0]].parent = i as i32;
            nodes[mini[1]].parent = i as i32;
            nodes[mini[1]].binary = true;
        }

        let mut paths = Vec::with_capacity(osz);
        let mut codes = Vec::with_capacity(osz);
        for i in 0..osz {
            let mut path = Vec::new();
            let mut code = Vec::new();
            let mut j = i;
            while nodes[j].parent != -1 {
                path.push((nodes[j].parent as usize) - osz);
                code.push(nodes[j].binary);
                j = nodes[j].parent as usize;
            }
            paths.push(path);
            codes.push(code);
        }

        HuffmanTree {
            nodes,
            paths,
            codes,
            osz,
        }
    }

    /// Number of output classes (leaves).
    pub fn osz(&self) -> usize {
        self.osz
    }

    /// Index of the root node.
    pub fn root(&self) -> usize {
        2 * self.osz - 2
    }

    pub fn node(&self, i: usize) -> Node {
        self.nodes[i]
    }

    pub fn is_leaf(&self, i: usize) -> bool {
        self.nodes[i].left == -1 && self.nodes[i].right == -1
    }

    /// Internal-node ids on the way from leaf `class` to the root,
    /// leaf-to-root order, offset so the first internal node is 0.
    pub fn path(&self, class: usize) -> &[usize] {
        &self.paths[class]
    }

    /// Binary code aligned with [`HuffmanTree::path`]: each bit is the
    /// `binary` flag of the node left behind at that step.
    pub fn code(&self, class: usize) -> &[bool] {
        &self.codes[class]
    }
}
