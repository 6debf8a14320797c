// Newick Reader
// Parses the trees written by the phylogeny stage

use crate::error::{PipelineError, PipelineResult};

use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
struct Node {
    name: Option<String>,
    children: Vec<usize>,
}

/// A parsed tree; node 0 is the root
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Parse a single Newick tree terminated by `;`.
    ///
    /// Branch lengths must be numbers but are not retained. Internal node
    /// labels are accepted; quoted labels are not.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut parser = Parser {
            bytes: text.as_bytes(),
            pos: 0,
            nodes: Vec::new(),
        };
        parser.subtree()?;
        parser.skip_whitespace();
        if parser.next() != Some(b';') {
            return Err(parser.error("expected ';' after the tree"));
        }
        parser.skip_whitespace();
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("unexpected text after ';'"));
        }
        Ok(Self {
            nodes: parser.nodes,
        })
    }

    /// Read and parse the tree of `family` from `path`
    pub fn read(family: &str, path: &Path) -> PipelineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::parse(&text).map_err(|message| PipelineError::tree(family, message))
    }

    /// Leaf names in tree order
    pub fn leaves(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.children.is_empty())
            .filter_map(|n| n.name.as_deref())
            .collect()
    }

    /// Sibling leaf pairs.
    ///
    /// Leaf children of each internal node are paired in tree order, so a
    /// leaf belongs to at most one pair and a node with three leaf children
    /// yields a single pair.
    pub fn cherries(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        for node in &self.nodes {
            let leaves: Vec<&str> = node
                .children
                .iter()
                .map(|&child| &self.nodes[child])
                .filter(|child| child.children.is_empty())
                .filter_map(|child| child.name.as_deref())
                .collect();
            for pair in leaves.chunks_exact(2) {
                pairs.push((pair[0], pair[1]));
            }
        }
        pairs
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    nodes: Vec<Node>,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> String {
        format!("offset {}: {}", self.pos, message)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn subtree(&mut self) -> Result<usize, String> {
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: None,
            children: Vec::new(),
        });

        self.skip_whitespace();
        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                let child = self.subtree()?;
                self.nodes[id].children.push(child);
                self.skip_whitespace();
                match self.next() {
                    Some(b',') => continue,
                    Some(b')') => break,
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
        }

        let label = self.label();
        if self.nodes[id].children.is_empty() && label.is_none() {
            return Err(self.error("leaf without a name"));
        }
        self.nodes[id].name = label;

        self.skip_whitespace();
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.branch_length()?;
        }
        Ok(id)
    }

    fn label(&mut self) -> Option<String> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && !b"(),:;".contains(&b))
        {
            self.pos += 1;
        }
        (self.pos > start).then(|| String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn branch_length(&mut self) -> Result<f64, String> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || b"+-.eE".contains(&b))
        {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]);
        text.parse()
            .map_err(|_| self.error(&format!("invalid branch length '{}'", text)))
    }
}
