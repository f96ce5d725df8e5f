//! Declared type hierarchy.
//!
//! A single-rooted tree of class internal names with, per node, the list of
//! directly implemented interfaces. [`HierarchyTree::ancestry`] walks from a
//! type towards the root, yielding each type followed by its interfaces:
//!
//! ```text
//! java/lang/Object
//! └── a/Base          implements a/Marker
//!     └── a/Derived
//!
//! ancestry("a/Derived") = a/Derived, a/Base, a/Marker, java/lang/Object
//! ```
//!
//! # Example
//!
//! ```rust
//! use typesplit::metadata::hierarchy::HierarchyTree;
//!
//! let mut tree = HierarchyTree::new();
//! tree.add_node("java/lang/Object", None)?;
//! tree.add_node("a/Base", Some("java/lang/Object"))?;
//! tree.add_node("a/Derived", Some("a/Base"))?;
//! tree.add_interface("a/Marker", "a/Base")?;
//!
//! let chain: Vec<&str> = tree.ancestry("a/Derived").collect();
//! assert_eq!(chain, ["a/Derived", "a/Base", "a/Marker", "java/lang/Object"]);
//! # Ok::<(), typesplit::Error>(())
//! ```

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{Error, Result};

#[derive(Debug, Clone)]
struct HierarchyNode {
    parent: Option<String>,
    children: Vec<String>,
    interfaces: Vec<String>,
    depth: usize,
}

/// Parent/child and implemented-interface edges between declared types.
#[derive(Debug, Clone, Default)]
pub struct HierarchyTree {
    root: Option<String>,
    nodes: FxHashMap<String, HierarchyNode>,
}

impl HierarchyTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` below `parent`, or as the root when `parent` is `None`.
    ///
    /// Re-adding a known type under the same parent is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a second root is added, the parent is
    /// unknown, or the type is already placed under a different parent.
    pub fn add_node(&mut self, name: &str, parent: Option<&str>) -> Result<()> {
        if let Some(existing) = self.nodes.get(name) {
            if existing.parent.as_deref() == parent {
                return Ok(());
            }
            return Err(Error::Config(format!(
                "type '{name}' is already placed in the hierarchy"
            )));
        }

        let depth = match parent {
            None => {
                if self.root.is_some() {
                    return Err(Error::Config(format!(
                        "cannot add '{name}' as a second hierarchy root"
                    )));
                }
                self.root = Some(name.to_string());
                0
            }
            Some(parent) => {
                let parent_node = self.nodes.get_mut(parent).ok_or_else(|| {
                    Error::Config(format!("parent '{parent}' of '{name}' is not in the hierarchy"))
                })?;
                parent_node.children.push(name.to_string());
                parent_node.depth + 1
            }
        };

        self.nodes.insert(
            name.to_string(),
            HierarchyNode {
                parent: parent.map(str::to_string),
                children: Vec::new(),
                interfaces: Vec::new(),
                depth,
            },
        );
        Ok(())
    }

    /// Records that `sub_type` implements `interface`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `sub_type` is not in the tree.
    pub fn add_interface(&mut self, interface: &str, sub_type: &str) -> Result<()> {
        let node = self.nodes.get_mut(sub_type).ok_or_else(|| {
            Error::Config(format!("type '{sub_type}' is not in the hierarchy"))
        })?;
        if !node.interfaces.iter().any(|i| i == interface) {
            node.interfaces.push(interface.to_string());
        }
        Ok(())
    }

    /// Returns `true` if `name` has been added.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Direct superclass of `name`.
    #[must_use]
    pub fn parent(&self, name: &str) -> Option<&str> {
        self.nodes.get(name)?.parent.as_deref()
    }

    /// Distance from the root, `None` for unknown types.
    #[must_use]
    pub fn depth(&self, name: &str) -> Option<usize> {
        self.nodes.get(name).map(|n| n.depth)
    }

    /// Number of types in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates `name`, its interfaces, its superclass, the superclass's interfaces, and
    /// so on up to the root. An unknown type yields only itself.
    pub fn ancestry<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut current = Some(name);
        let mut pending: Vec<&'a str> = Vec::new();
        std::iter::from_fn(move || {
            if let Some(interface) = pending.pop() {
                return Some(interface);
            }
            let this = current?;
            match self.nodes.get(this) {
                Some(node) => {
                    pending.extend(node.interfaces.iter().rev().map(String::as_str));
                    current = node.parent.as_deref();
                }
                None => current = None,
            }
            Some(this)
        })
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, name: &str, depth: usize) -> fmt::Result {
        writeln!(f, "{}{}", "  ".repeat(depth), name)?;
        if let Some(node) = self.nodes.get(name) {
            for child in &node.children {
                self.write_node(f, child, depth + 1)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for HierarchyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(root) => self.write_node(f, root, 0),
            None => Ok(()),
        }
    }
}
